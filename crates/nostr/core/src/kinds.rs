/// Profile metadata (NIP-01).
pub const KIND_METADATA: u32 = 0;
/// Short text note.
pub const KIND_TEXT_NOTE: u32 = 1;
/// Contact list with relay map content (NIP-02).
pub const KIND_CONTACTS: u32 = 3;
/// Encrypted direct message (NIP-04).
pub const KIND_ENCRYPTED_DIRECT_MESSAGE: u32 = 4;
/// Repost (NIP-18).
pub const KIND_REPOST: u32 = 6;
/// Reaction (NIP-25).
pub const KIND_REACTION: u32 = 7;
/// Zap request (NIP-57).
pub const KIND_ZAP_REQUEST: u32 = 9734;
/// Mute list (NIP-51).
pub const KIND_MUTE_LIST: u32 = 10000;
/// Application-specific data; settings and chat-read markers.
pub const KIND_APP_DATA: u32 = 30078;

// Cache-server and wallet kinds sit outside the NIP-01 range.
/// Pagination metadata record in cache responses.
pub const KIND_CACHE_PAGINATION: u32 = 10_000_113;
/// Wallet command envelope.
pub const KIND_WALLET: u32 = 10_000_300;
