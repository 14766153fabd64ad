//! Nostr event pipeline primitives: canonical serialization, signing, keys and
//! typed event construction.

pub mod builder;
mod identity;
mod keys;
pub mod kinds;
pub mod nip01;
#[cfg(feature = "full")]
pub mod nip04;
pub mod tag_parsing;

pub use builder::{BuildError, BuilderConfig, EventBuilder, Profile, RelayInfo, ZapTarget};
pub use identity::{
    ENV_IDENTITY_KEY_PATH, IdentityProvider, LoginMethod, StaticIdentity, identity_key_path,
    load_identity, load_identity_from_path,
};
pub use keys::{KeyError, Keypair};
pub use nip01::{
    Event, EventTemplate, KindClassification, Nip01Error, UnsignedEvent, finalize_event,
    generate_secret_key, get_event_hash, get_public_key, get_public_key_hex, serialize_event,
    sign_event, unix_now_secs, validate_event, verify_event,
};
