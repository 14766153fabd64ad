//! Feed error types.

use thiserror::Error;

/// Feed fetch failure. Never fatal to the timeline: the request is dropped,
/// the single-flight flag is cleared and the caller may retry.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("client error: {0}")]
    Client(#[from] nostr_client::ClientError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed record: {0}")]
    MalformedRecord(String),
}

pub type Result<T> = std::result::Result<T, FeedError>;
