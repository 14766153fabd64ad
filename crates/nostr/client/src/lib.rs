//! WebSocket transport for relays and the caching server.
//!
//! - relay publish/subscribe with a readiness signal
//! - cache request/response (`REQ` with a `cache` filter, collected to `EOSE`)

pub mod cache;
pub mod error;
pub mod relay;
pub mod subscription;

pub use cache::{CacheClient, CacheConfig};
pub use error::{ClientError, Result};
pub use relay::{
    ConnectionState, PublishConfirmation, RelayConfig, RelayConnection, RelayMessage,
    parse_relay_message,
};
pub use subscription::{Subscription, SubscriptionItem};
