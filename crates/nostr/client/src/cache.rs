//! Cache-server request/response on top of a relay connection.
//!
//! The cache server answers `["REQ", <sub>, {"cache": [<name>, <payload>]}]`
//! with a burst of `EVENT` records terminated by `EOSE`.

use crate::error::{ClientError, Result};
use crate::relay::{PublishConfirmation, RelayConfig, RelayConnection};
use crate::subscription::{Subscription, SubscriptionItem};
use nostr::Event;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Cache client configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on the time between `REQ` and `EOSE`.
    pub response_timeout: Duration,
    /// Buffered records per in-flight request.
    pub channel_capacity: usize,
    pub relay_config: RelayConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(15),
            channel_capacity: 1024,
            relay_config: RelayConfig::default(),
        }
    }
}

/// Request/response client for a caching relay.
pub struct CacheClient {
    relay: Arc<RelayConnection>,
    config: CacheConfig,
    next_id: AtomicU64,
}

impl CacheClient {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_config(url, CacheConfig::default())
    }

    pub fn with_config(url: &str, config: CacheConfig) -> Result<Self> {
        let relay = RelayConnection::with_config(url, config.relay_config.clone())?;
        Ok(Self::from_relay(Arc::new(relay), config))
    }

    /// Wrap an existing connection.
    pub fn from_relay(relay: Arc<RelayConnection>, config: CacheConfig) -> Self {
        Self {
            relay,
            config,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn relay(&self) -> &Arc<RelayConnection> {
        &self.relay
    }

    pub async fn connect(&self) -> Result<()> {
        self.relay.connect().await
    }

    pub async fn wait_connected(&self) -> Result<()> {
        self.relay.wait_connected().await
    }

    /// Send one cache request and collect every record up to `EOSE`.
    pub async fn request(&self, name: &str, payload: Value) -> Result<Vec<Value>> {
        let subscription_id = format!("cache-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let filter = json!({ "cache": [name, payload] });
        let (subscription, mut items) = Subscription::with_channel(
            subscription_id.clone(),
            vec![filter],
            self.config.channel_capacity,
        );
        self.relay.subscribe(subscription).await?;
        debug!(request = name, subscription = %subscription_id, "cache request sent");

        let collected = timeout(self.config.response_timeout, async {
            let mut records = Vec::new();
            while let Some(item) = items.recv().await {
                match item {
                    SubscriptionItem::Event(record) => records.push(record),
                    SubscriptionItem::Eose => return Ok(records),
                }
            }
            Err(ClientError::Connection(
                "connection closed before EOSE".to_string(),
            ))
        })
        .await;

        if let Err(error) = self.relay.unsubscribe(&subscription_id).await {
            debug!(subscription = %subscription_id, %error, "cache CLOSE not sent");
        }

        match collected {
            Ok(result) => {
                if let Ok(records) = &result {
                    debug!(request = name, records = records.len(), "cache response complete");
                }
                result
            }
            Err(_) => {
                warn!(request = name, "cache response timed out");
                Err(ClientError::Timeout(format!(
                    "no EOSE for {name} after {:?}",
                    self.config.response_timeout
                )))
            }
        }
    }

    /// Submit a signed event on the cache connection and wait for its `OK`.
    pub async fn publish(&self, event: &Event) -> Result<PublishConfirmation> {
        self.relay.publish(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_requires_connection() -> Result<()> {
        let client = CacheClient::new("wss://cache.example")?;
        let result = client.request("feed_directive", json!({})).await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
        Ok(())
    }
}
