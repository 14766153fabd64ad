//! Subscription routing for `REQ` streams.

use crate::error::{ClientError, Result};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// One element of a subscription stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionItem {
    /// Raw record from an `EVENT` frame. Cache responses carry non-standard
    /// records, so parsing into [`nostr::Event`] is left to the consumer.
    Event(Value),
    /// End of stored events.
    Eose,
}

/// A `REQ` registered on a relay connection.
#[derive(Clone)]
pub struct Subscription {
    pub id: String,
    pub filters: Vec<Value>,
    eose_received: Arc<AtomicBool>,
    item_tx: Option<mpsc::Sender<SubscriptionItem>>,
}

impl Subscription {
    /// Subscription whose items are only counted, not delivered.
    pub fn new(id: String, filters: Vec<Value>) -> Self {
        Self {
            id,
            filters,
            eose_received: Arc::new(AtomicBool::new(false)),
            item_tx: None,
        }
    }

    /// Subscription that delivers items on a bounded channel.
    pub fn with_channel(
        id: String,
        filters: Vec<Value>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<SubscriptionItem>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let subscription = Self {
            id,
            filters,
            eose_received: Arc::new(AtomicBool::new(false)),
            item_tx: Some(tx),
        };
        (subscription, rx)
    }

    /// Waits for room when the channel is full; only a dropped receiver fails.
    async fn deliver(&self, item: SubscriptionItem) -> Result<()> {
        if let Some(tx) = &self.item_tx {
            tx.send(item)
                .await
                .map_err(|_| ClientError::Subscription("event channel closed".to_string()))?;
        }
        Ok(())
    }

    pub async fn handle_event(&self, record: Value) -> Result<()> {
        self.deliver(SubscriptionItem::Event(record)).await
    }

    /// Mark EOSE and notify the consumer.
    pub async fn mark_eose(&self) -> Result<()> {
        self.eose_received.store(true, Ordering::Relaxed);
        self.deliver(SubscriptionItem::Eose).await
    }

    pub fn has_eose(&self) -> bool {
        self.eose_received.load(Ordering::Relaxed)
    }
}
