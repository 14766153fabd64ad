//! Transport seam between the feed engine and the cache connection.

use crate::error::{FeedError, Result};
use crate::model::{PostRequestResult, UserProfile};
use crate::requests::CacheRequest;
use async_trait::async_trait;
use nostr_client::CacheClient;
use serde_json::Value;
use std::collections::HashMap;

/// Request/response access to the cache server.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Resolves once requests can be sent.
    async fn wait_connected(&self) -> Result<()>;

    /// Every record answered for `request`, in delivery order.
    async fn send(&self, request: &CacheRequest) -> Result<Vec<Value>>;
}

#[async_trait]
impl FeedTransport for CacheClient {
    async fn wait_connected(&self) -> Result<()> {
        CacheClient::wait_connected(self).await.map_err(FeedError::from)
    }

    async fn send(&self, request: &CacheRequest) -> Result<Vec<Value>> {
        self.request(&request.name, request.payload_value())
            .await
            .map_err(FeedError::from)
    }
}

/// Wait for the connection, send `request` and decode the answer.
pub async fn fetch_posts(
    transport: &dyn FeedTransport,
    request: &CacheRequest,
) -> Result<PostRequestResult> {
    transport.wait_connected().await?;
    let records = transport.send(request).await?;
    Ok(PostRequestResult::from_records(&records))
}

/// Profiles for `pubkeys` via `user_infos`.
pub async fn fetch_user_infos<S: AsRef<str> + Sync>(
    transport: &dyn FeedTransport,
    pubkeys: &[S],
) -> Result<HashMap<String, UserProfile>> {
    let result = fetch_posts(transport, &CacheRequest::user_infos(pubkeys)).await?;
    Ok(result.users)
}
