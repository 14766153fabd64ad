//! Pagination cursor for time-ranged feed queries.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Ranking of a feed page as reported by the cache server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderBy {
    CreatedAt,
    /// Any non-chronological ranking (score, zaps, ...).
    Other(String),
}

impl From<String> for OrderBy {
    fn from(value: String) -> Self {
        if value == "created_at" {
            Self::CreatedAt
        } else {
            Self::Other(value)
        }
    }
}

impl From<OrderBy> for String {
    fn from(value: OrderBy) -> Self {
        match value {
            OrderBy::CreatedAt => "created_at".to_string(),
            OrderBy::Other(other) => other,
        }
    }
}

/// `since`/`until` bounds of the loaded window.
///
/// `since` is the oldest loaded timestamp and becomes the `until` of the next
/// backward page; `until` is the newest and becomes the `since` of the next
/// future-post poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationCursor {
    #[serde(deserialize_with = "timestamp")]
    pub since: u64,
    #[serde(deserialize_with = "timestamp")]
    pub until: u64,
    #[serde(default)]
    pub order_by: Option<OrderBy>,
}

impl PaginationCursor {
    pub fn new(since: u64, until: u64, order_by: Option<OrderBy>) -> Self {
        Self {
            since,
            until,
            order_by,
        }
    }

    /// Time bounds only make sense for chronologically ordered feeds.
    pub fn is_chronological(&self) -> bool {
        matches!(self.order_by, None | Some(OrderBy::CreatedAt))
    }

    /// Upper bound for the next backward page.
    pub fn next_page_until(&self) -> u64 {
        self.since
    }

    /// Lower bound for the next future-post poll.
    pub fn poll_since(&self) -> u64 {
        self.until
    }

    /// Record an older page; only the lower bound moves.
    pub fn advance_older(&mut self, page: &PaginationCursor) {
        self.since = page.since;
    }

    /// Record a future-post poll; only the upper bound moves.
    pub fn advance_newer(&mut self, page: &PaginationCursor) {
        self.until = page.until;
    }
}

/// Unix seconds sent either as an integer or a float.
pub(crate) fn timestamp<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(|secs| secs.round() as u64)
        })
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {value}")))
}
