//! Cache request payloads.

use serde_json::{Map, Value, json};

/// Named cache query and its flat payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRequest {
    pub name: String,
    pub payload: Map<String, Value>,
}

impl CacheRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Map::new(),
        }
    }

    /// Set one payload field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn with_until(self, until: u64) -> Self {
        self.with("until", until)
    }

    pub fn with_since(self, since: u64) -> Self {
        self.with("since", since)
    }

    pub fn with_include_replies(self) -> Self {
        self.with("include_replies", true)
    }

    /// `feed_directive{directive, user_pubkey, limit}`.
    pub fn feed_directive(directive: &str, user_pubkey: &str, limit: u32) -> Self {
        Self::new("feed_directive")
            .with("directive", directive)
            .with("user_pubkey", user_pubkey)
            .with("limit", limit)
    }

    /// `feed{pubkey, user_pubkey, notes: "authored", limit}`.
    pub fn profile_feed(pubkey: &str, user_pubkey: &str, limit: u32) -> Self {
        Self::new("feed")
            .with("pubkey", pubkey)
            .with("user_pubkey", user_pubkey)
            .with("notes", "authored")
            .with("limit", limit)
    }

    pub fn thread_view(event_id: &str, limit: u32, user_pubkey: &str) -> Self {
        Self::new("thread_view")
            .with("event_id", event_id)
            .with("limit", limit)
            .with("user_pubkey", user_pubkey)
    }

    pub fn user_infos<S: AsRef<str>>(pubkeys: &[S]) -> Self {
        let pubkeys: Vec<Value> = pubkeys.iter().map(|key| json!(key.as_ref())).collect();
        Self::new("user_infos").with("pubkeys", pubkeys)
    }

    pub fn payload_value(&self) -> Value {
        Value::Object(self.payload.clone())
    }
}

/// A named feed backed by a cache directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDirective {
    pub name: String,
    pub directive: String,
    pub include_replies: Option<bool>,
}

impl FeedDirective {
    pub fn new(name: impl Into<String>, directive: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directive: directive.into(),
            include_replies: None,
        }
    }

    /// The user's own chronological home feed.
    pub fn latest(user_pubkey: &str) -> Self {
        Self::new("Latest", user_pubkey)
    }

    pub fn search(query: &str) -> Self {
        Self::new(format!("Search: {query}"), format!("search;{query}"))
    }

    pub fn with_replies(mut self, include_replies: bool) -> Self {
        self.include_replies = Some(include_replies);
        self
    }
}

/// What a feed manager is showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    Directive(FeedDirective),
    Profile { pubkey: String, with_replies: bool },
    Search(String),
    Thread { event_id: String },
}

impl FeedSource {
    /// Directive used for `feed_directive` queries, if any.
    pub fn directive(&self) -> Option<FeedDirective> {
        match self {
            Self::Directive(feed) => Some(feed.clone()),
            Self::Search(query) => Some(FeedDirective::search(query)),
            Self::Profile { .. } | Self::Thread { .. } => None,
        }
    }
}
