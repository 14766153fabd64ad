//! Cache responses and the timeline entries derived from them.

use crate::cursor::{PaginationCursor, timestamp};
use crate::error::{FeedError, Result};
use nostr::kinds::{KIND_CACHE_PAGINATION, KIND_METADATA, KIND_REPOST, KIND_TEXT_NOTE};
use nostr::tag_parsing::referenced_event;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Note as delivered by the cache. `sig` is not carried: cache records are
/// not always signed and the feed never re-verifies them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub pubkey: String,
    #[serde(deserialize_with = "timestamp")]
    pub created_at: u64,
    #[serde(default = "default_post_kind")]
    pub kind: u32,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    #[serde(default)]
    pub content: String,
}

fn default_post_kind() -> u32 {
    KIND_TEXT_NOTE
}

/// Kind-0 profile fields the feed displays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub pubkey: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub nip05: Option<String>,
    #[serde(default)]
    pub lud16: Option<String>,
}

impl UserProfile {
    /// Profile for an author whose metadata was not delivered.
    pub fn placeholder(pubkey: &str) -> Self {
        Self {
            pubkey: pubkey.to_string(),
            ..Self::default()
        }
    }

    pub fn display(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or_else(|| self.name.as_deref().filter(|name| !name.is_empty()))
            .unwrap_or(&self.pubkey)
    }
}

/// A kind-6 repost: who reposted, when, and the embedded original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repost {
    pub id: String,
    pub pubkey: String,
    pub post: Post,
    #[serde(deserialize_with = "timestamp")]
    pub date: u64,
}

/// Aggregate of every repost of one post within a timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepostWrapper {
    /// Reposting identities; only ever grows.
    pub users: BTreeSet<String>,
    /// Identity the entry is attributed to (first reposter seen).
    pub reposter: String,
    pub date: u64,
    /// Id of the repost event that owns this entry.
    pub id: String,
}

/// One timeline entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedContent {
    pub post: Post,
    pub user: UserProfile,
    pub reposted: Option<RepostWrapper>,
}

impl ParsedContent {
    pub fn is_repost(&self) -> bool {
        self.reposted.is_some()
    }

    pub fn reposter(&self) -> Option<&str> {
        self.reposted.as_ref().map(|wrapper| wrapper.reposter.as_str())
    }

    /// Timestamp the entry is sorted under in the feed.
    pub fn feed_date(&self) -> u64 {
        self.reposted
            .as_ref()
            .map_or(self.post.created_at, |wrapper| wrapper.date)
    }

    /// Authored by `pubkey` or attributed to it as reposter.
    pub fn involves(&self, pubkey: &str) -> bool {
        self.post.pubkey == pubkey || self.reposter() == Some(pubkey)
    }
}

/// Decoded cache response for any post-bearing request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostRequestResult {
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub reposts: Vec<Repost>,
    #[serde(default)]
    pub users: HashMap<String, UserProfile>,
    #[serde(default)]
    pub pagination: Option<PaginationCursor>,
    /// Delivery order of post and repost ids. Empty means posts then reposts.
    #[serde(default)]
    pub order: Vec<String>,
}

impl PostRequestResult {
    /// Fold raw cache records into a result, preserving delivery order.
    /// Undecodable records are skipped.
    pub fn from_records(records: &[Value]) -> Self {
        let mut result = Self::default();
        for record in records {
            if let Err(error) = result.absorb_record(record) {
                warn!(%error, "skipping cache record");
            }
        }
        result
    }

    fn absorb_record(&mut self, record: &Value) -> Result<()> {
        let kind = record
            .get("kind")
            .and_then(Value::as_u64)
            .ok_or_else(|| FeedError::MalformedRecord("missing kind".to_string()))?;
        let content = record.get("content").and_then(Value::as_str).unwrap_or("");

        match u32::try_from(kind) {
            Ok(KIND_TEXT_NOTE) => {
                let post: Post = serde_json::from_value(record.clone())?;
                self.order.push(post.id.clone());
                self.posts.push(post);
            }
            Ok(KIND_REPOST) => {
                let envelope: RepostEnvelope = serde_json::from_value(record.clone())?;
                if content.is_empty() {
                    return Err(FeedError::MalformedRecord(format!(
                        "repost {} has no embedded post",
                        envelope.id
                    )));
                }
                let post: Post = serde_json::from_str(content)?;
                if let Some(referenced) = referenced_event(&envelope.tags) {
                    if referenced != post.id {
                        return Err(FeedError::MalformedRecord(format!(
                            "repost {} references {referenced} but embeds {}",
                            envelope.id, post.id
                        )));
                    }
                }
                self.order.push(envelope.id.clone());
                self.reposts.push(Repost {
                    id: envelope.id,
                    pubkey: envelope.pubkey,
                    post,
                    date: envelope.created_at,
                });
            }
            Ok(KIND_METADATA) => {
                let pubkey = record.get("pubkey").and_then(Value::as_str).ok_or_else(|| {
                    FeedError::MalformedRecord("metadata without pubkey".to_string())
                })?;
                let mut profile: UserProfile = serde_json::from_str(content)?;
                profile.pubkey = pubkey.to_string();
                self.users.insert(profile.pubkey.clone(), profile);
            }
            Ok(KIND_CACHE_PAGINATION) => {
                self.pagination = Some(serde_json::from_str(content)?);
            }
            _ => debug!(kind, "ignoring cache record"),
        }
        Ok(())
    }

    fn profile_for(&self, pubkey: &str) -> UserProfile {
        self.users
            .get(pubkey)
            .cloned()
            .unwrap_or_else(|| UserProfile::placeholder(pubkey))
    }

    fn parse_post(&self, post: &Post) -> ParsedContent {
        ParsedContent {
            post: post.clone(),
            user: self.profile_for(&post.pubkey),
            reposted: None,
        }
    }

    fn parse_repost(&self, repost: &Repost) -> ParsedContent {
        ParsedContent {
            post: repost.post.clone(),
            user: self.profile_for(&repost.post.pubkey),
            reposted: Some(RepostWrapper {
                users: BTreeSet::from([repost.pubkey.clone()]),
                reposter: repost.pubkey.clone(),
                date: repost.date,
                id: repost.id.clone(),
            }),
        }
    }

    /// Timeline entries in delivery order.
    pub fn process(&self) -> Vec<ParsedContent> {
        if self.order.is_empty() {
            return self
                .posts
                .iter()
                .map(|post| self.parse_post(post))
                .chain(self.reposts.iter().map(|repost| self.parse_repost(repost)))
                .collect();
        }

        let posts: HashMap<&str, &Post> = self
            .posts
            .iter()
            .map(|post| (post.id.as_str(), post))
            .collect();
        let reposts: HashMap<&str, &Repost> = self
            .reposts
            .iter()
            .map(|repost| (repost.id.as_str(), repost))
            .collect();

        self.order
            .iter()
            .filter_map(|id| {
                if let Some(repost) = reposts.get(id.as_str()) {
                    Some(self.parse_repost(repost))
                } else {
                    posts.get(id.as_str()).map(|post| self.parse_post(post))
                }
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct RepostEnvelope {
    id: String,
    pubkey: String,
    #[serde(deserialize_with = "timestamp")]
    created_at: u64,
    #[serde(default)]
    tags: Vec<Vec<String>>,
}
