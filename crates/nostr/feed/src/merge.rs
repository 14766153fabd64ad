//! Repost grouping: one canonical timeline entry per reposted post.

use crate::model::ParsedContent;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
struct CanonicalRepost {
    wrapper_id: String,
    users: BTreeSet<String>,
}

/// Result of folding one batch into the index.
#[derive(Debug, Default)]
pub struct Grouped {
    /// Batch entries that should be inserted, in batch order.
    pub survivors: Vec<ParsedContent>,
    /// Post ids whose existing canonical entry gained reposting identities.
    pub updated: Vec<String>,
}

/// Map from reposted post id to the repost event that represents it.
#[derive(Debug, Default)]
pub struct RepostIndex {
    canonical: HashMap<String, CanonicalRepost>,
}

impl RepostIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.canonical.clear();
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }

    /// Reposting identities recorded for `post_id`.
    pub fn users(&self, post_id: &str) -> Option<&BTreeSet<String>> {
        self.canonical.get(post_id).map(|entry| &entry.users)
    }

    /// Whether `entry` is the registered representative of its post.
    pub fn is_canonical(&self, entry: &ParsedContent) -> bool {
        match &entry.reposted {
            Some(wrapper) => self
                .canonical
                .get(&entry.post.id)
                .is_some_and(|canonical| canonical.wrapper_id == wrapper.id),
            None => false,
        }
    }

    /// Group the reposts in `batch` by post id.
    ///
    /// A post already registered absorbs the batch's reposting identities and
    /// every batch repost of it is dropped. Otherwise the first batch repost
    /// becomes canonical with the union of the group's identities and the
    /// others are dropped. Non-repost entries always survive.
    pub fn group(&mut self, batch: Vec<ParsedContent>) -> Grouped {
        let mut batch_users: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut first_seen: Vec<(String, String)> = Vec::new();
        for entry in &batch {
            let Some(wrapper) = &entry.reposted else {
                continue;
            };
            let users = batch_users.entry(entry.post.id.clone()).or_insert_with(|| {
                first_seen.push((entry.post.id.clone(), wrapper.id.clone()));
                BTreeSet::new()
            });
            users.extend(wrapper.users.iter().cloned());
        }

        let mut registered = HashSet::new();
        let mut updated = Vec::new();
        for (post_id, wrapper_id) in first_seen {
            let users = batch_users.remove(&post_id).unwrap_or_default();
            match self.canonical.get_mut(&post_id) {
                Some(existing) => {
                    let before = existing.users.len();
                    existing.users.extend(users);
                    if existing.users.len() > before {
                        updated.push(post_id);
                    }
                }
                None => {
                    self.canonical
                        .insert(post_id.clone(), CanonicalRepost { wrapper_id, users });
                    registered.insert(post_id);
                }
            }
        }

        let survivors = batch
            .into_iter()
            .filter_map(|mut entry| {
                let Some(wrapper) = entry.reposted.as_mut() else {
                    return Some(entry);
                };
                if !registered.contains(&entry.post.id) {
                    return None;
                }
                let canonical = self.canonical.get(&entry.post.id)?;
                if canonical.wrapper_id != wrapper.id {
                    return None;
                }
                wrapper.users = canonical.users.clone();
                Some(entry)
            })
            .collect();

        Grouped { survivors, updated }
    }

    /// Copy the recorded identities of `post_ids` onto their canonical entries.
    pub fn sync_users(&self, post_ids: &[String], entries: &mut [ParsedContent]) {
        if post_ids.is_empty() {
            return;
        }
        for entry in entries.iter_mut() {
            if !post_ids.contains(&entry.post.id) {
                continue;
            }
            let Some(canonical) = self.canonical.get(&entry.post.id) else {
                continue;
            };
            if let Some(wrapper) = entry.reposted.as_mut() {
                if wrapper.id == canonical.wrapper_id {
                    wrapper.users.clone_from(&canonical.users);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Post, RepostWrapper, UserProfile};

    fn post(id: &str, author: &str) -> ParsedContent {
        ParsedContent {
            post: Post {
                id: id.to_string(),
                pubkey: author.to_string(),
                created_at: 10,
                kind: 1,
                tags: vec![],
                content: String::new(),
            },
            user: UserProfile::placeholder(author),
            reposted: None,
        }
    }

    fn repost(id: &str, post_id: &str, reposter: &str) -> ParsedContent {
        let mut entry = post(post_id, "author");
        entry.reposted = Some(RepostWrapper {
            users: BTreeSet::from([reposter.to_string()]),
            reposter: reposter.to_string(),
            date: 20,
            id: id.to_string(),
        });
        entry
    }

    fn users(entry: &ParsedContent) -> Vec<&str> {
        entry
            .reposted
            .as_ref()
            .map(|wrapper| wrapper.users.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    #[test]
    fn first_repost_in_batch_becomes_canonical() {
        let mut index = RepostIndex::new();
        let grouped = index.group(vec![
            repost("r1", "p", "alice"),
            post("q", "dave"),
            repost("r2", "p", "bob"),
        ]);

        assert_eq!(grouped.survivors.len(), 2);
        assert_eq!(grouped.survivors[0].reposted.as_ref().map(|w| w.id.as_str()), Some("r1"));
        assert_eq!(users(&grouped.survivors[0]), vec!["alice", "bob"]);
        assert_eq!(grouped.survivors[1].post.id, "q");
        assert!(grouped.updated.is_empty());
        assert!(index.is_canonical(&grouped.survivors[0]));
    }

    #[test]
    fn later_batches_fold_into_existing_entry() {
        let mut index = RepostIndex::new();
        let mut timeline = index.group(vec![repost("r1", "p", "alice")]).survivors;

        let grouped = index.group(vec![repost("r2", "p", "bob"), repost("r3", "p", "alice")]);
        assert!(grouped.survivors.is_empty());
        assert_eq!(grouped.updated, vec!["p".to_string()]);

        index.sync_users(&grouped.updated, &mut timeline);
        assert_eq!(users(&timeline[0]), vec!["alice", "bob"]);
        assert_eq!(timeline[0].reposter(), Some("alice"));
    }

    #[test]
    fn redelivered_canonical_is_dropped() {
        let mut index = RepostIndex::new();
        index.group(vec![repost("r1", "p", "alice")]);

        let grouped = index.group(vec![repost("r1", "p", "alice")]);
        assert!(grouped.survivors.is_empty());
        assert!(grouped.updated.is_empty());
        assert_eq!(index.len(), 1);
    }
}
