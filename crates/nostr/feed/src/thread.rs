//! Conversation ordering around a focal post.

use crate::model::ParsedContent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadView {
    pub posts: Vec<ParsedContent>,
    /// Index of the focal post in `posts`.
    pub focal_index: usize,
}

impl ThreadView {
    pub fn focal(&self) -> Option<&ParsedContent> {
        self.posts.get(self.focal_index)
    }
}

/// Older posts ascending, then the focal post, then newer posts descending.
///
/// Posts sharing the focal post's timestamp are treated as newer. Other
/// entries carrying the focal id are dropped. Returns `None` if `focal_id` is
/// not among `posts`.
pub fn arrange_thread(posts: Vec<ParsedContent>, focal_id: &str) -> Option<ThreadView> {
    let focal_position = posts.iter().position(|entry| entry.post.id == focal_id)?;
    let mut rest = posts;
    let focal = rest.remove(focal_position);
    rest.retain(|entry| entry.post.id != focal_id);

    let (mut before, mut after): (Vec<_>, Vec<_>) = rest
        .into_iter()
        .partition(|entry| entry.post.created_at < focal.post.created_at);
    before.sort_by_key(|entry| entry.post.created_at);
    after.sort_by(|left, right| right.post.created_at.cmp(&left.post.created_at));

    let focal_index = before.len();
    let mut ordered = before;
    ordered.push(focal);
    ordered.extend(after);
    Some(ThreadView {
        posts: ordered,
        focal_index,
    })
}
