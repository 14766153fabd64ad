//! Feed merge engine for cache-server timelines.
//!
//! - paginated page merge with boundary dedup and repost grouping
//! - future-post polling into the timeline head or a side buffer
//! - mute propagation and thread ordering

pub mod config;
pub mod cursor;
pub mod error;
pub mod manager;
pub mod merge;
pub mod model;
pub mod requests;
pub mod thread;
pub mod transport;

pub use config::FeedConfig;
pub use cursor::{OrderBy, PaginationCursor};
pub use error::{FeedError, Result};
pub use manager::{FeedHandle, FeedManager, FeedUpdate, NewPostsSummary};
pub use merge::{Grouped, RepostIndex};
pub use model::{ParsedContent, Post, PostRequestResult, Repost, RepostWrapper, UserProfile};
pub use requests::{CacheRequest, FeedDirective, FeedSource};
pub use thread::{ThreadView, arrange_thread};
pub use transport::{FeedTransport, fetch_posts, fetch_user_infos};
