//! Feed merge engine.
//!
//! A [`FeedManager`] owns one timeline. Requests run as spawned tasks and
//! report back on an internal channel; [`FeedManager::next_update`] applies
//! them one at a time on the owner's task, so timeline state is never shared.
//! Every completion carries the generation that issued it and is dropped if a
//! refresh happened in between.

use crate::config::FeedConfig;
use crate::cursor::PaginationCursor;
use crate::error::{FeedError, Result};
use crate::merge::RepostIndex;
use crate::model::{ParsedContent, PostRequestResult, UserProfile};
use crate::requests::{CacheRequest, FeedDirective, FeedSource};
use crate::thread::{ThreadView, arrange_thread};
use crate::transport::{FeedTransport, fetch_posts};
use nostr::IdentityProvider;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

enum FeedMessage {
    Page {
        generation: u64,
        result: Result<PostRequestResult>,
    },
    Future {
        generation: u64,
        result: Result<PostRequestResult>,
    },
    Thread {
        generation: u64,
        event_id: String,
        result: Result<PostRequestResult>,
    },
    PollTick,
    Foreground,
    Muted(String),
}

/// Outcome of one applied completion or signal.
#[derive(Debug)]
pub enum FeedUpdate {
    /// Entries appended after the last timeline entry.
    PageAppended { added: usize },
    /// Nothing older is available; the timeline is unchanged.
    ReachedEnd,
    /// Polled entries spliced into the head of the timeline.
    FuturePostsAdded { added: usize },
    /// Polled entries held until [`FeedManager::add_all_future_posts`].
    FuturePostsBuffered { buffered: usize },
    /// A poll found nothing new.
    NoNewPosts,
    ThreadLoaded { focal_index: usize },
    /// The thread response did not contain the focal post.
    ThreadMissing,
    Muted { removed: usize },
    /// A poll signal issued a request.
    PollStarted,
    /// A poll signal arrived while polling was not possible.
    PollSkipped,
    /// Completion of a request superseded by a refresh.
    Stale,
    /// The request failed; state is unchanged and may be retried.
    Failed(FeedError),
}

/// Count and authors of posts the user has not scrolled to yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPostsSummary {
    pub count: usize,
    pub users: Vec<UserProfile>,
}

/// Cloneable sender for signals that originate outside the owner task.
#[derive(Clone)]
pub struct FeedHandle {
    tx: mpsc::UnboundedSender<FeedMessage>,
}

impl FeedHandle {
    /// App returned to the foreground; poll for newer posts.
    pub fn notify_foreground(&self) -> bool {
        self.tx.send(FeedMessage::Foreground).is_ok()
    }

    /// A user was muted; drop their entries.
    pub fn notify_muted(&self, pubkey: impl Into<String>) -> bool {
        self.tx.send(FeedMessage::Muted(pubkey.into())).is_ok()
    }

    fn tick(&self) -> bool {
        self.tx.send(FeedMessage::PollTick).is_ok()
    }
}

pub struct FeedManager {
    transport: Arc<dyn FeedTransport>,
    identity: Arc<dyn IdentityProvider>,
    config: FeedConfig,
    source: FeedSource,
    timeline: Vec<ParsedContent>,
    future_posts: Vec<ParsedContent>,
    new_added_posts: usize,
    cursor: Option<PaginationCursor>,
    reposts: RepostIndex,
    thread: Option<ThreadView>,
    loading: bool,
    polling: bool,
    at_end: bool,
    generation: u64,
    page_task: Option<JoinHandle<()>>,
    poll_task: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<FeedMessage>,
    rx: mpsc::UnboundedReceiver<FeedMessage>,
}

impl FeedManager {
    /// Idle manager; call [`FeedManager::refresh`] to load the first page.
    pub fn new(
        transport: Arc<dyn FeedTransport>,
        identity: Arc<dyn IdentityProvider>,
        source: FeedSource,
        config: FeedConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            transport,
            identity,
            config,
            source,
            timeline: Vec::new(),
            future_posts: Vec::new(),
            new_added_posts: 0,
            cursor: None,
            reposts: RepostIndex::new(),
            thread: None,
            loading: false,
            polling: false,
            at_end: false,
            generation: 0,
            page_task: None,
            poll_task: None,
            tx,
            rx,
        }
    }

    /// The user's chronological home feed.
    pub fn home(
        transport: Arc<dyn FeedTransport>,
        identity: Arc<dyn IdentityProvider>,
        config: FeedConfig,
    ) -> Self {
        let latest = FeedDirective::latest(&identity.user_pubkey());
        Self::new(transport, identity, FeedSource::Directive(latest), config)
    }

    pub fn handle(&self) -> FeedHandle {
        FeedHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn timeline(&self) -> &[ParsedContent] {
        &self.timeline
    }

    pub fn future_posts(&self) -> &[ParsedContent] {
        &self.future_posts
    }

    pub fn cursor(&self) -> Option<&PaginationCursor> {
        self.cursor.as_ref()
    }

    pub fn source(&self) -> &FeedSource {
        &self.source
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn thread_view(&self) -> Option<&ThreadView> {
        self.thread.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn is_at_end(&self) -> bool {
        self.at_end
    }

    pub fn new_added_posts(&self) -> usize {
        self.new_added_posts
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn reposted_by(&self, post_id: &str) -> Option<Vec<String>> {
        self.reposts
            .users(post_id)
            .map(|users| users.iter().cloned().collect())
    }

    /// Whether polled posts go straight into the timeline or into the buffer.
    pub fn set_add_future_posts_directly(&mut self, directly: bool) {
        self.config.add_future_posts_directly = directly;
    }

    /// Drop all state and request the first page (or the thread).
    pub fn refresh(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        for task in [self.page_task.take(), self.poll_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }

        self.timeline.clear();
        self.future_posts.clear();
        self.new_added_posts = 0;
        self.cursor = None;
        self.reposts.clear();
        self.thread = None;
        self.loading = false;
        self.polling = false;
        self.at_end = false;
        debug!(generation = self.generation, "feed refreshed");

        if let FeedSource::Thread { event_id } = &self.source {
            let event_id = event_id.clone();
            self.issue_thread_request(event_id);
        } else {
            self.request_next_page();
        }
    }

    pub fn set_source(&mut self, source: FeedSource) {
        self.source = source;
        self.refresh();
    }

    pub fn set_feed(&mut self, feed: FeedDirective) {
        self.set_source(FeedSource::Directive(feed));
    }

    /// Toggle replies for profile and directive feeds, then refresh.
    pub fn set_with_replies(&mut self, include: bool) {
        match &mut self.source {
            FeedSource::Profile { with_replies, .. } => *with_replies = include,
            FeedSource::Directive(feed) => feed.include_replies = Some(include),
            FeedSource::Search(_) | FeedSource::Thread { .. } => {}
        }
        self.refresh();
    }

    /// Switch to the conversation around `event_id`.
    pub fn request_thread(&mut self, event_id: impl Into<String>) {
        self.set_source(FeedSource::Thread {
            event_id: event_id.into(),
        });
    }

    /// Request the next older page. Returns whether a request was issued.
    pub fn request_next_page(&mut self) -> bool {
        if self.loading || self.at_end {
            return false;
        }
        if !self
            .cursor
            .as_ref()
            .is_none_or(PaginationCursor::is_chronological)
        {
            return false;
        }
        let Some(request) = self.next_page_request() else {
            return false;
        };

        self.loading = true;
        let generation = self.generation;
        self.page_task = Some(self.dispatch(request, move |result| FeedMessage::Page {
            generation,
            result,
        }));
        true
    }

    /// Poll for posts newer than the loaded window. Returns whether a request
    /// was issued.
    pub fn poll_future_posts(&mut self) -> bool {
        if self.polling {
            return false;
        }
        let Some(feed) = self.source.directive() else {
            return false;
        };
        let Some(cursor) = self.cursor.as_ref().filter(|cursor| cursor.is_chronological()) else {
            return false;
        };

        let request = CacheRequest::feed_directive(
            &feed.directive,
            &self.identity.user_pubkey(),
            self.config.poll_limit,
        )
        .with_since(cursor.poll_since());

        self.polling = true;
        let generation = self.generation;
        self.poll_task = Some(self.dispatch(request, move |result| FeedMessage::Future {
            generation,
            result,
        }));
        true
    }

    /// Same as a poll tick; the app came back to the foreground.
    pub fn notify_foreground(&mut self) -> bool {
        self.poll_future_posts()
    }

    /// Tick the poll timer: first after `first_poll_delay`, then every
    /// `poll_interval`. Ends when the manager is dropped.
    pub fn spawn_poller(&self) -> JoinHandle<()> {
        let handle = self.handle();
        let first = self.config.first_poll_delay;
        let every = self.config.poll_interval;
        tokio::spawn(async move {
            tokio::time::sleep(first).await;
            if !handle.tick() {
                return;
            }
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !handle.tick() {
                    return;
                }
            }
        })
    }

    /// Remove every entry authored or reposted by `pubkey`.
    pub fn mute(&mut self, pubkey: &str) -> usize {
        let before = self.timeline.len() + self.future_posts.len();
        let muted_head = self
            .timeline
            .iter()
            .take(self.new_added_posts)
            .filter(|entry| entry.involves(pubkey))
            .count();
        self.new_added_posts -= muted_head;
        self.timeline.retain(|entry| !entry.involves(pubkey));
        self.future_posts.retain(|entry| !entry.involves(pubkey));

        if let Some(focal_id) = self
            .thread
            .as_ref()
            .and_then(ThreadView::focal)
            .map(|focal| focal.post.id.clone())
        {
            self.thread = arrange_thread(self.timeline.clone(), &focal_id);
        }

        let removed = before - (self.timeline.len() + self.future_posts.len());
        debug!(removed, "muted entries removed");
        removed
    }

    /// The user scrolled up to `index`.
    pub fn did_show_post(&mut self, index: usize) {
        if index < self.new_added_posts {
            self.new_added_posts = index;
        }
    }

    /// Move buffered future posts into the timeline head.
    pub fn add_all_future_posts(&mut self) -> usize {
        let added = self.future_posts.len();
        if added > 0 {
            let mut merged = std::mem::take(&mut self.future_posts);
            merged.append(&mut self.timeline);
            self.timeline = merged;
        }
        self.new_added_posts = 0;
        added
    }

    pub fn new_posts_summary(&self) -> NewPostsSummary {
        let users = self
            .future_posts
            .iter()
            .chain(self.timeline.iter().take(self.new_added_posts))
            .map(|entry| entry.user.clone())
            .collect();
        NewPostsSummary {
            count: self.new_added_posts + self.future_posts.len(),
            users,
        }
    }

    /// Wait for the next completion or signal and apply it.
    pub async fn next_update(&mut self) -> Option<FeedUpdate> {
        let message = self.rx.recv().await?;
        Some(self.apply(message))
    }

    fn apply(&mut self, message: FeedMessage) -> FeedUpdate {
        match message {
            FeedMessage::Page { generation, result } => {
                if self.is_stale(generation) {
                    return FeedUpdate::Stale;
                }
                self.page_task = None;
                self.loading = false;
                match result {
                    Ok(result) => self.apply_page(result),
                    Err(error) => {
                        warn!(%error, "page request failed");
                        FeedUpdate::Failed(error)
                    }
                }
            }
            FeedMessage::Future { generation, result } => {
                if self.is_stale(generation) {
                    return FeedUpdate::Stale;
                }
                self.poll_task = None;
                self.polling = false;
                match result {
                    Ok(result) => self.apply_future(result),
                    Err(error) => {
                        warn!(%error, "future post poll failed");
                        FeedUpdate::Failed(error)
                    }
                }
            }
            FeedMessage::Thread {
                generation,
                event_id,
                result,
            } => {
                if self.is_stale(generation) {
                    return FeedUpdate::Stale;
                }
                self.page_task = None;
                self.loading = false;
                match result {
                    Ok(result) => self.apply_thread(result, &event_id),
                    Err(error) => {
                        warn!(%error, event_id = %event_id, "thread request failed");
                        FeedUpdate::Failed(error)
                    }
                }
            }
            FeedMessage::PollTick | FeedMessage::Foreground => {
                if self.poll_future_posts() {
                    FeedUpdate::PollStarted
                } else {
                    FeedUpdate::PollSkipped
                }
            }
            FeedMessage::Muted(pubkey) => FeedUpdate::Muted {
                removed: self.mute(&pubkey),
            },
        }
    }

    fn is_stale(&self, generation: u64) -> bool {
        if generation == self.generation {
            return false;
        }
        debug!(
            generation,
            current = self.generation,
            "dropping superseded response"
        );
        true
    }

    fn apply_page(&mut self, result: PostRequestResult) -> FeedUpdate {
        if let Some(page) = &result.pagination {
            match &mut self.cursor {
                Some(cursor) => cursor.advance_older(page),
                None => self.cursor = Some(page.clone()),
            }
        }

        let mut batch = result.process();
        let overlaps = match (self.timeline.last(), batch.first()) {
            (Some(last), Some(first)) => last.post.id == first.post.id,
            _ => false,
        };
        if overlaps {
            batch.remove(0);
        }
        if batch.is_empty() {
            self.at_end = true;
            return FeedUpdate::ReachedEnd;
        }

        let grouped = self.reposts.group(batch);
        self.sync_reposts(&grouped.updated);
        if grouped.survivors.is_empty() {
            self.at_end = true;
            return FeedUpdate::ReachedEnd;
        }

        let added = grouped.survivors.len();
        self.timeline.extend(grouped.survivors);
        debug!(added, total = self.timeline.len(), "page appended");
        FeedUpdate::PageAppended { added }
    }

    fn apply_future(&mut self, result: PostRequestResult) -> FeedUpdate {
        if let (Some(cursor), Some(page)) = (self.cursor.as_mut(), result.pagination.as_ref()) {
            cursor.advance_newer(page);
        }

        let candidates: Vec<ParsedContent> = result
            .process()
            .into_iter()
            .filter(|candidate| !candidate.post.id.is_empty() && !self.is_known(candidate))
            .collect();

        let grouped = self.reposts.group(candidates);
        self.sync_reposts(&grouped.updated);
        if grouped.survivors.is_empty() {
            return FeedUpdate::NoNewPosts;
        }

        let count = grouped.survivors.len();
        let mut merged = grouped.survivors;
        if self.config.add_future_posts_directly {
            merged.append(&mut self.timeline);
            self.timeline = merged;
            self.new_added_posts += count;
            debug!(added = count, "future posts added");
            FeedUpdate::FuturePostsAdded { added: count }
        } else {
            merged.append(&mut self.future_posts);
            self.future_posts = merged;
            debug!(buffered = count, "future posts buffered");
            FeedUpdate::FuturePostsBuffered { buffered: count }
        }
    }

    fn apply_thread(&mut self, result: PostRequestResult, event_id: &str) -> FeedUpdate {
        self.apply_page(result);
        self.thread = arrange_thread(self.timeline.clone(), event_id);
        match &self.thread {
            Some(view) => FeedUpdate::ThreadLoaded {
                focal_index: view.focal_index,
            },
            None => FeedUpdate::ThreadMissing,
        }
    }

    /// Already shown or buffered. A repost is only known if an entry for the
    /// same post already lists its reposter.
    fn is_known(&self, candidate: &ParsedContent) -> bool {
        self.timeline
            .iter()
            .chain(&self.future_posts)
            .filter(|existing| existing.post.id == candidate.post.id)
            .any(|existing| match candidate.reposter() {
                None => true,
                Some(reposter) => existing
                    .reposted
                    .as_ref()
                    .is_some_and(|wrapper| wrapper.users.contains(reposter)),
            })
    }

    fn sync_reposts(&mut self, post_ids: &[String]) {
        self.reposts.sync_users(post_ids, &mut self.timeline);
        self.reposts.sync_users(post_ids, &mut self.future_posts);
    }

    fn next_page_request(&self) -> Option<CacheRequest> {
        let user_pubkey = self.identity.user_pubkey();
        let limit = self.config.page_limit;
        match &self.source {
            FeedSource::Profile {
                pubkey,
                with_replies,
            } => {
                let mut request = CacheRequest::profile_feed(pubkey, &user_pubkey, limit);
                if let Some(cursor) = &self.cursor {
                    request = request.with_until(cursor.next_page_until());
                } else if let Some(last) = self.timeline.last() {
                    request = request.with_until(last.feed_date());
                }
                if *with_replies {
                    request = request.with_include_replies();
                }
                Some(request)
            }
            FeedSource::Thread { .. } => None,
            source => {
                let feed = source.directive()?;
                let mut request = CacheRequest::feed_directive(&feed.directive, &user_pubkey, limit);
                if let Some(cursor) = &self.cursor {
                    request = request.with_until(cursor.next_page_until());
                }
                if feed.include_replies == Some(true) {
                    request = request.with_include_replies();
                }
                Some(request)
            }
        }
    }

    fn issue_thread_request(&mut self, event_id: String) {
        let request = CacheRequest::thread_view(
            &event_id,
            self.config.thread_limit,
            &self.identity.user_pubkey(),
        );
        self.loading = true;
        let generation = self.generation;
        self.page_task = Some(self.dispatch(request, move |result| FeedMessage::Thread {
            generation,
            event_id,
            result,
        }));
    }

    fn dispatch<F>(&self, request: CacheRequest, wrap: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<PostRequestResult>) -> FeedMessage + Send + 'static,
    {
        let transport = Arc::clone(&self.transport);
        let tx = self.tx.clone();
        debug!(request = %request.name, "feed request issued");
        tokio::spawn(async move {
            let result = fetch_posts(transport.as_ref(), &request).await;
            if tx.send(wrap(result)).is_err() {
                debug!(request = %request.name, "feed manager gone before response");
            }
        })
    }
}

impl Drop for FeedManager {
    fn drop(&mut self) {
        for task in [self.page_task.take(), self.poll_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}
