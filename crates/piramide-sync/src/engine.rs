use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info, warn};

use piramide_client::{ClientConfig, ClientError, Endpoint, FeedClient, Resolver};
use piramide_store::LocalStore;
use piramide_store::models::LedgerEntry;
use piramide_types::models::{ClassTag, Post, PostId, Reply, ServerStatus, VoteState};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::overlay::VoteOverlay;
use crate::tags;

/// Where vote tallies come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VoteMode {
    /// The backend counts votes; local state only bridges the round-trip.
    #[default]
    Server,
    /// The backend has no vote endpoint; the viewer's own vote is added locally.
    LocalOnly,
}

/// Phase of the feed. A background refresh of a `Ready` feed keeps showing
/// the old list instead of going back to `Loading`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FeedState {
    #[default]
    Idle,
    Loading,
    Ready(Vec<Post>),
    Failed(String),
}

impl FeedState {
    pub fn posts(&self) -> &[Post] {
        match self {
            Self::Ready(posts) => posts,
            _ => &[],
        }
    }
}

/// A post as it should be rendered: tallies adjusted, local flags attached.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub post: Post,
    pub my_vote: VoteState,
    pub reported: bool,
    pub vote_pending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RepliesOutcome {
    Loaded(Vec<Reply>),
    /// The post left the feed while its replies were loading.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Sent,
    AlreadyReported,
    /// The backend has no report endpoint; the post is flagged locally only.
    RecordedLocally,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteOutcome {
    pub vote: VoteState,
    pub upvotes: i64,
}

/// Feed reconciliation engine. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct FeedEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    client: RwLock<FeedClient>,
    resolver: Option<Resolver>,
    client_config: ClientConfig,
    endpoint_stale: AtomicBool,
    store: Arc<LocalStore>,
    fingerprint: String,
    feed: RwLock<Feed>,
    overlay: Mutex<VoteOverlay>,
    fetch_seq: AtomicU64,
    generation: AtomicU64,
    vote_mode: RwLock<VoteMode>,
    /// Serialises ledger read, request and ledger write per post.
    vote_locks: Mutex<HashMap<PostId, Arc<Mutex<()>>>>,
    status: RwLock<ServerStatus>,
    mutations: Arc<Notify>,
    trending_top_n: usize,
}

#[derive(Default)]
struct Feed {
    state: FeedState,
    applied_ticket: u64,
}

impl FeedEngine {
    /// `resolver` enables re-resolution after connectivity failures; without
    /// it the engine stays on `client`'s endpoint forever.
    pub fn new(
        client: FeedClient,
        store: Arc<LocalStore>,
        resolver: Option<Resolver>,
        config: &SyncConfig,
    ) -> Result<Self> {
        let fingerprint = store.fingerprint()?;
        let vote_mode = if store.local_vote_counting()? {
            VoteMode::LocalOnly
        } else {
            config.vote_mode
        };

        Ok(Self {
            inner: Arc::new(EngineInner {
                client: RwLock::new(client),
                resolver,
                client_config: config.client.clone(),
                endpoint_stale: AtomicBool::new(false),
                store,
                fingerprint,
                feed: RwLock::new(Feed::default()),
                overlay: Mutex::new(VoteOverlay::new()),
                fetch_seq: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                vote_mode: RwLock::new(vote_mode),
                vote_locks: Mutex::new(HashMap::new()),
                status: RwLock::new(ServerStatus::Unknown),
                mutations: Arc::new(Notify::new()),
                trending_top_n: config.trending_top_n,
            }),
        })
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.inner.store
    }

    pub fn fingerprint(&self) -> &str {
        &self.inner.fingerprint
    }

    pub async fn endpoint(&self) -> Endpoint {
        self.inner.client.read().await.endpoint().clone()
    }

    pub async fn state(&self) -> FeedState {
        self.inner.feed.read().await.state.clone()
    }

    /// Bumped every time a fetched post list replaces the previous one.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    pub async fn vote_mode(&self) -> VoteMode {
        *self.inner.vote_mode.read().await
    }

    /// Fires after every successful local mutation.
    pub fn mutation_signal(&self) -> Arc<Notify> {
        self.inner.mutations.clone()
    }

    pub async fn last_status(&self) -> ServerStatus {
        self.inner.status.read().await.clone()
    }

    // -- Reads --

    /// Fetches the post list and makes it current. Returns the post count.
    pub async fn refresh(&self) -> Result<usize> {
        let client = match self.current_client().await {
            Ok(client) => client,
            Err(e) => {
                self.inner.feed.write().await.state = FeedState::Failed(e.to_string());
                return Err(e.into());
            }
        };

        let ticket = self.inner.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut feed = self.inner.feed.write().await;
            if !matches!(feed.state, FeedState::Ready(_)) {
                feed.state = FeedState::Loading;
            }
        }

        match client.list_posts().await {
            Ok(posts) => Ok(self.apply(ticket, posts).await),
            Err(e) => {
                self.note_failure(&e);
                let mut feed = self.inner.feed.write().await;
                if ticket > feed.applied_ticket {
                    warn!("Feed refresh failed: {}", e);
                    feed.state = FeedState::Failed(e.to_string());
                }
                Err(e.into())
            }
        }
    }

    async fn apply(&self, ticket: u64, posts: Vec<Post>) -> usize {
        let live: Vec<PostId> = posts.iter().map(|p| p.id.clone()).collect();
        {
            let mut feed = self.inner.feed.write().await;
            if ticket < feed.applied_ticket {
                debug!("Discarding fetch #{} superseded by #{}", ticket, feed.applied_ticket);
                return feed.state.posts().len();
            }
            feed.applied_ticket = ticket;
            feed.state = FeedState::Ready(posts);
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
        }

        let cleared = self.inner.overlay.lock().await.fetched(ticket);
        if cleared > 0 {
            debug!("Fetch #{} superseded {} optimistic tallies", ticket, cleared);
        }
        self.inner
            .vote_locks
            .lock()
            .await
            .retain(|id, lock| Arc::strong_count(lock) > 1 || live.contains(id));
        if let Err(e) = self.inner.store.retain_posts(&live) {
            warn!("Failed to trim vote ledger: {:#}", e);
        }
        live.len()
    }

    /// Posts merged with the optimistic overlay and the local ledger.
    pub async fn render_list(&self) -> Vec<FeedItem> {
        let posts = self.inner.feed.read().await.state.posts().to_vec();
        let mode = self.vote_mode().await;
        let ledger: HashMap<PostId, LedgerEntry> = match self.inner.store.ledger() {
            Ok(entries) => entries.into_iter().map(|e| (e.post_id.clone(), e)).collect(),
            Err(e) => {
                warn!("Vote ledger unavailable: {:#}", e);
                HashMap::new()
            }
        };
        let overlay = self.inner.overlay.lock().await;

        posts
            .into_iter()
            .map(|mut post| {
                let entry = ledger
                    .get(&post.id)
                    .cloned()
                    .unwrap_or_else(|| LedgerEntry::empty(post.id.clone()));
                post.upvotes = match mode {
                    VoteMode::Server => overlay.displayed(&post.id, post.upvotes),
                    VoteMode::LocalOnly => post.upvotes + entry.vote.delta(),
                };
                FeedItem {
                    vote_pending: overlay.has_pending(&post.id),
                    post,
                    my_vote: entry.vote,
                    reported: entry.reported,
                }
            })
            .collect()
    }

    pub async fn trending(&self) -> Vec<(String, usize)> {
        let feed = self.inner.feed.read().await;
        tags::trending(feed.state.posts(), self.inner.trending_top_n)
    }

    /// Replies for one post. Discarded as `Stale` if a newer feed no longer
    /// lists the post by the time they arrive.
    pub async fn load_replies(&self, post_id: &PostId) -> Result<RepliesOutcome> {
        let started = self.generation();
        let client = self.current_client().await?;

        let replies = match client.list_replies(post_id).await {
            Ok(replies) => replies,
            Err(e) => {
                self.note_failure(&e);
                return Err(e.into());
            }
        };

        if self.generation() != started && !self.contains(post_id).await {
            debug!("Replies for post {} arrived after it left the feed", post_id);
            return Ok(RepliesOutcome::Stale);
        }
        Ok(RepliesOutcome::Loaded(replies))
    }

    /// Probes `/status` and remembers the answer. Offline marks the
    /// endpoint for re-resolution.
    pub async fn status(&self) -> ServerStatus {
        let status = match self.current_client().await {
            Ok(client) => client.status().await,
            Err(e) => {
                debug!("Status probe skipped: {}", e);
                ServerStatus::Offline
            }
        };

        if status == ServerStatus::Offline {
            self.mark_stale();
        }

        let mut last = self.inner.status.write().await;
        if *last != status {
            info!("Server status: {:?}", status);
        }
        *last = status.clone();
        status
    }

    // -- Writes --

    pub async fn create_post(&self, text: &str, class_tag: ClassTag) -> Result<Post> {
        let client = self
            .current_client()
            .await
            .map_err(|e| SyncError::write(e, text))?;

        match client.create_post(text, class_tag).await {
            Ok(post) => {
                info!("Post {} published as {}", post.id, class_tag);
                self.insert_created(post.clone()).await;
                self.mutated();
                Ok(post)
            }
            Err(e) => {
                self.note_failure(&e);
                Err(SyncError::write(e, text))
            }
        }
    }

    pub async fn create_reply(&self, post_id: &PostId, text: &str, class_tag: ClassTag) -> Result<Reply> {
        let client = self
            .current_client()
            .await
            .map_err(|e| SyncError::write(e, text))?;

        match client.create_reply(post_id, text, class_tag).await {
            Ok(reply) => {
                let mut feed = self.inner.feed.write().await;
                if let FeedState::Ready(posts) = &mut feed.state {
                    if let Some(post) = posts.iter_mut().find(|p| &p.id == post_id) {
                        post.replies_count += 1;
                    }
                }
                drop(feed);
                self.mutated();
                Ok(reply)
            }
            Err(e) => {
                self.note_failure(&e);
                Err(SyncError::write(e, text))
            }
        }
    }

    /// Casts `choice`; choosing the current vote again retracts it.
    pub async fn vote(&self, post_id: &PostId, choice: VoteState) -> Result<VoteOutcome> {
        let server_upvotes = self
            .server_upvotes(post_id)
            .await
            .ok_or_else(|| SyncError::UnknownPost(post_id.clone()))?;

        let lock = self.vote_lock(post_id).await;
        let _guard = lock.lock().await;

        let current = self.inner.store.vote_state(post_id)?;
        let next = if choice == current {
            VoteState::None
        } else {
            choice
        };
        let delta = next.delta() - current.delta();

        if self.vote_mode().await == VoteMode::LocalOnly {
            self.inner.store.record_vote(post_id, next)?;
            return Ok(VoteOutcome {
                vote: next,
                upvotes: server_upvotes + next.delta(),
            });
        }

        if delta == 0 {
            let upvotes = self.inner.overlay.lock().await.displayed(post_id, server_upvotes);
            return Ok(VoteOutcome { vote: next, upvotes });
        }

        let client = self.current_client().await?;
        self.inner.overlay.lock().await.begin(post_id, delta);

        match client.vote(post_id, delta, &self.inner.fingerprint).await {
            Ok(resp) => {
                let last_ticket = self.inner.fetch_seq.load(Ordering::SeqCst);
                let upvotes = {
                    let mut overlay = self.inner.overlay.lock().await;
                    overlay.settle(post_id, delta, resp.upvotes, last_ticket);
                    overlay.displayed(post_id, server_upvotes)
                };
                self.inner.store.record_vote(post_id, next)?;
                self.mutated();
                Ok(VoteOutcome { vote: next, upvotes })
            }
            Err(ClientError::Unsupported(reason)) => {
                self.inner.overlay.lock().await.rollback(post_id, delta);
                warn!("Vote endpoint unsupported ({}), counting votes locally", reason);
                *self.inner.vote_mode.write().await = VoteMode::LocalOnly;
                if let Err(e) = self.inner.store.set_local_vote_counting(true) {
                    warn!("Failed to persist local vote counting: {:#}", e);
                }
                self.inner.store.record_vote(post_id, next)?;
                Ok(VoteOutcome {
                    vote: next,
                    upvotes: server_upvotes + next.delta(),
                })
            }
            Err(e) => {
                self.inner.overlay.lock().await.rollback(post_id, delta);
                self.note_failure(&e);
                Err(e.into())
            }
        }
    }

    /// Reports a post once per device.
    pub async fn report(&self, post_id: &PostId, reason: Option<&str>) -> Result<ReportOutcome> {
        if self.inner.store.is_reported(post_id)? {
            return Ok(ReportOutcome::AlreadyReported);
        }

        let client = self.current_client().await?;
        match client.report(post_id, &self.inner.fingerprint, reason).await {
            Ok(()) => {
                self.inner.store.mark_reported(post_id)?;
                self.mutated();
                Ok(ReportOutcome::Sent)
            }
            Err(ClientError::Unsupported(reason)) => {
                debug!("Report endpoint unsupported ({}), flagging locally", reason);
                self.inner.store.mark_reported(post_id)?;
                Ok(ReportOutcome::RecordedLocally)
            }
            Err(e) => {
                self.note_failure(&e);
                Err(e.into())
            }
        }
    }

    // -- Internals --

    /// The client to use now, re-resolving first if the endpoint went stale.
    async fn current_client(&self) -> std::result::Result<FeedClient, ClientError> {
        if self.inner.endpoint_stale.load(Ordering::Acquire) {
            if let Some(resolver) = &self.inner.resolver {
                let endpoint = resolver.resolve().await?;
                let fresh = FeedClient::new(endpoint, &self.inner.client_config)?;

                let mut client = self.inner.client.write().await;
                if client.endpoint() != fresh.endpoint() {
                    info!(
                        "API endpoint moved: {} -> {}",
                        client.endpoint().base_url(),
                        fresh.endpoint().base_url()
                    );
                }
                *client = fresh.clone();
                self.inner.endpoint_stale.store(false, Ordering::Release);
                return Ok(fresh);
            }
        }
        Ok(self.inner.client.read().await.clone())
    }

    fn note_failure(&self, e: &ClientError) {
        if e.is_connectivity() {
            self.mark_stale();
        }
    }

    fn mark_stale(&self) {
        if self.inner.resolver.is_some() && !self.inner.endpoint_stale.swap(true, Ordering::AcqRel) {
            debug!("Endpoint marked stale, re-resolving on next use");
        }
    }

    async fn vote_lock(&self, post_id: &PostId) -> Arc<Mutex<()>> {
        self.inner
            .vote_locks
            .lock()
            .await
            .entry(post_id.clone())
            .or_default()
            .clone()
    }

    fn mutated(&self) {
        self.inner.mutations.notify_one();
    }

    async fn contains(&self, post_id: &PostId) -> bool {
        let feed = self.inner.feed.read().await;
        feed.state.posts().iter().any(|p| &p.id == post_id)
    }

    async fn server_upvotes(&self, post_id: &PostId) -> Option<i64> {
        let feed = self.inner.feed.read().await;
        feed.state
            .posts()
            .iter()
            .find(|p| &p.id == post_id)
            .map(|p| p.upvotes)
    }

    async fn insert_created(&self, post: Post) {
        if post.id.as_str().is_empty() {
            return;
        }
        let mut feed = self.inner.feed.write().await;
        if let FeedState::Ready(posts) = &mut feed.state {
            if !posts.iter().any(|p| p.id == post.id) {
                posts.insert(0, post);
            }
        }
    }
}
