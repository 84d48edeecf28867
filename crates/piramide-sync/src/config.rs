use std::time::Duration;

use piramide_client::ClientConfig;

use crate::engine::VoteMode;

/// Default size of the trending list.
pub const DEFAULT_TRENDING_TOP_N: usize = 2;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Full feed refresh cadence.
    pub feed_interval: Duration,
    /// Status/health probe cadence.
    pub status_interval: Duration,
    /// Used whenever the endpoint is re-resolved and a fresh client is built.
    pub client: ClientConfig,
    pub vote_mode: VoteMode,
    /// Drop the chosen class after a successful post.
    pub reset_class_after_post: bool,
    pub trending_top_n: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            feed_interval: Duration::from_secs(15),
            status_interval: Duration::from_secs(5),
            client: ClientConfig::default(),
            vote_mode: VoteMode::Server,
            reset_class_after_post: false,
            trending_top_n: DEFAULT_TRENDING_TOP_N,
        }
    }
}
