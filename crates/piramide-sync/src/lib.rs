//! Feed reconciliation, hashtag trending and the submission session.
//!
//! `FeedEngine` owns the fetched post list and the optimistic vote overlay,
//! `Session` is the explicit context a front-end talks to, and `Scheduler`
//! turns timers and push signals into refreshes.

pub mod composer;
pub mod config;
pub mod engine;
pub mod error;
pub mod overlay;
pub mod scheduler;
pub mod session;
pub mod tags;

pub use composer::{PendingAction, SelectionState};
pub use config::SyncConfig;
pub use engine::{
    FeedEngine, FeedItem, FeedState, RepliesOutcome, ReportOutcome, VoteMode, VoteOutcome,
};
pub use error::{Result, SyncError};
pub use scheduler::Scheduler;
pub use session::{Session, SubmitOutcome};
