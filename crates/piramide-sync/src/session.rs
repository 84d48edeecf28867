use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use piramide_client::ClientError;
use piramide_client::client::EMPTY_TEXT_MESSAGE;
use piramide_store::LocalStore;
use piramide_types::models::{ClassTag, Post, PostId, Reply, Theme, VoteState, normalize_text};

use crate::composer::{Composer, PendingAction, SelectionState, Staged};
use crate::config::SyncConfig;
use crate::engine::{FeedEngine, ReportOutcome, VoteOutcome};
use crate::error::{Result, SyncError};

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Posted(Post),
    Replied(Reply),
    /// Parked until a class is chosen; the selector is open.
    AwaitingClass,
}

/// Everything one front-end session needs: the feed engine, the composer
/// state machine and the local store. Created at startup, lives until exit.
pub struct Session {
    engine: FeedEngine,
    store: Arc<LocalStore>,
    composer: Mutex<Composer>,
}

impl Session {
    pub fn new(engine: FeedEngine, config: &SyncConfig) -> Self {
        Self {
            store: engine.store().clone(),
            engine,
            composer: Mutex::new(Composer::new(config.reset_class_after_post)),
        }
    }

    pub fn engine(&self) -> &FeedEngine {
        &self.engine
    }

    pub fn selection(&self) -> SelectionState {
        self.composer().state()
    }

    pub fn pending(&self) -> Option<PendingAction> {
        self.composer().pending().cloned()
    }

    // -- Composer --

    pub async fn submit_post(&self, text: &str) -> Result<SubmitOutcome> {
        let text = validated(text)?;
        let staged = self.composer().stage(PendingAction::Post { text });
        self.perform(staged).await
    }

    pub async fn submit_reply(&self, post_id: &PostId, text: &str) -> Result<SubmitOutcome> {
        let text = validated(text)?;
        let staged = self.composer().stage(PendingAction::Reply {
            post_id: post_id.clone(),
            text,
        });
        self.perform(staged).await
    }

    pub fn open_selector(&self) {
        self.composer().open();
    }

    pub fn cancel_selection(&self) {
        self.composer().cancel();
    }

    /// Chooses a class. A parked submission is sent right away with it.
    pub async fn select_class(&self, class_tag: ClassTag) -> Result<Option<SubmitOutcome>> {
        let pending = self.composer().select(class_tag);
        match pending {
            Some(action) => {
                debug!("Class {} chosen, sending parked submission", class_tag);
                self.perform(Staged::Ready(action, class_tag)).await.map(Some)
            }
            None => Ok(None),
        }
    }

    async fn perform(&self, staged: Staged) -> Result<SubmitOutcome> {
        match staged {
            Staged::AwaitingClass => {
                info!("No class chosen yet, submission parked");
                Ok(SubmitOutcome::AwaitingClass)
            }
            Staged::Ready(PendingAction::Post { text }, class_tag) => {
                let post = self.engine.create_post(&text, class_tag).await?;
                self.composer().post_succeeded();
                Ok(SubmitOutcome::Posted(post))
            }
            Staged::Ready(PendingAction::Reply { post_id, text }, class_tag) => {
                let reply = self.engine.create_reply(&post_id, &text, class_tag).await?;
                Ok(SubmitOutcome::Replied(reply))
            }
        }
    }

    // -- Feed actions --

    pub async fn vote(&self, post_id: &PostId, choice: VoteState) -> Result<VoteOutcome> {
        self.engine.vote(post_id, choice).await
    }

    pub async fn report(&self, post_id: &PostId, reason: Option<&str>) -> Result<ReportOutcome> {
        self.engine.report(post_id, reason).await
    }

    // -- Preferences --

    pub fn theme(&self) -> Result<Theme> {
        Ok(self.store.theme()?)
    }

    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        Ok(self.store.set_theme(theme)?)
    }

    pub fn toggle_theme(&self) -> Result<Theme> {
        Ok(self.store.toggle_theme()?)
    }

    fn composer(&self) -> MutexGuard<'_, Composer> {
        // Composer transitions cannot panic midway, so a poisoned lock still
        // holds a consistent state.
        self.composer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn validated(text: &str) -> Result<String> {
    normalize_text(text).ok_or_else(|| {
        SyncError::write(ClientError::Validation(EMPTY_TEXT_MESSAGE.to_string()), text)
    })
}
