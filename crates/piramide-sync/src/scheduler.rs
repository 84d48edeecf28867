use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use piramide_gateway::ChangeNotifier;
use piramide_types::events::FeedEvent;

use crate::config::SyncConfig;
use crate::engine::FeedEngine;

/// Shortest period either timer will run at.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Drives [`FeedEngine::refresh`] from every trigger: the feed interval,
/// local mutations and the optional push channel. Also runs the status probe.
pub struct Scheduler {
    engine: FeedEngine,
    feed_interval: Duration,
    status_interval: Duration,
    notifier: Option<Arc<dyn ChangeNotifier>>,
}

impl Scheduler {
    pub fn new(engine: FeedEngine, config: &SyncConfig) -> Self {
        Self {
            engine,
            feed_interval: clamped("feed", config.feed_interval),
            status_interval: clamped("status", config.status_interval),
            notifier: None,
        }
    }

    // TODO: respawn the push channel when the engine re-resolves to a new endpoint
    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Runs until `shutdown` completes. The first feed and status ticks fire
    /// immediately.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        let mut feed_tick = tokio::time::interval(self.feed_interval);
        feed_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut status_tick = tokio::time::interval(self.status_interval);
        status_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mutations = self.engine.mutation_signal();
        // Only the receiver is kept, so the channel closes with its producer
        let mut events = self.notifier.take().map(|n| n.subscribe());

        info!(
            "Refresh scheduler started (feed every {:?}, status every {:?}, push {})",
            self.feed_interval,
            self.status_interval,
            if events.is_some() { "on" } else { "off" }
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = feed_tick.tick() => self.refresh("interval").await,
                _ = status_tick.tick() => {
                    self.engine.status().await;
                }
                _ = mutations.notified() => self.refresh("local change").await,
                event = next_event(&mut events) => match event {
                    Some(event) => {
                        debug!("Push event {:?}", event);
                        self.refresh("push").await;
                    }
                    None => {
                        info!("Push channel closed, polling only");
                        events = None;
                    }
                },
            }
        }

        info!("Refresh scheduler stopped");
    }

    async fn refresh(&self, trigger: &str) {
        match self.engine.refresh().await {
            Ok(count) => debug!("Refresh ({}) loaded {} posts", trigger, count),
            Err(e) => debug!("Refresh ({}) failed: {}", trigger, e),
        }
    }
}

fn clamped(name: &str, period: Duration) -> Duration {
    if period < MIN_INTERVAL {
        warn!("{} interval {:?} too short, using {:?}", name, period, MIN_INTERVAL);
        return MIN_INTERVAL;
    }
    period
}

/// Next push event; pends forever without a channel. `None` once it closes.
async fn next_event(events: &mut Option<broadcast::Receiver<FeedEvent>>) -> Option<FeedEvent> {
    let Some(rx) = events.as_mut() else {
        return std::future::pending().await;
    };
    match rx.recv().await {
        Ok(event) => Some(event),
        Err(RecvError::Lagged(n)) => {
            debug!("Push receiver lagged by {} events", n);
            Some(FeedEvent::Changed)
        }
        Err(RecvError::Closed) => None,
    }
}
