use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::broadcast;

use piramide_types::events::FeedEvent;

/// Capability to learn that the feed changed. Consumers hold it as
/// `Option<Arc<dyn ChangeNotifier>>`; `None` means polling only.
pub trait ChangeNotifier: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<FeedEvent>;

    /// Whether a live channel currently backs this notifier.
    fn is_connected(&self) -> bool;
}

/// Fans change events out to every subscriber.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<FeedEvent>,
    connected: AtomicBool,
    received: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connected: AtomicBool::new(false),
                received: AtomicU64::new(0),
            }),
        }
    }

    /// Publish an event to all subscribers. Having none is fine.
    pub fn notify(&self, event: FeedEvent) {
        self.inner.received.fetch_add(1, Ordering::Relaxed);
        let _ = self.inner.broadcast_tx.send(event);
    }

    pub fn events_received(&self) -> u64 {
        self.inner.received.load(Ordering::Relaxed)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::Release);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier for Dispatcher {
    fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }
}
