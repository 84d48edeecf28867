use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use piramide_types::events::FeedEvent;

use crate::dispatcher::{ChangeNotifier, Dispatcher};

/// Heartbeat interval: a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub heartbeat_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: HEARTBEAT_INTERVAL,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// A background `/ws` client feeding a [`Dispatcher`]. Dropping it stops the task.
pub struct WsNotifier {
    dispatcher: Dispatcher,
    task: JoinHandle<()>,
}

impl WsNotifier {
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl ChangeNotifier for WsNotifier {
    fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.dispatcher.subscribe()
    }

    fn is_connected(&self) -> bool {
        self.dispatcher.is_connected()
    }
}

impl Drop for WsNotifier {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Connects to `ws_url` in the background and keeps reconnecting with
/// jittered exponential backoff. Failures are logged, never returned.
pub fn spawn_ws_notifier(ws_url: String, config: NotifierConfig) -> WsNotifier {
    let dispatcher = Dispatcher::new();
    let task = tokio::spawn(run(ws_url, dispatcher.clone(), config));
    WsNotifier { dispatcher, task }
}

async fn run(ws_url: String, dispatcher: Dispatcher, config: NotifierConfig) {
    let mut backoff = config.initial_backoff;

    loop {
        match tokio_tungstenite::connect_async(ws_url.as_str()).await {
            Ok((stream, _)) => {
                info!("Change channel connected to {}", ws_url);
                backoff = config.initial_backoff;
                dispatcher.set_connected(true);
                run_connection_loop(stream, &dispatcher, config.heartbeat_interval).await;
                dispatcher.set_connected(false);
                info!("Change channel disconnected, falling back to polling");
            }
            Err(e) => {
                debug!("Change channel unavailable at {}: {}", ws_url, e);
            }
        }

        let jitter = Duration::from_millis(rand::rng().random_range(0..=250));
        tokio::time::sleep(backoff + jitter).await;
        backoff = (backoff * 2).min(config.max_backoff);
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn run_connection_loop(stream: Socket, dispatcher: &Dispatcher, heartbeat_interval: Duration) {
    let (mut sender, mut receiver) = stream.split();

    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.tick().await;
    let mut pong_received = true;
    let mut missed_heartbeats: u8 = 0;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        trace!("Change frame ({} bytes)", text.len());
                        dispatcher.notify(FeedEvent::from_frame(text.as_str()));
                    }
                    Some(Ok(Message::Binary(_))) => dispatcher.notify(FeedEvent::Changed),
                    Some(Ok(Message::Pong(_))) => pong_received = true,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Change channel read error: {}", e);
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if pong_received {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        warn!("Heartbeat timeout (missed {} pongs), dropping change channel", missed_heartbeats);
                        break;
                    }
                }
                pong_received = false;
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
}
