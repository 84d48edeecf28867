//! Optional real-time change channel.
//!
//! The channel is a latency optimization only: when it is missing or broken,
//! consumers fall back to interval polling without telling the user.

pub mod connection;
pub mod dispatcher;

pub use connection::{NotifierConfig, WsNotifier, spawn_ws_notifier};
pub use dispatcher::{ChangeNotifier, Dispatcher};
