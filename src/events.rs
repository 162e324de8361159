//! Observable router events.
//!
//! Listeners call `Router::subscribe()` and receive every event emitted after
//! subscribing. Emission never blocks dispatch; events are dropped when no
//! one is listening.

use axum::http::{Method, StatusCode};
use tokio::sync::broadcast;

/// Capacity of the event channel before slow receivers lag.
pub const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterEvent {
    /// A request was decorated and is about to be routed.
    Connect { method: Method, path: String, ip: String },
    /// The error path closed a response.
    Error {
        method: Method,
        path: String,
        status: StatusCode,
        message: String,
    },
    /// The response was handed back to the transport.
    Finish {
        method: Method,
        path: String,
        status: StatusCode,
        ip: String,
    },
    /// The connection went away before the response completed.
    Close { method: Method, path: String },
}

/// Sending half of the event channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: broadcast::Sender<RouterEvent>,
}

impl EventSender {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: RouterEvent) {
        // No receivers is not an error.
        let _ = self.tx.send(event);
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new()
    }
}
