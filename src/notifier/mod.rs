//! Change Notifier
//!
//! Publishes "session state changed for user X" events so observers of the
//! logged-in registry can refresh. Publishing never blocks and never fails the
//! operation that triggered it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

/// Topic name carried on every event
pub const USER_SESSION_CHANGED: &str = "userSessionChanged";

/// A change to one user's session state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionChanged {
    pub topic: &'static str,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Broadcasts session change events to any number of subscribers
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<SessionChanged>,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a change for `user_name`
    pub fn notify(&self, user_name: &str) {
        let event = SessionChanged {
            topic: USER_SESSION_CHANGED,
            user_name: user_name.to_string(),
            timestamp: Utc::now(),
        };

        if self.sender.send(event).is_err() {
            debug!(user = user_name, "No subscribers for session change event");
        }
    }

    /// Receive future events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionChanged> {
        self.sender.subscribe()
    }

    /// Receive future events as a stream
    pub fn stream(&self) -> BroadcastStream<SessionChanged> {
        BroadcastStream::new(self.sender.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}
