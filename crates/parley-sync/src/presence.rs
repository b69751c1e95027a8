//! Live online/typing tracking.
//!
//! Rebuilt entirely from broadcast events; nothing is persisted and the set
//! is empty at cold start, so absence always means "unknown or offline",
//! never an error.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use parley_shared::protocol::PresenceEvent;
use parley_shared::types::{ThreadId, UserId};

/// Tracks who is currently online and who is composing where.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    online: HashSet<UserId>,
    typing: HashSet<(ThreadId, UserId)>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one broadcast event.  Returns whether anything changed.
    pub fn apply(&mut self, event: PresenceEvent) -> bool {
        match event {
            PresenceEvent::Sync { online } => {
                let next: HashSet<UserId> = online.into_iter().collect();
                self.typing.retain(|(_, user)| next.contains(user));
                if next == self.online {
                    false
                } else {
                    debug!(count = next.len(), "presence snapshot applied");
                    self.online = next;
                    true
                }
            }
            PresenceEvent::Join { user } | PresenceEvent::Heartbeat { user } => {
                self.online.insert(user)
            }
            PresenceEvent::Leave { user } => {
                self.typing.retain(|(_, u)| *u != user);
                self.online.remove(&user)
            }
            PresenceEvent::TypingStarted { user, thread } => self.typing.insert((thread, user)),
            PresenceEvent::TypingStopped { user, thread } => self.typing.remove(&(thread, user)),
        }
    }

    /// Pure lookup; no side effects.
    pub fn is_online(&self, user: UserId) -> bool {
        self.online.contains(&user)
    }

    pub fn is_typing(&self, thread: ThreadId, user: UserId) -> bool {
        self.typing.contains(&(thread, user))
    }

    pub fn online_users(&self) -> Vec<UserId> {
        self.online.iter().copied().collect()
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }
}

/// Drain a presence subscription into a shared tracker until the channel
/// closes (subscription torn down).
pub async fn drive(tracker: Arc<Mutex<PresenceTracker>>, mut rx: mpsc::Receiver<PresenceEvent>) {
    while let Some(event) = rx.recv().await {
        match tracker.lock() {
            Ok(mut guard) => {
                guard.apply(event);
            }
            Err(e) => {
                warn!(error = %e, "presence tracker lock poisoned, dropping event");
            }
        }
    }
    debug!("presence channel closed");
}
