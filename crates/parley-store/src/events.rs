//! Store change notifications.
//!
//! Consumers (a UI layer, tests) subscribe to a broadcast channel instead of
//! polling store state.  Emission is fire-and-forget: a store never fails
//! because nobody is listening.

use tokio::sync::broadcast;

use parley_shared::models::{Message, Thread};
use parley_shared::types::{MessageId, ThreadId};

use crate::threads::ThreadSummary;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A thread entered the store (local create or realtime insert).
    ThreadInserted(Thread),
    /// A sidebar summary changed (last message, unread count, profile).
    SummaryUpdated(ThreadSummary),
    /// The active thread changed; previous message state was discarded.
    ThreadOpened(ThreadId),
    /// A message was appended to the open thread.
    MessageAppended(Message),
    /// An existing message was patched (read-flag flip).
    MessagePatched(Message),
    /// A page of history was prepended to the open thread.
    OlderMessagesLoaded { thread: ThreadId, count: usize },
    /// Messages addressed to the current user were marked read on open.
    MessagesMarkedRead { thread: ThreadId, ids: Vec<MessageId> },
}

/// Shared emitter handle; clones feed the same subscribers.
#[derive(Debug, Clone)]
pub struct StoreEvents {
    tx: broadcast::Sender<StoreEvent>,
}

impl StoreEvents {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: StoreEvent) {
        // Send only fails when there are no subscribers, which is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for StoreEvents {
    fn default() -> Self {
        Self::new()
    }
}
