//! Single entry point translating server-pushed change events into store
//! mutations.
//!
//! Delivery is at-least-once and unordered across channels, so nothing here
//! assumes it is seeing an event for the first time: message inserts dedup
//! by id, thread inserts go through the store's insert-if-absent rule, and
//! read-flag updates for unknown messages are no-ops.  A malformed event is
//! logged and dropped; it must never stall the loop behind it.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use parley_shared::models::Message;
use parley_shared::protocol::{ChangeEvent, RawChange};
use parley_shared::types::UserId;
use parley_store::{MessageStore, ThreadStore};

use crate::notify::{message_notification, Notifier};

pub struct RealtimeIngest {
    user: UserId,
    threads: Arc<Mutex<ThreadStore>>,
    messages: Arc<Mutex<MessageStore>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl RealtimeIngest {
    pub fn new(
        user: UserId,
        threads: Arc<Mutex<ThreadStore>>,
        messages: Arc<Mutex<MessageStore>>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            user,
            threads,
            messages,
            notifier,
        }
    }

    /// Drain the change feed until the subscription is torn down.
    pub async fn run(self, mut rx: mpsc::Receiver<RawChange>) {
        info!(user = %self.user.short(), "realtime ingest started");
        while let Some(raw) = rx.recv().await {
            match ChangeEvent::decode(&raw) {
                Ok(event) => self.apply(event),
                Err(e) => {
                    warn!(
                        table = %raw.table,
                        action = %raw.action,
                        error = %e,
                        "dropping malformed change event"
                    );
                }
            }
        }
        info!("change feed closed, ingest stopping");
    }

    /// Apply one validated event.  Applying the same event twice leaves the
    /// stores in the same state as applying it once.
    pub fn apply(&self, event: ChangeEvent) {
        match event {
            ChangeEvent::MessageInserted(msg) => self.on_message_inserted(msg),
            ChangeEvent::MessageUpdated(msg) => self.on_message_updated(msg),
            ChangeEvent::ThreadInserted(thread) => {
                let Ok(mut threads) = self.threads.lock() else {
                    warn!("thread store lock poisoned, dropping thread insert");
                    return;
                };
                match threads.insert_if_absent(thread) {
                    Ok(inserted) => {
                        if inserted {
                            debug!("thread inserted from change feed");
                        }
                    }
                    Err(e) => warn!(error = %e, "dropping thread insert"),
                }
            }
        }
    }

    fn on_message_inserted(&self, msg: Message) {
        if msg.sender_id != self.user && msg.receiver_id != self.user {
            debug!(id = %msg.id, "message for another user, ignoring");
            return;
        }

        let appended_to_open = {
            let Ok(mut messages) = self.messages.lock() else {
                warn!("message store lock poisoned, dropping message insert");
                return;
            };
            let is_open = messages.active_thread().map(|t| t.id) == Some(msg.thread_id);
            if is_open {
                messages.append(msg.clone());
            }
            is_open
        };

        let sender_name = {
            let Ok(mut threads) = self.threads.lock() else {
                warn!("thread store lock poisoned, dropping summary update");
                return;
            };
            if let Err(e) = threads.record_message(&msg) {
                warn!(error = %e, "dropping summary update");
                return;
            }
            if !appended_to_open && msg.receiver_id == self.user {
                threads.increment_unread(msg.thread_id);
            }
            threads
                .summary(msg.thread_id)
                .and_then(|s| s.name.clone())
        };

        // Fire-and-forget: a failed banner never affects store state, which
        // is why this runs after every mutation is already applied.
        if !appended_to_open && msg.receiver_id == self.user {
            if let Some(notifier) = &self.notifier {
                let name = sender_name.unwrap_or_else(|| msg.sender_id.short());
                notifier.notify(message_notification(&name, &msg));
            }
        }
    }

    fn on_message_updated(&self, msg: Message) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.patch(msg.clone());
        }
        if let Ok(mut threads) = self.threads.lock() {
            threads.patch_last_message(&msg);
        }
    }
}
