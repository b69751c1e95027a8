//! Thread list and sidebar summaries.
//!
//! The store is a pure state machine: backend I/O happens in the caller,
//! and every apply step here is safe to repeat (dedup by thread id) or to
//! receive out of order (a message for a thread whose insert event has not
//! arrived yet gets a provisional summary).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use parley_shared::models::{Message, Profile, Thread};
use parley_shared::types::{ThreadId, UserId};

use crate::error::{Result, StoreError};
use crate::events::{StoreEvent, StoreEvents};

/// Sidebar projection of one thread.
///
/// Derived, not authoritative: recomputed incrementally from message
/// activity, never by refetching history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadSummary {
    pub thread_id: ThreadId,
    /// The participant who is not the signed-in user.
    pub other_user: UserId,
    pub name: Option<String>,
    pub avatar: Option<String>,
    /// Denormalized most recent message.
    pub last_message: Option<Message>,
    /// Messages addressed to the signed-in user and not yet read.
    pub unread: u32,
}

/// Authoritative list of the signed-in user's threads, kept in
/// creation-time-descending order for the sidebar.
pub struct ThreadStore {
    user: Option<UserId>,
    threads: Vec<Thread>,
    summaries: HashMap<ThreadId, ThreadSummary>,
    events: StoreEvents,
}

impl ThreadStore {
    pub fn new(events: StoreEvents) -> Self {
        Self {
            user: None,
            threads: Vec::new(),
            summaries: HashMap::new(),
            events,
        }
    }

    /// Bind the signed-in user.  Clears any state left over from a previous
    /// session.
    pub fn bind_user(&mut self, user: UserId) {
        self.user = Some(user);
        self.threads.clear();
        self.summaries.clear();
    }

    pub fn user(&self) -> Option<UserId> {
        self.user
    }

    fn require_user(&self) -> Result<UserId> {
        self.user.ok_or(StoreError::NotAuthenticated)
    }

    /// Replace the thread list with a fresh backend snapshot.
    ///
    /// Summaries for threads that survived the refresh are kept; callers
    /// re-seed the rest via [`ThreadStore::seed_summary`].
    pub fn set_threads(&mut self, mut threads: Vec<Thread>) -> Result<()> {
        let user = self.require_user()?;
        threads.retain(|t| t.involves(user));
        threads.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
        self.summaries.retain(|id, _| threads.iter().any(|t| t.id == *id));
        self.threads = threads;
        Ok(())
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn thread(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == id)
    }

    /// Lookup by unordered participant pair.
    pub fn find_between(&self, a: UserId, b: UserId) -> Option<&Thread> {
        self.threads.iter().find(|t| t.is_between(a, b))
    }

    /// Insert a thread unless one with the same id is already present.
    ///
    /// This is the single entry point for both local creates and realtime
    /// thread-insert events, which makes duplicate delivery harmless.
    pub fn insert_if_absent(&mut self, thread: Thread) -> Result<bool> {
        let user = self.require_user()?;
        if !thread.involves(user) {
            return Ok(false);
        }
        if self.threads.iter().any(|t| t.id == thread.id) {
            debug!(thread = %thread.id.short(), "thread already present, skipping");
            return Ok(false);
        }

        self.ensure_summary(thread.id, thread.other_participant(user));
        self.threads.push(thread.clone());
        self.threads
            .sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
        self.events.emit(StoreEvent::ThreadInserted(thread));
        Ok(true)
    }

    /// Attach profile data and initial counters to a thread's summary.
    pub fn seed_summary(
        &mut self,
        thread_id: ThreadId,
        profile: Option<&Profile>,
        last_message: Option<Message>,
        unread: u32,
    ) -> Result<()> {
        let user = self.require_user()?;
        let other = self
            .thread(thread_id)
            .ok_or(StoreError::NotFound)?
            .other_participant(user)
            .ok_or_else(|| StoreError::InvalidInput("user is not a participant".into()))?;

        let summary = ThreadSummary {
            thread_id,
            other_user: other,
            name: profile.and_then(|p| p.name.clone()),
            avatar: profile.and_then(|p| p.avatar.clone()),
            last_message,
            unread,
        };
        self.summaries.insert(thread_id, summary.clone());
        self.events.emit(StoreEvent::SummaryUpdated(summary));
        Ok(())
    }

    pub fn summary(&self, thread_id: ThreadId) -> Option<&ThreadSummary> {
        self.summaries.get(&thread_id)
    }

    /// Summaries in sidebar order.  Provisional summaries (message seen
    /// before the thread row arrived) trail the known threads.
    pub fn summaries(&self) -> Vec<ThreadSummary> {
        let mut out: Vec<ThreadSummary> = self
            .threads
            .iter()
            .filter_map(|t| self.summaries.get(&t.id).cloned())
            .collect();
        out.extend(
            self.summaries
                .values()
                .filter(|s| self.thread(s.thread_id).is_none())
                .cloned(),
        );
        out
    }

    /// Fold a message into its thread's summary as the new last message.
    ///
    /// Called for both outgoing sends and incoming realtime inserts.  An
    /// older message arriving late (cross-channel reordering) never
    /// displaces a newer last message.
    pub fn record_message(&mut self, msg: &Message) -> Result<()> {
        let user = self.require_user()?;
        let other = if msg.sender_id == user {
            msg.receiver_id
        } else {
            msg.sender_id
        };
        self.ensure_summary(msg.thread_id, Some(other));

        let summary = self
            .summaries
            .get_mut(&msg.thread_id)
            .expect("summary ensured above");
        let displaces = match &summary.last_message {
            Some(last) => msg.id == last.id || msg.sort_key() >= last.sort_key(),
            None => true,
        };
        if displaces {
            summary.last_message = Some(msg.clone());
            let snapshot = summary.clone();
            self.events.emit(StoreEvent::SummaryUpdated(snapshot));
        }
        Ok(())
    }

    /// Re-render a read-flag flip onto the denormalized last message.
    pub fn patch_last_message(&mut self, msg: &Message) {
        if let Some(summary) = self.summaries.get_mut(&msg.thread_id) {
            if summary.last_message.as_ref().map(|m| m.id) == Some(msg.id) {
                summary.last_message = Some(msg.clone());
                let snapshot = summary.clone();
                self.events.emit(StoreEvent::SummaryUpdated(snapshot));
            }
        }
    }

    /// Attach display data without clobbering counters or the last message.
    pub fn set_profile(&mut self, thread_id: ThreadId, profile: &Profile) {
        if let Some(summary) = self.summaries.get_mut(&thread_id) {
            summary.name = profile.name.clone();
            summary.avatar = profile.avatar.clone();
            let snapshot = summary.clone();
            self.events.emit(StoreEvent::SummaryUpdated(snapshot));
        }
    }

    /// Bump the unread counter; returns the new count.
    pub fn increment_unread(&mut self, thread_id: ThreadId) -> u32 {
        match self.summaries.get_mut(&thread_id) {
            Some(summary) => {
                summary.unread += 1;
                let count = summary.unread;
                let snapshot = summary.clone();
                self.events.emit(StoreEvent::SummaryUpdated(snapshot));
                count
            }
            None => 0,
        }
    }

    /// Zero the unread counter (thread opened); returns the previous count.
    pub fn reset_unread(&mut self, thread_id: ThreadId) -> u32 {
        match self.summaries.get_mut(&thread_id) {
            Some(summary) if summary.unread > 0 => {
                let previous = summary.unread;
                summary.unread = 0;
                let snapshot = summary.clone();
                self.events.emit(StoreEvent::SummaryUpdated(snapshot));
                previous
            }
            _ => 0,
        }
    }

    fn ensure_summary(&mut self, thread_id: ThreadId, other: Option<UserId>) {
        if self.summaries.contains_key(&thread_id) {
            return;
        }
        let Some(other) = other else { return };
        self.summaries.insert(
            thread_id,
            ThreadSummary {
                thread_id,
                other_user: other,
                name: None,
                avatar: None,
                last_message: None,
                unread: 0,
            },
        );
    }
}
