//! The persistence/realtime collaborator contract.
//!
//! Row storage, row-level security, and change fan-out are the backend's
//! responsibility; the stores consume them through this trait and trust the
//! identifiers they are given.  Read-receipt enforcement is likewise the
//! backend's: [`DataBackend::mark_read`] is only ever invoked by the
//! receiver's client, but nothing client-side can stop a hostile caller, so
//! the server must reject flips where the caller is not the receiver.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use parley_shared::models::{Attachment, Message, Profile, Thread};
use parley_shared::types::{MessageId, ThreadId, UserId};

use crate::error::Result;

/// Insert payload for a new message.  The id, read flag, and creation
/// timestamp are assigned by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    pub thread_id: ThreadId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub body: Option<String>,
    pub attachment: Option<Attachment>,
}

/// Request/response data API over the Thread and Message entities.
#[async_trait]
pub trait DataBackend: Send + Sync {
    /// All threads involving `user`, any order.
    async fn list_threads(&self, user: UserId) -> Result<Vec<Thread>>;

    /// The thread connecting the unordered pair `(a, b)`, if one exists.
    /// Implementations must check both orderings.
    async fn find_thread(&self, a: UserId, b: UserId) -> Result<Option<Thread>>;

    /// Insert a thread for the pair `(a, b)`.
    ///
    /// Must fail with [`StoreError::Conflict`](crate::StoreError::Conflict)
    /// when a thread for the pair already exists, so that racing creators
    /// can re-query instead of duplicating the pair.
    async fn insert_thread(&self, a: UserId, b: UserId) -> Result<Thread>;

    /// Up to `limit` messages of `thread` strictly older than `before`
    /// (or the newest ones when `before` is `None`), newest first.
    async fn fetch_messages(
        &self,
        thread: ThreadId,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<Message>>;

    /// Persist a new message and return the stored row.
    async fn insert_message(&self, draft: MessageDraft) -> Result<Message>;

    /// Flip the read flag on every unread message in `thread` addressed to
    /// `receiver`.  Returns the ids that were flipped.
    async fn mark_read(&self, thread: ThreadId, receiver: UserId) -> Result<Vec<MessageId>>;

    /// Unread messages in `thread` addressed to `receiver`.
    async fn unread_count(&self, thread: ThreadId, receiver: UserId) -> Result<u32>;

    /// Public profiles for the given users; unknown ids are simply absent
    /// from the result.
    async fn fetch_profiles(&self, users: &[UserId]) -> Result<Vec<Profile>>;
}
