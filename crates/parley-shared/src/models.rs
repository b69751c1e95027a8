//! Domain records exchanged with the backend.
//!
//! Every struct derives `Serialize` and `Deserialize`: realtime change
//! payloads carry these rows as JSON, and the same shapes are handed to
//! whatever UI layer consumes the stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{CODE_EXPIRY_MINUTES, CODE_MAX_USES};
use crate::types::{MessageId, ThreadId, UserId};

// ---------------------------------------------------------------------------
// Thread
// ---------------------------------------------------------------------------

/// A two-party conversation container.
///
/// The participant pair is unordered for lookup purposes: a thread between A
/// and B is the same thread no matter who initiated it, so callers must check
/// both orderings (see [`Thread::is_between`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Thread {
    /// Unique thread identifier.
    pub id: ThreadId,
    /// The participant who initiated the thread.
    pub user_a: UserId,
    /// The other participant.
    pub user_b: UserId,
    /// When the thread was created.
    pub created_at: DateTime<Utc>,
}

impl Thread {
    /// Whether `user` is one of the two participants.
    pub fn involves(&self, user: UserId) -> bool {
        self.user_a == user || self.user_b == user
    }

    /// Whether this thread connects exactly the unordered pair `(a, b)`.
    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.user_a == a && self.user_b == b) || (self.user_a == b && self.user_b == a)
    }

    /// The participant who is not `me`.  Returns `None` when `me` is not a
    /// participant at all.
    pub fn other_participant(&self, me: UserId) -> Option<UserId> {
        if self.user_a == me {
            Some(self.user_b)
        } else if self.user_b == me {
            Some(self.user_a)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// What a message attachment points at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    File,
}

/// A single uploaded attachment.  At most one per message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    pub kind: AttachmentKind,
}

/// A single chat message.
///
/// A message carries a text body, an attachment, or both; never neither.
/// The only mutation a message ever sees is the receiver's client flipping
/// the `read` flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Server-assigned sequence id.
    pub id: MessageId,
    /// The thread this message belongs to.
    pub thread_id: ThreadId,
    /// The sending participant.
    pub sender_id: UserId,
    /// The receiving participant (the thread member who is not the sender).
    pub receiver_id: UserId,
    /// Text body, if any.
    pub body: Option<String>,
    /// Attachment, if any.
    pub attachment: Option<Attachment>,
    /// Whether the receiver has seen this message.
    pub read: bool,
    /// When the message was created, as assigned by the backend.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Sort key enforcing the thread ordering invariant: creation time
    /// ascending, ties broken by id ascending.
    pub fn sort_key(&self) -> (DateTime<Utc>, MessageId) {
        (self.created_at, self.id)
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Public user record, as shown in the sidebar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: UserId,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

// ---------------------------------------------------------------------------
// Connection code
// ---------------------------------------------------------------------------

/// Issuance policy for a connection code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodePolicy {
    pub expiration_minutes: i64,
    pub max_uses: u32,
}

impl Default for CodePolicy {
    fn default() -> Self {
        Self {
            expiration_minutes: CODE_EXPIRY_MINUTES,
            max_uses: CODE_MAX_USES,
        }
    }
}

/// A short-lived token one user generates and another redeems to establish
/// a thread.  Issued and validated by the backend; the client only displays
/// it and hands it back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionCode {
    pub code: String,
    pub owner: UserId,
    pub expires_at: DateTime<Utc>,
    pub max_uses: u32,
    pub uses: u32,
}

impl ConnectionCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_spent(&self) -> bool {
        self.uses >= self.max_uses
    }
}
