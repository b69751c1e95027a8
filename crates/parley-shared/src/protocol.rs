//! Typed boundary for server-pushed payloads.
//!
//! The realtime transport delivers untyped JSON.  Everything is validated
//! into the tagged enums below before it may touch a store; a payload that
//! fails validation is dropped at the ingest edge, never propagated.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::models::{Message, Thread};
use crate::types::{ThreadId, UserId};

/// Table names the change feed is keyed by.
pub const TABLE_THREADS: &str = "threads";
pub const TABLE_MESSAGES: &str = "messages";

/// Row actions the change feed delivers.
pub const ACTION_INSERT: &str = "INSERT";
pub const ACTION_UPDATE: &str = "UPDATE";

/// One raw change notification, exactly as the transport hands it over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawChange {
    /// Source table of the changed row.
    pub table: String,
    /// `INSERT` or `UPDATE`.
    pub action: String,
    /// The new row, untyped.
    pub row: Value,
}

/// A validated change event, safe to apply to the stores.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    MessageInserted(Message),
    MessageUpdated(Message),
    ThreadInserted(Thread),
}

impl ChangeEvent {
    /// Validate a raw notification into a typed event.
    ///
    /// Delivery is at-least-once and unordered across channels, so this
    /// only vouches for the shape of the payload; dedup against already
    /// applied rows is the stores' job.
    pub fn decode(raw: &RawChange) -> Result<Self, ProtocolError> {
        match (raw.table.as_str(), raw.action.as_str()) {
            (TABLE_MESSAGES, ACTION_INSERT) => Ok(Self::MessageInserted(decode_row(
                TABLE_MESSAGES,
                &raw.row,
            )?)),
            (TABLE_MESSAGES, ACTION_UPDATE) => Ok(Self::MessageUpdated(decode_row(
                TABLE_MESSAGES,
                &raw.row,
            )?)),
            (TABLE_THREADS, ACTION_INSERT) => {
                Ok(Self::ThreadInserted(decode_row(TABLE_THREADS, &raw.row)?))
            }
            (TABLE_THREADS, action) | (TABLE_MESSAGES, action) => {
                Err(ProtocolError::UnsupportedAction(action.to_string()))
            }
            (table, _) => Err(ProtocolError::UnknownTable(table.to_string())),
        }
    }
}

fn decode_row<T: serde::de::DeserializeOwned>(
    table: &'static str,
    row: &Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(row.clone()).map_err(|source| ProtocolError::MalformedRow {
        table,
        source,
    })
}

/// Events on the presence broadcast channel.
///
/// Typing notifications ride the same channel as online status; both are
/// ephemeral and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceEvent {
    /// Full snapshot of who is online, sent on (re)subscribe.
    Sync { online: Vec<UserId> },
    /// A user came online.
    Join { user: UserId },
    /// A user went offline.
    Leave { user: UserId },
    /// Periodic liveness refresh; equivalent to a join.
    Heartbeat { user: UserId },
    /// A user started composing in a thread.
    TypingStarted { user: UserId, thread: ThreadId },
    /// A user stopped composing in a thread.
    TypingStopped { user: UserId, thread: ThreadId },
}

/// A call-signaling relay message between two specific users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalMessage {
    pub sender: UserId,
    pub target: UserId,
    pub payload: SignalPayload,
}

/// The opaque session-description / candidate payloads relayed during call
/// setup.  The core never inspects SDP contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalPayload {
    Offer { sdp: String, video: bool },
    Answer { sdp: String },
    IceCandidate { candidate: String },
    Hangup,
}
