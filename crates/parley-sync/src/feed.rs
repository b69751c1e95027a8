//! The realtime collaborator contract.
//!
//! The backend owns fan-out and delivery; this crate consumes it as plain
//! mpsc receivers.  Subscriptions are long-lived background listeners:
//! dropping the receiver is the teardown, and a component that forgets to
//! drop keeps receiving events into stale state.
//!
//! No ordering is guaranteed between distinct channels, and delivery within
//! one is at-least-once; consumers rely on identifier dedup, never on
//! arrival order.

use async_trait::async_trait;
use tokio::sync::mpsc;

use parley_shared::protocol::{PresenceEvent, RawChange, SignalMessage};
use parley_shared::types::UserId;

use crate::error::SyncError;

#[async_trait]
pub trait RealtimeFeed: Send + Sync {
    /// Row changes (thread and message tables) relevant to `user`.
    async fn subscribe_changes(
        &self,
        user: UserId,
    ) -> Result<mpsc::Receiver<RawChange>, SyncError>;

    /// The process-wide presence broadcast channel.
    async fn subscribe_presence(&self) -> Result<mpsc::Receiver<PresenceEvent>, SyncError>;

    /// Call-signaling payloads addressed to `user`.
    async fn subscribe_signals(
        &self,
        user: UserId,
    ) -> Result<mpsc::Receiver<SignalMessage>, SyncError>;
}
