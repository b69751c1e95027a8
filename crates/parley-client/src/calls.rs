//! Wiring between the signaling subscription and a call coordinator.
//!
//! The coordinator lives behind an async mutex because signal handling and
//! user actions (accept, hang up) both need it; the pump holds the lock
//! only for the duration of one message.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use parley_call::{CallCoordinator, MediaEngine, SignalingTransport};
use parley_shared::protocol::SignalMessage;

/// Drain the signaling subscription into the coordinator until the channel
/// closes.  Handling errors end only the affected call attempt, never this
/// loop.
pub async fn drive_signals<E, T>(
    coordinator: Arc<Mutex<CallCoordinator<E, T>>>,
    mut rx: mpsc::Receiver<SignalMessage>,
) where
    E: MediaEngine,
    T: SignalingTransport,
{
    while let Some(message) = rx.recv().await {
        let mut guard = coordinator.lock().await;
        if let Err(e) = guard.on_signal(message).await {
            warn!(error = %e, "signal handling failed");
        }
    }
    debug!("signaling channel closed");
}
