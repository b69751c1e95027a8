use thiserror::Error;

use crate::signaling::CallState;

#[derive(Error, Debug)]
pub enum CallError {
    /// Media permission denied or no capture device.  Aborts the attempt
    /// and returns the session to idle.
    #[error("Media unavailable: {0}")]
    MediaUnavailable(String),

    /// Signaling send failed or timed out.  Fatal to the call attempt.
    #[error("Signaling failure: {0}")]
    SignalingFailure(String),

    /// An operation ran in a state it is not valid in.
    #[error("Invalid call state: expected {expected}, got {actual:?}")]
    InvalidState {
        expected: &'static str,
        actual: CallState,
    },

    /// The platform peer connection rejected an operation.
    #[error("Peer connection error: {0}")]
    Peer(String),
}
