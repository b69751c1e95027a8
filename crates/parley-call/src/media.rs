//! Collaborator contracts for media capture, the platform peer connection,
//! and the signaling relay.  Implementations are platform glue and live
//! outside this crate.

use async_trait::async_trait;

use parley_shared::protocol::SignalMessage;

use crate::error::CallError;

/// A captured local or received remote media stream.
pub trait MediaStream: Send + Sync {
    fn has_video(&self) -> bool;

    /// Stop every track.  Must be idempotent.
    fn stop(&mut self);
}

/// The platform peer connection being negotiated.
///
/// Callers are responsible for ordering: the remote description must be set
/// before local tracks are attached when answering, and candidates may only
/// be added once a remote description exists.
#[async_trait]
pub trait PeerConnection: Send {
    async fn create_offer(&mut self) -> Result<String, CallError>;

    async fn create_answer(&mut self) -> Result<String, CallError>;

    async fn set_local_description(&mut self, sdp: &str) -> Result<(), CallError>;

    async fn set_remote_description(&mut self, sdp: &str) -> Result<(), CallError>;

    async fn add_ice_candidate(&mut self, candidate: &str) -> Result<(), CallError>;

    async fn attach_tracks(&mut self, stream: &dyn MediaStream) -> Result<(), CallError>;

    /// Tear the connection down.  Must be idempotent.
    fn close(&mut self);
}

/// Access to media capture and peer-connection construction.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Acquire microphone (and camera when `video`) access.
    ///
    /// Fails with [`CallError::MediaUnavailable`] when permission is denied
    /// or no device exists.
    async fn acquire(&self, video: bool) -> Result<Box<dyn MediaStream>, CallError>;

    async fn create_peer(&self) -> Result<Box<dyn PeerConnection>, CallError>;
}

/// The bidirectional low-latency relay between two specific users.  Only
/// ever carries opaque offer/answer/candidate payloads.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    async fn send(&self, message: SignalMessage) -> Result<(), CallError>;
}
