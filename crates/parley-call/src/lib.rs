//! # parley-call
//!
//! Call setup over a signaling side-channel.  The exchange of offer,
//! answer, and ICE candidates is sequenced by a pure state machine
//! ([`CallSession`]); the [`CallCoordinator`] drives it against the media,
//! peer-connection, and transport collaborators.  Media payloads stay
//! opaque: this crate relays session descriptions, it never parses them.

pub mod coordinator;
pub mod media;
pub mod signaling;

mod error;

pub use coordinator::{CallCoordinator, CallEvent};
pub use error::CallError;
pub use media::{MediaEngine, MediaStream, PeerConnection, SignalingTransport};
pub use signaling::{CallSession, CallState, IncomingCall};
