//! # parley-shared
//!
//! Identifiers, domain records, and the realtime/signaling protocol types
//! shared by every Parley crate.  Nothing in here performs I/O: the backend
//! delivers JSON rows and presence/signaling payloads, and this crate is the
//! typed boundary they must pass through before entering application state.

pub mod constants;
pub mod models;
pub mod protocol;
pub mod types;

mod error;

pub use error::ProtocolError;
pub use models::{Attachment, AttachmentKind, CodePolicy, ConnectionCode, Message, Profile, Thread};
pub use types::{MessageId, ThreadId, UserId};
