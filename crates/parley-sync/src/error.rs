use thiserror::Error;

use parley_shared::ProtocolError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Subscription failed: {0}")]
    Subscribe(String),
}
