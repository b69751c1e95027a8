use thiserror::Error;

use parley_store::StoreError;

/// Errors returned by the serverless API collaborator (OTP login and
/// connection-code exchange).
#[derive(Error, Debug)]
pub enum ApiError {
    /// The code is unknown, expired, or already used.
    #[error("Invalid or expired code")]
    InvalidCode,

    /// The backend rejected the request outright.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The request never completed.
    #[error("Request failed: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Connection or login code unknown, expired, spent, or timed out.
    #[error("Invalid or expired code")]
    InvalidOrExpiredCode,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("API request failed: {0}")]
    Api(String),

    #[error("State lock poisoned")]
    LockPoisoned,

    #[error("Could not determine application data directory")]
    NoDataDir,

    #[error("Session file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ApiError> for ClientError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::InvalidCode => ClientError::InvalidOrExpiredCode,
            ApiError::Rejected(msg) | ApiError::Transport(msg) => ClientError::Api(msg),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
