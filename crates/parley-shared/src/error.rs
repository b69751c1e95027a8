use thiserror::Error;

/// Errors raised while validating server-pushed payloads.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unknown change table: {0}")]
    UnknownTable(String),

    #[error("Unsupported change action: {0}")]
    UnsupportedAction(String),

    #[error("Malformed {table} row: {source}")]
    MalformedRow {
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
