use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to listen on {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("Relay not started")]
    NotStarted,

    #[error("Relay already running")]
    AlreadyRunning,

    /// The client stopped reading and its socket buffer filled up
    #[error("Client did not accept data within {0:?}")]
    WriteTimeout(Duration),
}

pub type Result<T> = std::result::Result<T, RelayError>;
