use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelinkError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Frame too large: {len} bytes (max {max} bytes)")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Could not connect: all {attempts} endpoint(s) failed")]
    AllEndpointsFailed { attempts: usize },

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<std::net::AddrParseError> for RelinkError {
    fn from(err: std::net::AddrParseError) -> Self {
        RelinkError::InvalidEndpoint(err.to_string())
    }
}

impl RelinkError {
    /// Maps an IO error observed while `context` was in progress.
    ///
    /// - Timeouts/would block -> `Timeout` when a timeout was configured,
    ///   otherwise `Connection` with the OS message
    /// - Resets, aborts and broken pipes -> `Connection`
    /// - Clean EOF -> `ConnectionClosed`
    /// - Anything else -> `Io`
    pub fn from_io(err: std::io::Error, context: &str, timeout: Option<Duration>) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => match timeout {
                Some(timeout) => RelinkError::Timeout(timeout.as_millis() as u64),
                None => RelinkError::Connection(format!("{}: {}", context, err)),
            },
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected => {
                RelinkError::Connection(format!("{}: Connection lost", context))
            }
            ErrorKind::UnexpectedEof => RelinkError::ConnectionClosed,
            _ => RelinkError::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelinkError>;
