//! Error types for fileport
//!
//! Provides a unified error type for all operations.
//!
//! Every variant except `Protocol` is recovered by the dispatcher and sent
//! back to the client as an `ERROR` response. `Protocol` (and transport I/O
//! failures while a frame is being assembled) end the session silently.

use thiserror::Error;

/// Result type alias using FileportError
pub type Result<T> = std::result::Result<T, FileportError>;

/// Unified error type for fileport operations
#[derive(Debug, Error)]
pub enum FileportError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Command Errors
    // -------------------------------------------------------------------------
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Unknown command: {0}")]
    UnknownVerb(String),

    #[error("Invalid base64 data: {0}")]
    Decode(String),

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Invalid filename: {0}")]
    InvalidName(String),

    #[error("File {0} not found")]
    NotFound(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An `ERROR` response, as seen by the client
    #[error("Server error: {0}")]
    Remote(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Worker Pool Errors
    // -------------------------------------------------------------------------
    #[error("Worker pool error: {0}")]
    Worker(String),
}

impl FileportError {
    /// True for errors that mean the peer went away mid-conversation
    pub fn is_disconnect(&self) -> bool {
        match self {
            FileportError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }

    /// True for read/write timeouts (`WouldBlock` on unix, `TimedOut` on Windows)
    pub fn is_timeout(&self) -> bool {
        match self {
            FileportError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

impl From<Box<bincode::ErrorKind>> for FileportError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        FileportError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for FileportError {
    fn from(e: serde_json::Error) -> Self {
        FileportError::Serialization(e.to_string())
    }
}
