//! Error types for the driver runtime.

use thiserror::Error;
use verdict_protocol::ErrorCode;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur talking to the driver subprocess.
#[derive(Debug, Error)]
pub enum Error {
    /// No driver command was configured or the program could not be found.
    #[error("driver not found: {0}. Pass --driver-cmd or set VERDICT_DRIVER")]
    DriverNotFound(String),

    /// Failed to launch the driver process.
    #[error("failed to launch driver: {0}")]
    LaunchFailed(String),

    /// The driver did not answer the initial ping.
    #[error("driver handshake failed: {0}")]
    HandshakeFailed(String),

    /// The driver reported a command failure.
    #[error("driver error [{code}]: {message}")]
    Driver { code: ErrorCode, message: String },

    /// No response arrived within the call deadline.
    #[error("no response to '{command}' within {deadline_ms}ms")]
    CallTimeout { command: String, deadline_ms: u64 },

    /// The stdio channel to the driver closed unexpectedly.
    #[error("driver connection closed unexpectedly")]
    ConnectionClosed,

    /// The driver sent something this protocol version cannot understand.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error on the driver pipes.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON on the wire.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the driver-reported error code, if any.
    pub fn driver_code(&self) -> Option<ErrorCode> {
        match self {
            Error::Driver { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this is a call-deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::CallTimeout { .. })
    }
}
