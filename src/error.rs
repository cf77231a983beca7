//! Error types for the constellation capture pipeline

use thiserror::Error;

/// Error type for device link and capture operations
#[derive(Error, Debug)]
pub enum ConstellationError {
    /// Serial port could not be opened
    #[error("Failed to open serial port {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// Read or write on an open link failed
    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// `start()` called while the acquisition thread is already running
    #[error("Capture is already running")]
    AlreadyRunning,

    /// The acquisition thread has not handed the link back yet
    #[error("Device link is still held by the acquisition thread")]
    LinkUnavailable,

    /// The acquisition thread panicked and took the link with it
    #[error("Acquisition thread terminated abnormally")]
    CaptureThreadPanicked,
}

/// Result type for constellation operations
pub type Result<T> = std::result::Result<T, ConstellationError>;
