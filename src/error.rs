//! Error types for nodewatch.

use thiserror::Error;

use crate::link::HexError;
use crate::nodes::RegistryError;

/// Main error type returned by library operations.
#[derive(Debug, Error)]
pub enum NodewatchError {
    /// Node registry rejected an observation.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A sweep or counter interval that is zero or negative.
    #[error("invalid interval {0} ms (must be > 0)")]
    InvalidInterval(i64),

    /// User-supplied hex send data could not be parsed.
    #[error("hex error: {0}")]
    Hex(#[from] HexError),

    /// I/O error while talking to the port.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port could not be opened or configured.
    #[error("serial error: {0}")]
    Serial(String),

    /// The monitor task has shut down.
    #[error("monitor stopped")]
    MonitorStopped,
}

/// Result type alias using NodewatchError.
pub type Result<T> = std::result::Result<T, NodewatchError>;
