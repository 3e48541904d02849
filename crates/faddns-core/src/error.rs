//! Error types for the reconciliation engine
//!
//! The variants follow the failure classes a reconciliation cycle can hit:
//! transient file I/O, zone validation, external tool failures and
//! malformed data inside the zone or serial file.

use thiserror::Error;

/// Result type alias for faddns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the reconciliation engine
#[derive(Error, Debug)]
pub enum Error {
    /// File copy/rename/read/write failures. The cycle is aborted and
    /// retried on the next tick; live files are untouched.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The zone checker rejected the patched zone
    #[error("Zone validation failed: {0}")]
    Validation(String),

    /// An external tool (signer, reload command) exited unsuccessfully
    #[error("External tool {tool} failed: {message}")]
    Tool {
        /// Tool name
        tool: String,
        /// Captured failure output
        message: String,
    },

    /// An external tool did not finish in time
    #[error("External tool {tool} timed out after {secs}s")]
    Timeout {
        /// Tool name
        tool: String,
        /// Configured timeout
        secs: u64,
    },

    /// Unexpected content in the zone or serial file
    #[error("Data format error: {0}")]
    DataFormat(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an external tool error
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(tool: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            tool: tool.into(),
            secs,
        }
    }

    /// Create a data format error
    pub fn data_format(msg: impl Into<String>) -> Self {
        Self::DataFormat(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the failure was reported by an external tool (non-zero exit
    /// or timeout)
    pub fn is_external(&self) -> bool {
        matches!(self, Self::Tool { .. } | Self::Timeout { .. })
    }
}
