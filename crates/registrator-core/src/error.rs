//! Error types for registrator-core

use thiserror::Error;

/// Result type alias for registrator operations
pub type Result<T> = std::result::Result<T, RegistratorError>;

/// Main error type for registrator operations
#[derive(Error, Debug)]
pub enum RegistratorError {
    /// Configuration failed pre-flight validation
    #[error("{message}")]
    ConfigValidation { message: String },

    /// No K/V backend registered under the requested name
    #[error("Invalid K/V backend '{name}'. Must be one of: {}", .available.join(", "))]
    BackendNotFound { name: String, available: Vec<String> },

    /// Key does not exist in the K/V store
    #[error("Key not found: {key}")]
    KeyNotFound { key: String },

    /// A recursive read found a directory below the first layer
    #[error("Unsupported nested key: {key}")]
    UnsupportedNestedKey { key: String },

    /// Benign read condition on the event stream, the reader may continue
    #[error("Transient I/O error: {message}")]
    TransientIo { message: String },

    /// The switch sent something we did not expect
    #[error("Protocol violation: {message}")]
    ProtocolViolation { message: String },

    /// K/V backend request failed
    #[error("K/V backend error: {message}")]
    BackendIo { message: String },

    /// Stored value could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Operation exceeded its time bound
    #[error("Operation '{operation}' timed out after {seconds} seconds")]
    Timeout { operation: String, seconds: u64 },

    /// The event source closed the connection
    #[error("Connection closed by {peer}")]
    ConnectionClosed { peer: String },

    /// A supervised loop panicked or was aborted
    #[error("Task '{task}' failed: {message}")]
    TaskFailed { task: String, message: String },

    /// Socket level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistratorError {
    /// Create a configuration validation error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create a protocol violation error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
        }
    }

    /// Create a backend I/O error
    pub fn backend_io(message: impl Into<String>) -> Self {
        Self::BackendIo {
            message: message.into(),
        }
    }

    /// Create a transient I/O error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientIo {
            message: message.into(),
        }
    }

    /// Create a key-not-found error
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    /// "Nothing registered yet" is a normal state for most callers.
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientIo { .. })
    }
}

impl From<reqwest::Error> for RegistratorError {
    fn from(err: reqwest::Error) -> Self {
        RegistratorError::BackendIo {
            message: err.to_string(),
        }
    }
}

impl From<quick_xml::DeError> for RegistratorError {
    fn from(err: quick_xml::DeError) -> Self {
        RegistratorError::ProtocolViolation {
            message: format!("malformed sofia status XML: {}", err),
        }
    }
}
