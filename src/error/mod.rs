//! Error types for the canopy runtime.

use thiserror::Error;

/// Primary error type for all runtime operations.
#[derive(Error, Debug)]
pub enum CanopyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Agent template not found: {0}")]
    TemplateNotFound(String),

    #[error("Agent depth limit exceeded (depth {depth}, max {max})")]
    DepthExceeded { depth: usize, max: usize },

    #[error("Step handler error: {0}")]
    Handler(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Run cancelled by user")]
    Cancelled,
}

impl CanopyError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Payment-required failures must be rethrown to the caller instead of
    /// being folded into the run's error output.
    pub fn is_payment_required(&self) -> bool {
        self.status_code() == Some(402)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CanopyError>;
