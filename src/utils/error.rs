//! The `error` module defines the error type shared by every broker operation.
//!
//! Errors carry an integer code mirroring the HTTP status that the transport
//! layer will eventually answer with, a human readable message, and an
//! optional structured details map.

use serde_json::Value;

/// Operation error with an HTTP-mirroring status code.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    pub code: u16,
    pub message: String,
    pub details: Option<Value>,
}

impl Error {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attaches a structured details map to the error.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}
