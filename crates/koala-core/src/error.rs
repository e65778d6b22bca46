//! Error types for Koala Core

use std::time::Duration;

use thiserror::Error;

/// Result type alias using Koala Error
pub type Result<T> = std::result::Result<T, Error>;

/// Koala error types
#[derive(Error, Debug)]
pub enum Error {
    /// Listing tools or fetching a prompt from a tool provider failed
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Confirmation rejected for {kind}: {reason}")]
    ConfirmationRejected { kind: &'static str, reason: String },

    #[error("Confirmation for {kind} timed out after {timeout:?}")]
    ConfirmationTimeout { kind: &'static str, timeout: Duration },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Tool-specific errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Tool call limit of {0} reached")]
    LimitExceeded(usize),
}
