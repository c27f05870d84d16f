//! Error types for the AmoCRM integration core

use thiserror::Error;

/// Main error type for all integration operations
#[derive(Error, Debug)]
pub enum AmoError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Settings store error: {0}")]
    Store(String),
}

/// Result type for integration operations
pub type Result<T> = std::result::Result<T, AmoError>;
