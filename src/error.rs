// src/error.rs

//! Unified error handling for the grade notifier.

use std::fmt;

use thiserror::Error;

/// Result type alias for notifier operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Regular expression failed to compile
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The portal did not confirm the login
    #[error("Login not confirmed (status {status}, url {url})")]
    Login { status: u16, url: String },

    /// The portal answered a page request with a non-success status
    #[error("Portal returned status {status} for {url}")]
    Portal { status: u16, url: String },

    /// The messaging API rejected a message
    #[error("Notification rejected (status {status}): {body}")]
    Notify { status: u16, body: String },

    /// Fresh report looked degraded compared to the stored snapshot
    #[error(
        "Snapshot guard: {previous_count} → {current_count} subjects ({drop_percent:.1}% drop > {threshold_percent}%)"
    )]
    SnapshotGuard {
        current_count: usize,
        previous_count: usize,
        drop_percent: f64,
        threshold_percent: u8,
    },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a notification delivery error.
    pub fn notify(status: u16, body: impl Into<String>) -> Self {
        Self::Notify {
            status,
            body: body.into(),
        }
    }
}
