// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for the CellCog SDK
//!
//! This module defines all error types used throughout the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for CellCog operations
#[derive(Error, Debug)]
pub enum CellCogError {
    /// API-related errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// SDK is not configured or configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Seen-index storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Local file referenced in an upload marker does not exist
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// File upload failed
    #[error("Upload failed: {0}")]
    Upload(String),

    /// File download failed
    #[error("Download failed: {0}")]
    Download(String),

    /// Wait operation was cancelled by the caller
    #[error("Wait cancelled")]
    Cancelled,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// API-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Authentication failed (invalid or revoked API key)
    #[error("Authentication failed: invalid or revoked API key")]
    AuthenticationFailed,

    /// Account needs credits to proceed
    #[error("Payment required: add credits at {billing_url}")]
    PaymentRequired {
        billing_url: String,
        min_credits_required: Option<u64>,
        current_balance: Option<u64>,
    },

    /// Account is disabled (unverified email, security flag, ...)
    #[error("Account disabled ({reason}): see {action_url}")]
    AccountDisabled { reason: String, action_url: String },

    /// Chat ID not found or caller has no access
    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    /// The service requires a newer SDK version
    #[error("SDK upgrade required: v{current} -> v{minimum} or later")]
    UpgradeRequired { current: String, minimum: String },

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from the API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// API returned an error status
    #[error("API error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Timeout waiting for a response
    #[error("Request timed out")]
    Timeout,
}

impl ApiError {
    /// Fatal errors require user intervention and must abort a wait
    /// immediately; anything else is transient from the poll loop's
    /// point of view.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ApiError::AuthenticationFailed
                | ApiError::PaymentRequired { .. }
                | ApiError::AccountDisabled { .. }
                | ApiError::ChatNotFound(_)
                | ApiError::UpgradeRequired { .. }
        )
    }
}

/// Seen-index storage error types
#[derive(Error, Debug)]
pub enum StorageError {
    /// A seen-index record exists but cannot be parsed. Never defaulted
    /// to "nothing seen", which would re-deliver the whole chat.
    #[error("Corrupt seen-index record at {path}: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    /// Underlying filesystem failure
    #[error("Storage IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for CellCog operations
pub type Result<T> = std::result::Result<T, CellCogError>;
