//! Centralized error types for IssueSheet.
//!
//! This module provides a typed error hierarchy that:
//! - Separates transport failures from tracker rejections
//! - Provides short operator-facing messages for the audit log and HTTP replies
//! - Preserves full error context for debugging/logging

use thiserror::Error;

/// Top-level error type.
///
/// Every failure inside a sync invocation is convertible to this type.
/// Use `user_message()` to get a short message suitable for the audit log.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Sheet error: {0}")]
    Sheet(#[from] SheetError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a short message suitable for display to whoever triggered the invocation.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Tracker(e) => e.user_message(),
            AppError::Sheet(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Webhook(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Failures talking to the remote issue tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Transport-level failure: DNS, connect, TLS, timeout, reset.
    #[error("Tracker unavailable: {0}")]
    RemoteUnavailable(String),

    /// The tracker answered with a non-success status.
    #[error("Tracker rejected request: {status} - {message}")]
    RemoteRejected { status: u16, message: String },

    /// Success status but the body could not be decoded.
    #[error("Invalid tracker response: {0}")]
    InvalidResponse(String),
}

impl TrackerError {
    pub fn user_message(&self) -> &'static str {
        match self {
            TrackerError::RemoteUnavailable(_) => {
                "Unable to reach GitHub. Check your internet connection."
            }
            TrackerError::RemoteRejected { status: 401, .. } => {
                "GitHub rejected the access token. Check ACCESS_TOKEN."
            }
            TrackerError::RemoteRejected { status: 404, .. } => {
                "Issue or repository not found on GitHub."
            }
            TrackerError::RemoteRejected { status, .. } if *status >= 500 => {
                "GitHub is experiencing issues. Please try again later."
            }
            TrackerError::RemoteRejected { .. } => "GitHub rejected the request.",
            TrackerError::InvalidResponse(_) => "Received an unexpected response from GitHub.",
        }
    }

    /// HTTP status of a rejection, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            TrackerError::RemoteRejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Sheet storage errors.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Invalid cell at row {row}, column {column}: {reason}")]
    InvalidCell {
        row: u32,
        column: u32,
        reason: String,
    },
}

impl SheetError {
    pub fn user_message(&self) -> &'static str {
        match self {
            SheetError::Storage(_) => "The spreadsheet could not be read or written.",
            SheetError::InvalidCell { .. } => "A cell in the edited row holds an unexpected value.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Missing column binding: {0}")]
    MissingColumn(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
            ConfigError::MissingColumn(_) => {
                "A required column is not mapped. Check the column configuration."
            }
        }
    }
}

/// Inbound webhook errors.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Missing signature header")]
    MissingSignature,

    #[error("Signature does not match payload")]
    InvalidSignature,
}

impl WebhookError {
    pub fn user_message(&self) -> &'static str {
        match self {
            WebhookError::MalformedPayload(_) => "The webhook payload could not be decoded.",
            WebhookError::MissingSignature => "The webhook delivery is not signed.",
            WebhookError::InvalidSignature => "The webhook signature is invalid.",
        }
    }
}

/// Extension trait for converting reqwest errors to tracker errors.
pub trait ReqwestErrorExt {
    fn into_tracker_error(self) -> TrackerError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_tracker_error(self) -> TrackerError {
        if let Some(status) = self.status() {
            TrackerError::RemoteRejected {
                status: status.as_u16(),
                message: self.to_string(),
            }
        } else if self.is_decode() {
            TrackerError::InvalidResponse(self.to_string())
        } else {
            TrackerError::RemoteUnavailable(self.to_string())
        }
    }
}

/// Extension trait for converting rusqlite errors to sheet errors.
pub trait RusqliteErrorExt {
    fn into_sheet_error(self) -> SheetError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_sheet_error(self) -> SheetError {
        SheetError::Storage(self.to_string())
    }
}

impl From<rusqlite::Error> for SheetError {
    fn from(err: rusqlite::Error) -> Self {
        err.into_sheet_error()
    }
}
