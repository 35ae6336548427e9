//! Application error model
//!
//! Defines a typed error hierarchy using `thiserror`. Recoverable outcomes
//! (validation, timeouts, partial delivery) are variants rather than panics
//! so tool handlers can match on them and render text for the caller.

use thiserror::Error;

use crate::bridge::Operation;

/// Recipient refused by the submission server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecipient {
    /// Envelope address as given in the request
    pub address: String,
    /// Server reply text for the refused `RCPT TO`
    pub reason: String,
}

/// Application error type
///
/// Covers all failure cases of the bridge. Every variant is rendered to
/// user-facing text by the tool layer; none of them cross the invocation
/// boundary as a protocol fault.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid user input (validation failed before any network call)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Message or mailbox not found
    #[error("not found: {0}")]
    NotFound(String),
    /// Authentication failure against IMAP or SMTP
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    /// Operation exceeded its deadline; the outcome is unknown
    #[error("{0} timed out")]
    Timeout(Operation),
    /// Server answered with a protocol-level failure
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Message was accepted but some recipients were refused
    #[error("delivery refused for {} recipient(s)", rejected.len())]
    PartialDelivery {
        /// Refused recipients with the server's reason
        rejected: Vec<RejectedRecipient>,
    },
    /// Internal error (unexpected failure, external crate error)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether the error came from the caller's arguments
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

/// Type alias for fallible return values
pub type AppResult<T> = Result<T, AppError>;
