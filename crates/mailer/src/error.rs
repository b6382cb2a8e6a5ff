//! Mailer error types.

use thiserror::Error;

/// Errors that can occur while rendering, queueing or delivering mail.
#[derive(Debug, Error)]
pub enum MailError {
    /// A notification template failed to render.
    #[error("template error: {0}")]
    Template(#[from] askama::Error),

    /// A sender or recipient address could not be parsed.
    #[error("invalid address {0:?}")]
    Address(String),

    /// The message could not be assembled.
    #[error("failed to build message: {0}")]
    Build(String),

    /// The SMTP relay refused or failed the delivery.
    #[error("SMTP error: {0}")]
    Smtp(String),

    /// The worker pool has been shut down.
    #[error("worker pool is shut down")]
    PoolClosed,
}

/// Result type alias for mailer operations.
pub type Result<T> = std::result::Result<T, MailError>;
