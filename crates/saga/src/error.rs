//! Saga error types.

use broker::{BrokerError, MessageKind};
use domain::DomainError;
use thiserror::Error;

/// Errors that can occur while driving the customer-creation saga.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Validation or store error from the domain layer.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// A message could not be published.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Undoing an optimistic write failed; the store may hold an orphan row.
    #[error("Compensation for {email} failed: {reason}")]
    CompensationFailed { email: String, reason: String },

    /// A handler was given a message kind it does not process.
    #[error("Unexpected message kind: {0}")]
    UnexpectedMessage(MessageKind),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
