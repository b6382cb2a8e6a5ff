//! Domain error types.

use thiserror::Error;

/// Errors that can occur in subscription and customer operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The address is not a syntactically valid email.
    #[error("invalid email address: {0:?}")]
    InvalidEmail(String),

    /// A subscription for this address already exists.
    #[error("email already subscribed: {0}")]
    DuplicateEmail(String),

    /// The backing store rejected or could not perform the operation.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed at startup.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The store is unavailable (used by the in-memory stores to simulate outages).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be interpreted.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Result type alias for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
