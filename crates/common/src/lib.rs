//! Shared types for the exchanger services.
//!
//! Identifiers used across service boundaries and the names of the
//! broker queues the three services coordinate through.

pub mod queues;
pub mod types;

pub use types::{CustomerId, SubscriptionId};
