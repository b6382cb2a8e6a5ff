//! Customer-creation saga.
//!
//! Keeps the web service's subscriptions consistent with the customers
//! service's records without a shared transaction:
//! 1. [`CustomerCreationSaga::subscribe`] inserts a Pending row and requests a customer
//! 2. [`CustomerCreationHandler`] creates the customer and answers
//! 3. [`CustomerCreationSaga::handle_response`] confirms the row, or deletes it on failure

pub mod coordinator;
pub mod customer;
pub mod error;
pub mod state;

pub use coordinator::CustomerCreationSaga;
pub use customer::CustomerCreationHandler;
pub use error::{Result, SagaError};
pub use state::Resolution;
