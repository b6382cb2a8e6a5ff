//! Storage traits for subscriptions and customers.

use async_trait::async_trait;
use common::SubscriptionId;

use crate::customer::{CreateOutcome, Customer};
use crate::email::Email;
use crate::subscription::Subscription;
use crate::Result;

/// Store of subscriptions, owned by the web service.
///
/// Lookups take the trimmed address as stored; callers that hold a raw
/// address should parse it into an [`Email`] first.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Inserts a Pending subscription.
    ///
    /// Fails with [`DomainError::DuplicateEmail`](crate::DomainError::DuplicateEmail)
    /// if any row exists for the address, whatever its status.
    async fn create(&self, email: &Email) -> Result<SubscriptionId>;

    /// Returns the addresses of all Confirmed subscriptions, oldest first.
    async fn get_all(&self) -> Result<Vec<String>>;

    /// Returns the subscription for `email`, if any.
    async fn find_by_email(&self, email: &str) -> Result<Option<Subscription>>;

    /// Returns every subscription regardless of status, oldest first.
    async fn list(&self) -> Result<Vec<Subscription>>;

    /// Moves a Pending row to Confirmed. Returns false if there was no
    /// Pending row for `email`.
    async fn confirm(&self, email: &str) -> Result<bool>;

    /// Deletes the row for `email` only if it is still Pending. Returns
    /// false if nothing was deleted.
    async fn delete_pending_by_email(&self, email: &str) -> Result<bool>;

    /// Deletes the row for `email` whatever its status. Missing rows are not an error.
    async fn delete_by_email(&self, email: &str) -> Result<()>;

    /// Deletes the row with `id`. Missing rows are not an error.
    async fn delete_by_id(&self, id: SubscriptionId) -> Result<()>;
}

/// Store of customer records, owned by the customers service.
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// Creates a customer unless one already exists for the address.
    async fn create_if_absent(&self, email: &Email) -> Result<CreateOutcome>;

    /// Returns the customer for `email`, if any.
    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>>;
}
