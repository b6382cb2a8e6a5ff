//! Domain layer for the exchanger services.
//!
//! - [`Email`] value object shared by both stores as the correlation key
//! - [`Subscription`] rows owned by the web service, [`Customer`] rows owned
//!   by the customers service, each behind a repository trait with in-memory
//!   and PostgreSQL implementations
//! - [`RateService`] capability with a cached fetcher chain

pub mod customer;
pub mod email;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod rate;
pub mod repository;
pub mod subscription;

pub use customer::{CreateOutcome, Customer};
pub use email::Email;
pub use error::{DomainError, Result};
pub use memory::{InMemoryCustomerRepository, InMemorySubscriptionRepository};
pub use postgres::{PostgresCustomerRepository, PostgresSubscriptionRepository};
pub use rate::{
    CachedRateService, DEFAULT_RATE_CACHE_TTL, RateError, RateFetcher, RateService,
    StaticRateService,
};
pub use repository::{CustomerRepository, SubscriptionRepository};
pub use subscription::{Subscription, SubscriptionStatus};
