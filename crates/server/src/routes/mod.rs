//! HTTP handlers.

pub mod health;
pub mod metrics;
pub mod rate;
pub mod subscribe;

use std::sync::Arc;

use broker::Broker;
use domain::{RateService, SubscriptionRepository};
use saga::CustomerCreationSaga;

/// Shared state of the web service handlers.
pub struct WebState<R, B>
where
    R: SubscriptionRepository,
    B: Broker + ?Sized,
{
    pub saga: Arc<CustomerCreationSaga<R, B>>,
    pub rates: Arc<dyn RateService>,
}
