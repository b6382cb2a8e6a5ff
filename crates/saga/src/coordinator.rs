//! Web-side half of the customer-creation saga.

use std::sync::Arc;

use async_trait::async_trait;
use broker::{
    Broker, CreateCustomerRequest, CreateCustomerResponse, HandlerError, Message, MessageHandler,
    Producer,
};
use common::{SubscriptionId, queues};
use domain::{Email, SubscriptionRepository};

use crate::error::{Result, SagaError};
use crate::state::Resolution;

/// Drives a subscription from Pending to Confirmed, or removes it.
///
/// Correlation with the customers service is by trimmed email address.
/// The store allows one row per address, so at most one request per
/// address is outstanding at a time.
pub struct CustomerCreationSaga<R, B>
where
    R: SubscriptionRepository,
    B: Broker + ?Sized,
{
    subscriptions: Arc<R>,
    producer: Producer<B>,
}

impl<R, B> CustomerCreationSaga<R, B>
where
    R: SubscriptionRepository,
    B: Broker + ?Sized,
{
    /// Creates a new saga coordinator.
    pub fn new(subscriptions: Arc<R>, producer: Producer<B>) -> Self {
        Self {
            subscriptions,
            producer,
        }
    }

    /// Starts the saga for `raw_email`.
    ///
    /// Validates the address, inserts a Pending row and publishes the
    /// customer-creation request. Returns once the request is accepted by
    /// the broker; the outcome arrives later through [`handle_response`].
    ///
    /// If the request cannot be published the row is deleted again, so a
    /// Pending row always has a request in flight.
    ///
    /// [`handle_response`]: Self::handle_response
    #[tracing::instrument(skip(self))]
    pub async fn subscribe(&self, raw_email: &str) -> Result<SubscriptionId> {
        let email = Email::parse(raw_email)?;
        let id = self.subscriptions.create(&email).await?;

        let request = CreateCustomerRequest {
            email: email.to_string(),
        };
        if let Err(e) = self
            .producer
            .send(request, queues::CREATE_CUSTOMER_REQUEST)
            .await
        {
            tracing::error!(
                %email,
                %id,
                error = %e,
                "customer request not published, removing subscription"
            );
            if let Err(undo) = self.subscriptions.delete_by_id(id).await {
                return Err(SagaError::CompensationFailed {
                    email: email.into_inner(),
                    reason: undo.to_string(),
                });
            }
            return Err(e.into());
        }

        metrics::counter!("saga_started_total").increment(1);
        tracing::info!(%email, %id, "subscription pending customer creation");
        Ok(id)
    }

    /// Applies a customer-creation response to the matching subscription.
    ///
    /// Idempotent: only a Pending row is ever touched, so redelivered,
    /// duplicate or stale responses resolve to [`Resolution::Ignored`].
    #[tracing::instrument(skip(self, response), fields(email = %response.email, success = response.success))]
    pub async fn handle_response(&self, response: &CreateCustomerResponse) -> Result<Resolution> {
        let email = response.email.trim();

        let resolution = if response.success {
            if self.subscriptions.confirm(email).await? {
                Resolution::Confirmed
            } else {
                Resolution::Ignored
            }
        } else if self.subscriptions.delete_pending_by_email(email).await? {
            tracing::warn!(
                reason = response.reason.as_deref().unwrap_or("unspecified"),
                "customer creation failed, subscription removed"
            );
            Resolution::Compensated
        } else {
            Resolution::Ignored
        };

        match resolution {
            Resolution::Confirmed => {
                metrics::counter!("saga_confirmed_total").increment(1);
                tracing::info!("subscription confirmed");
            }
            Resolution::Compensated => {
                metrics::counter!("saga_compensated_total").increment(1);
            }
            Resolution::Ignored => {
                metrics::counter!("saga_ignored_total").increment(1);
                tracing::debug!("no pending subscription, response ignored");
            }
        }
        Ok(resolution)
    }
}

#[async_trait]
impl<R, B> MessageHandler for CustomerCreationSaga<R, B>
where
    R: SubscriptionRepository + 'static,
    B: Broker + ?Sized + 'static,
{
    async fn handle(&self, message: Message) -> std::result::Result<(), HandlerError> {
        match message {
            Message::CreateCustomerResponse(response) => {
                self.handle_response(&response).await?;
                Ok(())
            }
            other => Err(SagaError::UnexpectedMessage(other.kind()).into()),
        }
    }
}
