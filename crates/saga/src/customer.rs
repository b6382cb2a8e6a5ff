//! Customers-service half of the customer-creation saga.

use std::sync::Arc;

use async_trait::async_trait;
use broker::{
    Broker, CreateCustomerRequest, CreateCustomerResponse, HandlerError, Message, MessageHandler,
    Producer,
};
use common::queues;
use domain::{CreateOutcome, CustomerRepository, Email};

use crate::error::{Result, SagaError};

/// Creates customer records on request and reports the outcome.
///
/// Creation is idempotent, so a redelivered request produces another
/// success response rather than an error.
pub struct CustomerCreationHandler<C, B>
where
    C: CustomerRepository,
    B: Broker + ?Sized,
{
    customers: Arc<C>,
    producer: Producer<B>,
}

impl<C, B> CustomerCreationHandler<C, B>
where
    C: CustomerRepository,
    B: Broker + ?Sized,
{
    pub fn new(customers: Arc<C>, producer: Producer<B>) -> Self {
        Self {
            customers,
            producer,
        }
    }

    /// Creates the customer for `request` and publishes the response.
    ///
    /// Store failures are reported to the web service as `success = false`.
    /// Only a failure to publish the response is returned as an error, so
    /// the request is redelivered and retried.
    #[tracing::instrument(skip(self, request), fields(email = %request.email))]
    pub async fn handle_request(
        &self,
        request: &CreateCustomerRequest,
    ) -> Result<CreateCustomerResponse> {
        let response = self.create(request).await;
        self.producer
            .send(response.clone(), queues::CREATE_CUSTOMER_RESPONSE)
            .await?;
        Ok(response)
    }

    async fn create(&self, request: &CreateCustomerRequest) -> CreateCustomerResponse {
        let email = match Email::parse(&request.email) {
            Ok(email) => email,
            Err(e) => {
                tracing::warn!(error = %e, "rejecting customer request");
                metrics::counter!("customer_requests_total", "outcome" => "invalid").increment(1);
                return CreateCustomerResponse::failed(request.email.trim(), e.to_string());
            }
        };

        match self.customers.create_if_absent(&email).await {
            Ok(CreateOutcome::Created(id)) => {
                metrics::counter!("customer_requests_total", "outcome" => "created").increment(1);
                tracing::info!(%id, "customer created");
                CreateCustomerResponse::succeeded(email.into_inner())
            }
            Ok(CreateOutcome::AlreadyExists) => {
                metrics::counter!("customer_requests_total", "outcome" => "existing").increment(1);
                tracing::debug!("customer already exists");
                CreateCustomerResponse::succeeded(email.into_inner())
            }
            Err(e) => {
                metrics::counter!("customer_requests_total", "outcome" => "failed").increment(1);
                tracing::error!(error = %e, "customer creation failed");
                CreateCustomerResponse::failed(email.into_inner(), e.to_string())
            }
        }
    }
}

#[async_trait]
impl<C, B> MessageHandler for CustomerCreationHandler<C, B>
where
    C: CustomerRepository + 'static,
    B: Broker + ?Sized + 'static,
{
    async fn handle(&self, message: Message) -> std::result::Result<(), HandlerError> {
        match message {
            Message::CreateCustomerRequest(request) => {
                self.handle_request(&request).await?;
                Ok(())
            }
            other => Err(SagaError::UnexpectedMessage(other.kind()).into()),
        }
    }
}
