//! Subscription endpoint.

use std::sync::Arc;

use axum::Form;
use axum::extract::State;
use axum::extract::rejection::FormRejection;
use axum::http::StatusCode;
use broker::Broker;
use domain::SubscriptionRepository;
use serde::Deserialize;

use super::WebState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct SubscribeForm {
    #[serde(default)]
    pub email: String,
}

/// POST /subscribe: accepts `email` as a form field.
///
/// Answers as soon as the Pending row exists and the customer-creation
/// request is published. Confirmation happens asynchronously.
#[tracing::instrument(skip(state, form))]
pub async fn create<R, B>(
    State(state): State<Arc<WebState<R, B>>>,
    form: Result<Form<SubscribeForm>, FormRejection>,
) -> Result<StatusCode, ApiError>
where
    R: SubscriptionRepository + 'static,
    B: Broker + ?Sized + 'static,
{
    let Form(form) = form.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let id = state.saga.subscribe(&form.email).await?;
    tracing::info!(subscription_id = %id, "subscription accepted");
    Ok(StatusCode::OK)
}
