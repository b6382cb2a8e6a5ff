//! Current exchange rate.

use std::sync::Arc;

use axum::extract::State;
use broker::Broker;
use domain::SubscriptionRepository;

use super::WebState;
use crate::error::ApiError;

/// GET /rate: USD to UAH rate as plain text with six decimals.
#[tracing::instrument(skip(state))]
pub async fn get<R, B>(State(state): State<Arc<WebState<R, B>>>) -> Result<String, ApiError>
where
    R: SubscriptionRepository + 'static,
    B: Broker + ?Sized + 'static,
{
    let rate = state.rates.get_rate().await?;
    Ok(format!("{rate:.6}"))
}
