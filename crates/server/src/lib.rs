//! HTTP surface and process wiring for the exchanger services.
//!
//! The `web` binary serves `GET /rate` and `POST /subscribe`; all three
//! binaries serve `GET /health` and `GET /metrics`.

pub mod config;
pub mod error;
pub mod fanout;
pub mod rate_fetcher;
pub mod routes;
pub mod runtime;
pub mod shutdown;
pub mod telemetry;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use broker::Broker;
use domain::SubscriptionRepository;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use routes::WebState;

/// Creates the web service router.
pub fn create_web_app<R, B>(state: Arc<WebState<R, B>>, metrics_handle: PrometheusHandle) -> Router
where
    R: SubscriptionRepository + 'static,
    B: Broker + ?Sized + 'static,
{
    Router::new()
        .route("/rate", get(routes::rate::get::<R, B>))
        .route("/subscribe", post(routes::subscribe::create::<R, B>))
        .with_state(state)
        .merge(ops_routes("web", metrics_handle))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the router for services that expose only health and metrics.
pub fn create_ops_app(service: &'static str, metrics_handle: PrometheusHandle) -> Router {
    ops_routes(service, metrics_handle).layer(TraceLayer::new_for_http())
}

fn ops_routes(service: &'static str, metrics_handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/health", get(move || routes::health::check(service)))
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle)
}
