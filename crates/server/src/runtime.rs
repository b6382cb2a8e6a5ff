//! Startup and teardown steps shared by the service binaries.

use std::process::ExitCode;
use std::time::Duration;

use axum::Router;
use broker::{Broker, ConsumerHandle};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::DatabaseConfig;
use crate::error::StartupError;
use crate::shutdown::Shutdown;

/// Opens the PostgreSQL connection pool.
#[tracing::instrument(skip_all, fields(max_connections = config.max_connections))]
pub async fn connect_database(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;
    tracing::info!("connected to database");
    Ok(pool)
}

/// Serves `app` on `addr` until `shutdown` is triggered.
pub async fn serve(addr: &str, app: Router, shutdown: &Shutdown) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "http server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.wait())
        .await
}

/// How long a consumer may take to finish its in-flight message on shutdown.
pub const CONSUMER_STOP_GRACE: Duration = Duration::from_secs(10);

/// Closes the broker connection and waits for the consumer loops to drain.
/// Loops still running after `grace` are aborted.
pub async fn stop_consumers<B: Broker + ?Sized>(
    broker: &B,
    consumers: Vec<ConsumerHandle>,
    grace: Duration,
) {
    if let Err(e) = broker.close().await {
        tracing::error!(error = %e, "cannot close message broker connection");
    }
    for consumer in consumers {
        consumer.join_or_abort(grace).await;
    }
}

/// Logs a fatal startup error and maps the result to a process exit code.
pub fn exit_code(service: &str, result: Result<(), StartupError>) -> ExitCode {
    match result {
        Ok(()) => {
            tracing::info!(service, "shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(service, error = %e, "service failed");
            ExitCode::FAILURE
        }
    }
}
