//! Web service: subscription API, saga coordinator and fan-out handler.

use std::process::ExitCode;
use std::sync::Arc;

use broker::{AmqpBroker, Consumer, MessageKind, Producer};
use common::queues;
use domain::{CachedRateService, PostgresSubscriptionRepository, RateService};
use saga::CustomerCreationSaga;
use server::config::WebConfig;
use server::error::StartupError;
use server::shutdown::Shutdown;
use server::fanout::FanOutCoordinator;
use server::{WebState, rate_fetcher, runtime, telemetry};

#[tokio::main]
async fn main() -> ExitCode {
    let config = WebConfig::from_env();
    telemetry::init_tracing(
        config
            .as_ref()
            .map(|c| c.server.log_format)
            .unwrap_or_default(),
    );

    let result = match config {
        Ok(config) => run(config).await,
        Err(e) => Err(e.into()),
    };
    runtime::exit_code("web", result)
}

async fn run(config: WebConfig) -> Result<(), StartupError> {
    let metrics_handle = telemetry::install_metrics()?;

    let db = runtime::connect_database(&config.database).await?;
    let subscriptions = Arc::new(PostgresSubscriptionRepository::new(db.clone()));
    subscriptions.run_migrations().await?;
    tracing::info!("migrations applied");

    let broker = Arc::new(AmqpBroker::connect(&config.server.amqp_url).await?);

    let rates: Arc<dyn RateService> = Arc::new(CachedRateService::new(
        rate_fetcher::default_fetchers(rate_fetcher::http_client()?),
        config.rate_cache_ttl,
    ));

    let saga = Arc::new(CustomerCreationSaga::new(
        Arc::clone(&subscriptions),
        Producer::new(Arc::clone(&broker)),
    ));
    let fanout = Arc::new(
        FanOutCoordinator::new(
            Arc::clone(&subscriptions),
            Arc::clone(&rates),
            Producer::new(Arc::clone(&broker)),
        )
        .with_batch_size(config.email_batch_size),
    );

    let consumers = vec![
        Consumer::new(Arc::clone(&broker), queues::CREATE_CUSTOMER_RESPONSE)
            .handler(MessageKind::CreateCustomerResponse, saga.clone())
            .start_listening()
            .await?,
        Consumer::new(Arc::clone(&broker), queues::TRIGGER_EMAILS_SENDING)
            .handler(MessageKind::StartEmailSending, fanout)
            .start_listening()
            .await?,
    ];

    let app = server::create_web_app(Arc::new(WebState { saga, rates }), metrics_handle);

    let shutdown = Shutdown::new();
    shutdown.listen_for_signals();
    let served = runtime::serve(&config.server.addr(), app, &shutdown).await;

    runtime::stop_consumers(broker.as_ref(), consumers, runtime::CONSUMER_STOP_GRACE).await;
    db.close().await;
    served.map_err(StartupError::from)
}
