//! Customers service: owns customer records and answers creation requests.

use std::process::ExitCode;
use std::sync::Arc;

use broker::{AmqpBroker, Consumer, MessageKind, Producer};
use common::queues;
use domain::PostgresCustomerRepository;
use saga::CustomerCreationHandler;
use server::config::CustomersConfig;
use server::error::StartupError;
use server::shutdown::Shutdown;
use server::{runtime, telemetry};

#[tokio::main]
async fn main() -> ExitCode {
    let config = CustomersConfig::from_env();
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
    runtime::exit_code("customers", result)
}

async fn run(config: CustomersConfig) -> Result<(), StartupError> {
    let metrics_handle = telemetry::install_metrics()?;

    let db = runtime::connect_database(&config.database).await?;
    let customers = Arc::new(PostgresCustomerRepository::new(db.clone()));
    customers.run_migrations().await?;
    tracing::info!("migrations applied");

    let broker = Arc::new(AmqpBroker::connect(&config.server.amqp_url).await?);

    let handler = Arc::new(CustomerCreationHandler::new(
        customers,
        Producer::new(Arc::clone(&broker)),
    ));
    let consumers = vec![
        Consumer::new(Arc::clone(&broker), queues::CREATE_CUSTOMER_REQUEST)
            .handler(MessageKind::CreateCustomerRequest, handler)
            .start_listening()
            .await?,
    ];

    let app = server::create_ops_app("customers", metrics_handle);

    let shutdown = Shutdown::new();
    shutdown.listen_for_signals();
    let served = runtime::serve(&config.server.addr(), app, &shutdown).await;

    runtime::stop_consumers(broker.as_ref(), consumers, runtime::CONSUMER_STOP_GRACE).await;
    db.close().await;
    served.map_err(StartupError::from)
}
