//! Mailer service: schedules rate e-mail cycles and delivers the e-mails.

use std::process::ExitCode;
use std::sync::Arc;

use broker::{AmqpBroker, Consumer, MessageKind};
use common::queues;
use mailer::{CronTrigger, RateEmailsHandler, Scheduler, SmtpMailTransport, WorkerPool};
use server::config::MailerConfig;
use server::error::StartupError;
use server::shutdown::Shutdown;
use server::{runtime, telemetry};

#[tokio::main]
async fn main() -> ExitCode {
    let config = MailerConfig::from_env();
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
    runtime::exit_code("mailer", result)
}

async fn run(config: MailerConfig) -> Result<(), StartupError> {
    let metrics_handle = telemetry::install_metrics()?;

    let pool = Arc::new(WorkerPool::start(config.connection_pool_size, |_| {
        SmtpMailTransport::new(&config.smtp)
    })?);

    let broker = Arc::new(AmqpBroker::connect(&config.server.amqp_url).await?);

    let handler = Arc::new(RateEmailsHandler::new(Arc::clone(&pool)));
    let consumers = vec![
        Consumer::new(Arc::clone(&broker), queues::RATE_EMAILS)
            .handler(MessageKind::RateEmails, handler)
            .start_listening()
            .await?,
    ];

    let shutdown = Shutdown::new();
    shutdown.listen_for_signals();

    let trigger = CronTrigger::new(config.scheduler_schedule.clone());
    if let Some(next) = trigger.next_fire_time() {
        tracing::info!(%next, "scheduler started");
    }
    let scheduler = Scheduler::new(trigger, Arc::clone(&broker));
    let scheduler = tokio::spawn(scheduler.run(shutdown.wait()));

    let app = server::create_ops_app("mailer", metrics_handle);
    let served = runtime::serve(&config.server.addr(), app, &shutdown).await;

    // The server may have failed on its own; make sure the scheduler stops too.
    shutdown.trigger();
    match scheduler.await {
        Ok(triggers) => tracing::info!(triggers, "scheduler stopped"),
        Err(e) => tracing::error!(error = %e, "scheduler task failed"),
    }

    runtime::stop_consumers(broker.as_ref(), consumers, runtime::CONSUMER_STOP_GRACE).await;
    pool.shutdown().await;
    served.map_err(StartupError::from)
}
