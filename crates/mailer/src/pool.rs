//! Fixed-size pool of SMTP delivery workers.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use crate::job::EmailSendJob;
use crate::transport::MailTransport;
use crate::{MailError, Result};

/// Upper bound on concurrent outbound SMTP connections.
pub const MAX_CONCURRENT_SMTP_CONNECTIONS: usize = 10;

/// Capacity of the channel feeding the error reporter.
pub const ERROR_CHANNEL_CAPACITY: usize = 64;

/// A failed delivery, forwarded to the reporter task.
#[derive(Debug)]
pub struct DeliveryError {
    pub recipient: String,
    pub worker: usize,
    pub error: MailError,
}

/// Drains [`EmailSendJob`]s with a fixed number of workers.
///
/// Each worker owns one transport for its whole life, so the pool size is
/// also the number of concurrent SMTP connections. The job channel holds
/// at most one job per worker; [`submit`](Self::submit) waits when it is
/// full, which holds back the broker consumer feeding the pool.
///
/// Failed deliveries are logged by a single reporter task and dropped.
pub struct WorkerPool {
    size: usize,
    jobs: mpsc::Sender<EmailSendJob>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    reporter: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Clamps a configured size to `1..=MAX_CONCURRENT_SMTP_CONNECTIONS`.
    pub fn effective_size(configured: usize) -> usize {
        configured.clamp(1, MAX_CONCURRENT_SMTP_CONNECTIONS)
    }

    /// Starts the workers and the error reporter.
    ///
    /// `factory` is called once per worker with the worker index. Fails
    /// without starting anything if any transport cannot be built.
    pub fn start<T, F>(configured: usize, factory: F) -> Result<Self>
    where
        T: MailTransport + 'static,
        F: Fn(usize) -> Result<T>,
    {
        let size = Self::effective_size(configured);
        if size != configured {
            tracing::warn!(configured, size, "worker pool size clamped");
        }

        let transports = (0..size).map(&factory).collect::<Result<Vec<T>>>()?;

        let (jobs, receiver) = mpsc::channel(size);
        let receiver = Arc::new(Mutex::new(receiver));
        let (errors, error_receiver) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        let (shutdown, _) = watch::channel(false);

        let workers = transports
            .into_iter()
            .enumerate()
            .map(|(index, transport)| {
                tokio::spawn(run_worker(
                    index,
                    transport,
                    Arc::clone(&receiver),
                    errors.clone(),
                    shutdown.subscribe(),
                ))
            })
            .collect();
        let reporter = tokio::spawn(run_reporter(error_receiver));

        tracing::info!(size, "email worker pool started");
        Ok(Self {
            size,
            jobs,
            shutdown,
            workers: Mutex::new(workers),
            reporter: Mutex::new(Some(reporter)),
        })
    }

    /// Returns the number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Queues a job, waiting while every worker is busy and the channel is full.
    pub async fn submit(&self, job: EmailSendJob) -> Result<()> {
        if *self.shutdown.borrow() {
            return Err(MailError::PoolClosed);
        }
        self.jobs.send(job).await.map_err(|_| MailError::PoolClosed)
    }

    /// Stops the pool.
    ///
    /// Workers finish the delivery they are on; jobs still queued are dropped.
    /// Returns once every worker and the reporter have exited.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);

        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "email worker panicked");
            }
        }
        if let Some(reporter) = self.reporter.lock().await.take()
            && let Err(e) = reporter.await
        {
            tracing::error!(error = %e, "email error reporter panicked");
        }
        tracing::info!("email worker pool stopped");
    }
}

async fn next_job(receiver: &Mutex<mpsc::Receiver<EmailSendJob>>) -> Option<EmailSendJob> {
    receiver.lock().await.recv().await
}

async fn run_worker<T: MailTransport>(
    index: usize,
    transport: T,
    receiver: Arc<Mutex<mpsc::Receiver<EmailSendJob>>>,
    errors: mpsc::Sender<DeliveryError>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let job = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            job = next_job(&receiver) => match job {
                Some(job) => job,
                None => break,
            },
        };

        metrics::gauge!("email_deliveries_in_flight").increment(1.0);
        let result = transport.send(&job.recipient, &job.content).await;
        metrics::gauge!("email_deliveries_in_flight").decrement(1.0);

        match result {
            Ok(()) => {
                metrics::counter!("emails_sent_total").increment(1);
                tracing::debug!(worker = index, recipient = %job.recipient, "email sent");
            }
            Err(error) => {
                metrics::counter!("emails_failed_total").increment(1);
                let report = DeliveryError {
                    recipient: job.recipient,
                    worker: index,
                    error,
                };
                if errors.send(report).await.is_err() {
                    tracing::warn!(worker = index, "error reporter gone");
                }
            }
        }
    }
    tracing::debug!(worker = index, "email worker stopped");
}

async fn run_reporter(mut errors: mpsc::Receiver<DeliveryError>) {
    while let Some(report) = errors.recv().await {
        tracing::error!(
            worker = report.worker,
            recipient = %report.recipient,
            error = %report.error,
            "email delivery failed"
        );
    }
}
