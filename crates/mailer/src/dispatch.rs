use std::sync::Arc;

use async_trait::async_trait;
use broker::{HandlerError, Message, MessageHandler, RateEmails};

use crate::job::EmailSendJob;
use crate::pool::WorkerPool;
use crate::templates::RenderedEmail;
use crate::Result;

/// Turns `rate_emails` messages into per-recipient jobs for the pool.
pub struct RateEmailsHandler {
    pool: Arc<WorkerPool>,
}

impl RateEmailsHandler {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }

    /// Renders the notification once and queues one job per recipient.
    ///
    /// Waits for free workers; returns the number of jobs queued.
    #[tracing::instrument(
        skip(self, batch),
        fields(rate = batch.rate, recipients = batch.recipients.len())
    )]
    pub async fn dispatch(&self, batch: RateEmails) -> Result<usize> {
        let content = Arc::new(RenderedEmail::rate_notification(batch.rate)?);
        let mut queued = 0;
        for recipient in batch.recipients {
            self.pool
                .submit(EmailSendJob::new(recipient, batch.rate, Arc::clone(&content)))
                .await?;
            metrics::counter!("emails_enqueued_total").increment(1);
            queued += 1;
        }
        tracing::info!(queued, "rate emails queued");
        Ok(queued)
    }
}

#[async_trait]
impl MessageHandler for RateEmailsHandler {
    async fn handle(&self, message: Message) -> std::result::Result<(), HandlerError> {
        match message {
            Message::RateEmails(batch) => {
                self.dispatch(batch).await?;
                Ok(())
            }
            other => Err(format!("unexpected message kind {}", other.kind()).into()),
        }
    }
}
