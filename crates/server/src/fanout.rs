//! Rate e-mail fan-out: one trigger becomes batches of confirmed recipients.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use broker::{Broker, HandlerError, Message, MessageHandler, Producer, RateEmails, Result};
use common::queues;
use domain::{RateService, SubscriptionRepository};

/// Default number of recipients per `rate_emails` message.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// What one fan-out cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Batches were published for every confirmed recipient.
    Dispatched { recipients: usize, batches: usize },
    /// Nothing was published; the next trigger is the retry.
    Skipped { reason: String },
}

/// Collects the rate and confirmed recipients and publishes send batches.
pub struct FanOutCoordinator<R, B>
where
    R: SubscriptionRepository,
    B: Broker + ?Sized,
{
    subscriptions: Arc<R>,
    rates: Arc<dyn RateService>,
    producer: Producer<B>,
    batch_size: usize,
}

impl<R, B> FanOutCoordinator<R, B>
where
    R: SubscriptionRepository,
    B: Broker + ?Sized,
{
    pub fn new(subscriptions: Arc<R>, rates: Arc<dyn RateService>, producer: Producer<B>) -> Self {
        Self {
            subscriptions,
            rates,
            producer,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets the number of recipients per batch (at least 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Runs one cycle.
    ///
    /// A failed rate or recipient lookup skips the cycle before anything is
    /// published. Recipients are de-duplicated, so each appears in exactly
    /// one batch. A publish failure part-way through is returned as an error.
    #[tracing::instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let rate = match self.rates.get_rate().await {
            Ok(rate) => rate,
            Err(e) => return Ok(self.skip(format!("rate unavailable: {e}"))),
        };
        let recipients = match self.subscriptions.get_all().await {
            Ok(recipients) => unique(recipients),
            Err(e) => return Ok(self.skip(format!("recipients unavailable: {e}"))),
        };

        let mut batches = 0;
        for chunk in recipients.chunks(self.batch_size) {
            let batch = RateEmails {
                rate,
                recipients: chunk.to_vec(),
            };
            self.producer.send(batch, queues::RATE_EMAILS).await?;
            batches += 1;
        }

        metrics::counter!("fanout_cycles_total", "outcome" => "dispatched").increment(1);
        tracing::info!(
            rate,
            recipients = recipients.len(),
            batches,
            "fan-out cycle dispatched"
        );
        Ok(CycleOutcome::Dispatched {
            recipients: recipients.len(),
            batches,
        })
    }

    fn skip(&self, reason: String) -> CycleOutcome {
        metrics::counter!("fanout_cycles_total", "outcome" => "skipped").increment(1);
        tracing::warn!(%reason, "fan-out cycle skipped");
        CycleOutcome::Skipped { reason }
    }
}

fn unique(recipients: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(recipients.len());
    recipients
        .into_iter()
        .filter(|r| seen.insert(r.clone()))
        .collect()
}

#[async_trait]
impl<R, B> MessageHandler for FanOutCoordinator<R, B>
where
    R: SubscriptionRepository + 'static,
    B: Broker + ?Sized + 'static,
{
    /// Never asks for redelivery: a re-run cycle would resend the batches
    /// already published.
    async fn handle(&self, message: Message) -> std::result::Result<(), HandlerError> {
        match message {
            Message::StartEmailSending(_) => {
                if let Err(e) = self.run_cycle().await {
                    metrics::counter!("fanout_cycles_total", "outcome" => "failed").increment(1);
                    tracing::error!(error = %e, "fan-out cycle aborted");
                }
                Ok(())
            }
            other => Err(format!("unexpected message kind {}", other.kind()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker::{InMemoryBroker, MessageEnvelope, StartEmailSending};
    use domain::{Email, InMemorySubscriptionRepository, StaticRateService, SubscriptionStatus};

    struct Harness {
        coordinator: FanOutCoordinator<InMemorySubscriptionRepository, InMemoryBroker>,
        repo: Arc<InMemorySubscriptionRepository>,
        rates: StaticRateService,
        broker: Arc<InMemoryBroker>,
    }

    fn harness(rate: f64) -> Harness {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        let rates = StaticRateService::new(rate);
        let broker = Arc::new(InMemoryBroker::new());
        let coordinator = FanOutCoordinator::new(
            Arc::clone(&repo),
            Arc::new(rates.clone()),
            Producer::new(Arc::clone(&broker)),
        );
        Harness {
            coordinator,
            repo,
            rates,
            broker,
        }
    }

    async fn add(repo: &InMemorySubscriptionRepository, raw: &str, status: SubscriptionStatus) {
        repo.insert_with_status(&Email::parse(raw).unwrap(), status)
            .await
            .unwrap();
    }

    async fn published_batches(broker: &InMemoryBroker) -> Vec<RateEmails> {
        broker
            .published(queues::RATE_EMAILS)
            .await
            .iter()
            .map(|bytes| match MessageEnvelope::decode(bytes).unwrap().into_message() {
                Message::RateEmails(batch) => batch,
                other => panic!("unexpected message {other:?}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_cycle_sends_rate_to_confirmed_recipients() {
        let h = harness(27.5);
        add(&h.repo, "a@x.com", SubscriptionStatus::Confirmed).await;
        add(&h.repo, "b@x.com", SubscriptionStatus::Confirmed).await;
        add(&h.repo, "pending@x.com", SubscriptionStatus::Pending).await;

        let outcome = h.coordinator.run_cycle().await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Dispatched {
                recipients: 2,
                batches: 1
            }
        );

        let batches = published_batches(&h.broker).await;
        assert_eq!(
            batches,
            vec![RateEmails {
                rate: 27.5,
                recipients: vec!["a@x.com".to_string(), "b@x.com".to_string()],
            }]
        );
    }

    #[tokio::test]
    async fn test_batches_cover_every_recipient_once() {
        let h = harness(40.0);
        let coordinator = h.coordinator.with_batch_size(3);
        for i in 0..8 {
            add(&h.repo, &format!("user{i}@x.com"), SubscriptionStatus::Confirmed).await;
        }

        let outcome = coordinator.run_cycle().await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Dispatched {
                recipients: 8,
                batches: 3
            }
        );

        let batches = published_batches(&h.broker).await;
        let sizes: Vec<usize> = batches.iter().map(|b| b.recipients.len()).collect();
        assert_eq!(sizes, vec![3, 3, 2]);
        let all: Vec<String> = batches.into_iter().flat_map(|b| b.recipients).collect();
        let expected: Vec<String> = (0..8).map(|i| format!("user{i}@x.com")).collect();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn test_rate_failure_skips_without_publishing() {
        let h = harness(27.5);
        add(&h.repo, "a@x.com", SubscriptionStatus::Confirmed).await;
        h.rates.set_failure("upstream timeout").await;

        let outcome = h.coordinator.run_cycle().await.unwrap();
        match outcome {
            CycleOutcome::Skipped { reason } => assert!(reason.contains("upstream timeout")),
            other => panic!("expected skip, got {other:?}"),
        }
        assert!(published_batches(&h.broker).await.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_skips_without_publishing() {
        let h = harness(27.5);
        h.repo.set_fail_on_read(true);

        let outcome = h.coordinator.run_cycle().await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Skipped { .. }));
        assert!(published_batches(&h.broker).await.is_empty());
    }

    #[tokio::test]
    async fn test_no_recipients_publishes_nothing() {
        let h = harness(27.5);
        let outcome = h.coordinator.run_cycle().await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Dispatched {
                recipients: 0,
                batches: 0
            }
        );
        assert!(published_batches(&h.broker).await.is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_is_absorbed_by_handler() {
        let h = harness(27.5);
        add(&h.repo, "a@x.com", SubscriptionStatus::Confirmed).await;
        h.broker.set_fail_on_publish(true);

        assert!(h.coordinator.run_cycle().await.is_err());
        let handled = h
            .coordinator
            .handle(Message::StartEmailSending(StartEmailSending::default()))
            .await;
        assert!(handled.is_ok());
    }

    #[test]
    fn test_unique_keeps_first_occurrence() {
        let input = ["b", "a", "b", "c", "a"].map(String::from).to_vec();
        assert_eq!(unique(input), vec!["b", "a", "c"]);
    }
}
