use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::task::JoinHandle;

use crate::Result;
use crate::broker::{Broker, Delivery};
use crate::envelope::MessageEnvelope;
use crate::message::{Message, MessageKind};

/// Error returned by a message handler. Causes the delivery to be requeued.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Reacts to one kind of message.
///
/// Handlers must be idempotent: the broker delivers at least once and may
/// redeliver in any order.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> std::result::Result<(), HandlerError>;
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Handler succeeded; message removed from the queue.
    Acked,
    /// Handler failed; message returned to the queue for redelivery.
    Requeued,
    /// Message could not be decoded or had no handler; dropped.
    Rejected,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Acked => "acked",
            Outcome::Requeued => "requeued",
            Outcome::Rejected => "rejected",
        }
    }
}

/// Drains one queue, dispatching each message to the handler for its kind.
///
/// Uses a single subscriber, so handlers for a queue never run concurrently.
pub struct Consumer<B: Broker + ?Sized> {
    broker: Arc<B>,
    queue: String,
    consumer_tag: String,
    handlers: HashMap<MessageKind, Arc<dyn MessageHandler>>,
}

impl<B: Broker + ?Sized + 'static> Consumer<B> {
    /// Creates a consumer for `queue` with no handlers.
    pub fn new(broker: Arc<B>, queue: impl Into<String>) -> Self {
        let queue = queue.into();
        let consumer_tag = format!("{queue}-{}", uuid::Uuid::new_v4());
        Self {
            broker,
            queue,
            consumer_tag,
            handlers: HashMap::new(),
        }
    }

    /// Registers the handler for `kind`, replacing any previous one.
    pub fn handler(mut self, kind: MessageKind, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Subscribes to the queue and spawns the receive loop.
    ///
    /// Fails only if the subscription cannot be established. Handler errors
    /// at runtime are logged and settled, never returned here.
    pub async fn start_listening(self) -> Result<ConsumerHandle> {
        let handle = self.broker.open_queue(&self.queue).await?;
        let mut deliveries = self.broker.subscribe(&handle, &self.consumer_tag).await?;
        tracing::info!(queue = %self.queue, tag = %self.consumer_tag, "consumer started");

        let queue = self.queue.clone();
        let task = tokio::spawn(async move {
            while let Some(next) = deliveries.next().await {
                match next {
                    Ok(delivery) => {
                        self.process(delivery).await;
                    }
                    Err(e) => {
                        tracing::error!(queue = %self.queue, error = %e, "delivery stream error");
                    }
                }
            }
            tracing::info!(queue = %self.queue, "consumer stopped");
        });

        Ok(ConsumerHandle { queue, task })
    }

    /// Decodes, dispatches and settles a single delivery.
    async fn process(&self, delivery: Delivery) -> Outcome {
        let outcome = match MessageEnvelope::decode(delivery.data()) {
            Err(e) => {
                tracing::warn!(queue = %self.queue, error = %e, "dropping undecodable message");
                self.settle(delivery, Outcome::Rejected).await
            }
            Ok(envelope) => {
                let kind = envelope.kind();
                match self.handlers.get(&kind) {
                    None => {
                        tracing::warn!(queue = %self.queue, %kind, "no handler for message kind");
                        self.settle(delivery, Outcome::Rejected).await
                    }
                    Some(handler) => match handler.handle(envelope.into_message()).await {
                        Ok(()) => self.settle(delivery, Outcome::Acked).await,
                        Err(e) => {
                            tracing::error!(
                                queue = %self.queue,
                                %kind,
                                redelivered = delivery.redelivered(),
                                error = %e,
                                "handler failed, message requeued"
                            );
                            self.settle(delivery, Outcome::Requeued).await
                        }
                    },
                }
            }
        };

        metrics::counter!(
            "broker_messages_consumed_total",
            "queue" => self.queue.clone(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
        outcome
    }

    async fn settle(&self, delivery: Delivery, outcome: Outcome) -> Outcome {
        let result = match outcome {
            Outcome::Acked => delivery.ack().await,
            Outcome::Requeued => delivery.nack(true).await,
            Outcome::Rejected => delivery.nack(false).await,
        };
        if let Err(e) = result {
            tracing::error!(queue = %self.queue, error = %e, "failed to settle delivery");
        }
        outcome
    }
}

/// Handle to a running consumer loop.
pub struct ConsumerHandle {
    queue: String,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Returns the queue being consumed.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Waits for the receive loop to exit (after the broker is closed).
    pub async fn join(self) {
        if let Err(e) = self.task.await
            && !e.is_cancelled()
        {
            tracing::error!(queue = %self.queue, error = %e, "consumer task panicked");
        }
    }

    /// Like [`join`](Self::join), but aborts the loop if it is still running
    /// after `grace`. Returns false if the loop had to be aborted.
    pub async fn join_or_abort(mut self, grace: Duration) -> bool {
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                if !e.is_cancelled() {
                    tracing::error!(queue = %self.queue, error = %e, "consumer task panicked");
                }
                true
            }
            Err(_) => {
                tracing::warn!(queue = %self.queue, ?grace, "consumer did not stop in time, aborting");
                self.task.abort();
                false
            }
        }
    }
}
