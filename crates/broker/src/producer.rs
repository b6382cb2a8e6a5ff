use std::sync::Arc;

use crate::Result;
use crate::broker::Broker;
use crate::envelope::MessageEnvelope;
use crate::message::Message;

/// Publishes enveloped messages to named queues.
///
/// Cheap to clone and safe to share between tasks; each call encodes its
/// own buffer before handing it to the broker.
pub struct Producer<B: Broker + ?Sized> {
    broker: Arc<B>,
}

impl<B: Broker + ?Sized> Clone for Producer<B> {
    fn clone(&self) -> Self {
        Self {
            broker: Arc::clone(&self.broker),
        }
    }
}

impl<B: Broker + ?Sized> Producer<B> {
    /// Creates a producer over a shared broker binding.
    pub fn new(broker: Arc<B>) -> Self {
        Self { broker }
    }

    /// Wraps `message` in a fresh envelope and publishes it to `queue`.
    pub async fn send(&self, message: impl Into<Message>, queue: &str) -> Result<()> {
        self.send_envelope(&MessageEnvelope::new(message), queue)
            .await
    }

    /// Publishes an existing envelope to `queue`.
    ///
    /// Returns once the broker has accepted the message, not once it was
    /// processed by a consumer.
    #[tracing::instrument(skip(self, envelope), fields(kind = %envelope.kind()))]
    pub async fn send_envelope(&self, envelope: &MessageEnvelope, queue: &str) -> Result<()> {
        let payload = envelope.encode()?;
        let handle = self.broker.open_queue(queue).await?;
        self.broker.publish(&handle, &payload).await?;

        metrics::counter!(
            "broker_messages_published_total",
            "queue" => queue.to_string(),
            "kind" => envelope.kind().as_str()
        )
        .increment(1);
        tracing::debug!(queue, "message published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBroker;
    use crate::message::{CreateCustomerRequest, MessageKind};

    #[tokio::test]
    async fn send_publishes_decodable_envelope() {
        let broker = Arc::new(InMemoryBroker::new());
        let producer = Producer::new(Arc::clone(&broker));

        producer
            .send(
                CreateCustomerRequest {
                    email: "a@x.com".to_string(),
                },
                "create-customer-request",
            )
            .await
            .unwrap();

        let published = broker.published("create-customer-request").await;
        assert_eq!(published.len(), 1);
        let envelope = MessageEnvelope::decode(&published[0]).unwrap();
        assert_eq!(envelope.kind(), MessageKind::CreateCustomerRequest);
    }

    #[tokio::test]
    async fn send_preserves_order_for_one_sender() {
        let broker = Arc::new(InMemoryBroker::new());
        let producer = Producer::new(Arc::clone(&broker));

        for i in 0..5 {
            producer
                .send(
                    CreateCustomerRequest {
                        email: format!("user{i}@x.com"),
                    },
                    "q",
                )
                .await
                .unwrap();
        }

        let emails: Vec<String> = broker
            .published("q")
            .await
            .iter()
            .map(|bytes| match MessageEnvelope::decode(bytes).unwrap().into_message() {
                Message::CreateCustomerRequest(req) => req.email,
                other => panic!("unexpected message {other:?}"),
            })
            .collect();
        let expected: Vec<String> = (0..5).map(|i| format!("user{i}@x.com")).collect();
        assert_eq!(emails, expected);
    }

    #[tokio::test]
    async fn send_surfaces_publish_failure() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.set_fail_on_publish(true);
        let producer = Producer::new(Arc::clone(&broker));

        let result = producer
            .send(
                CreateCustomerRequest {
                    email: "a@x.com".to_string(),
                },
                "q",
            )
            .await;
        assert!(result.is_err());
    }
}
