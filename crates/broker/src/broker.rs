use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::Result;

/// Handle to a queue opened on a broker.
///
/// Opening the same name twice on one broker yields equal handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueHandle {
    name: String,
    channel_id: u16,
}

impl QueueHandle {
    /// Creates a handle for a queue bound to the given channel.
    pub fn new(name: impl Into<String>, channel_id: u16) -> Self {
        Self {
            name: name.into(),
            channel_id,
        }
    }

    /// Returns the queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the identifier of the channel serving this queue.
    pub fn channel_id(&self) -> u16 {
        self.channel_id
    }
}

/// Settles a delivery with the broker.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Removes the message from the queue.
    async fn ack(&self) -> Result<()>;

    /// Refuses the message; with `requeue` it becomes eligible for redelivery.
    async fn nack(&self, requeue: bool) -> Result<()>;
}

/// A message received from a queue, waiting to be settled.
pub struct Delivery {
    data: Vec<u8>,
    redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    /// Creates a delivery from its raw body and acknowledger.
    pub fn new(data: Vec<u8>, redelivered: bool, acker: Box<dyn Acknowledger>) -> Self {
        Self {
            data,
            redelivered,
            acker,
        }
    }

    /// Returns the raw message body.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns true if the broker delivered this message before.
    pub fn redelivered(&self) -> bool {
        self.redelivered
    }

    /// Acknowledges the delivery.
    pub async fn ack(self) -> Result<()> {
        self.acker.ack().await
    }

    /// Negatively acknowledges the delivery.
    pub async fn nack(self, requeue: bool) -> Result<()> {
        self.acker.nack(requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("len", &self.data.len())
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

/// A stream of deliveries from one queue. Ends when the broker is closed.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery>> + Send>>;

/// Binding to a message broker.
///
/// One broker value owns one connection. It is created at process startup,
/// shared by reference with every producer and consumer, and closed
/// explicitly at shutdown.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declares a durable queue and returns its handle.
    ///
    /// Idempotent per name: repeated opens return the same handle.
    async fn open_queue(&self, name: &str) -> Result<QueueHandle>;

    /// Publishes raw bytes to a queue, returning once the broker accepted them.
    async fn publish(&self, queue: &QueueHandle, payload: &[u8]) -> Result<()>;

    /// Starts consuming a queue.
    async fn subscribe(&self, queue: &QueueHandle, consumer_tag: &str) -> Result<DeliveryStream>;

    /// Releases the underlying connection.
    async fn close(&self) -> Result<()>;
}
