use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock, mpsc, watch};

use crate::broker::{Acknowledger, Broker, Delivery, DeliveryStream, QueueHandle};
use crate::{BrokerError, Result};

struct MemoryMessage {
    data: Vec<u8>,
    redelivered: bool,
}

struct MemoryQueue {
    handle: QueueHandle,
    sender: mpsc::UnboundedSender<MemoryMessage>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<MemoryMessage>>>,
    published: RwLock<Vec<Vec<u8>>>,
    acked: AtomicUsize,
    requeued: AtomicUsize,
    rejected: AtomicUsize,
}

struct InMemoryState {
    queues: RwLock<HashMap<String, Arc<MemoryQueue>>>,
    closed: watch::Sender<bool>,
    fail_publish: AtomicBool,
}

impl Default for InMemoryState {
    fn default() -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            closed: watch::channel(false).0,
            fail_publish: AtomicBool::new(false),
        }
    }
}

/// In-memory broker for testing.
///
/// Behaves like the AMQP binding: one subscriber per queue, at-least-once
/// delivery with requeue on negative acknowledgement. Also records every
/// published body and settlement counts for inspection.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<InMemoryState>,
}

impl InMemoryBroker {
    /// Creates a new broker with no queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail (or succeed again).
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Returns every body published to `queue`, in publish order.
    pub async fn published(&self, queue: &str) -> Vec<Vec<u8>> {
        match self.queue(queue).await {
            Some(q) => q.published.read().await.clone(),
            None => Vec::new(),
        }
    }

    /// Returns the number of deliveries acknowledged on `queue`.
    pub async fn acked_count(&self, queue: &str) -> usize {
        self.counter(queue, |q| &q.acked).await
    }

    /// Returns the number of deliveries negatively acknowledged with requeue.
    pub async fn requeued_count(&self, queue: &str) -> usize {
        self.counter(queue, |q| &q.requeued).await
    }

    /// Returns the number of deliveries rejected without requeue.
    pub async fn rejected_count(&self, queue: &str) -> usize {
        self.counter(queue, |q| &q.rejected).await
    }

    /// Pushes raw bytes onto a queue, bypassing the producer. Used to
    /// simulate foreign or corrupt publishers.
    pub async fn inject_raw(&self, queue: &str, data: Vec<u8>) -> Result<()> {
        let handle = self.open_queue(queue).await?;
        self.publish(&handle, &data).await
    }

    async fn queue(&self, name: &str) -> Option<Arc<MemoryQueue>> {
        self.state.queues.read().await.get(name).cloned()
    }

    async fn counter(&self, queue: &str, field: fn(&MemoryQueue) -> &AtomicUsize) -> usize {
        match self.queue(queue).await {
            Some(q) => field(&q).load(Ordering::SeqCst),
            None => 0,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if *self.state.closed.borrow() {
            return Err(BrokerError::Closed);
        }
        Ok(())
    }
}

struct MemoryAcker {
    queue: Arc<MemoryQueue>,
    data: Vec<u8>,
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> Result<()> {
        self.queue.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        if requeue {
            self.queue.requeued.fetch_add(1, Ordering::SeqCst);
            self.queue
                .sender
                .send(MemoryMessage {
                    data: self.data.clone(),
                    redelivered: true,
                })
                .map_err(|_| BrokerError::Closed)?;
        } else {
            self.queue.rejected.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn open_queue(&self, name: &str) -> Result<QueueHandle> {
        self.ensure_open()?;
        let mut queues = self.state.queues.write().await;
        if let Some(queue) = queues.get(name) {
            return Ok(queue.handle.clone());
        }

        let channel_id = u16::try_from(queues.len() + 1).unwrap_or(u16::MAX);
        let handle = QueueHandle::new(name, channel_id);
        let (sender, receiver) = mpsc::unbounded_channel();
        queues.insert(
            name.to_string(),
            Arc::new(MemoryQueue {
                handle: handle.clone(),
                sender,
                receiver: Mutex::new(Some(receiver)),
                published: RwLock::new(Vec::new()),
                acked: AtomicUsize::new(0),
                requeued: AtomicUsize::new(0),
                rejected: AtomicUsize::new(0),
            }),
        );
        Ok(handle)
    }

    async fn publish(&self, queue: &QueueHandle, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let q = self
            .queue(queue.name())
            .await
            .ok_or_else(|| BrokerError::QueueNotOpen(queue.name().to_string()))?;

        if self.state.fail_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::PublishRejected {
                queue: queue.name().to_string(),
            });
        }

        q.published.write().await.push(payload.to_vec());
        q.sender
            .send(MemoryMessage {
                data: payload.to_vec(),
                redelivered: false,
            })
            .map_err(|_| BrokerError::Closed)
    }

    async fn subscribe(&self, queue: &QueueHandle, _consumer_tag: &str) -> Result<DeliveryStream> {
        use futures_util::stream;

        self.ensure_open()?;
        let q = self
            .queue(queue.name())
            .await
            .ok_or_else(|| BrokerError::QueueNotOpen(queue.name().to_string()))?;
        let receiver = q
            .receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| BrokerError::AlreadySubscribed(queue.name().to_string()))?;

        let closed = self.state.closed.subscribe();
        let stream = stream::unfold((receiver, q, closed), |(mut rx, q, mut closed)| async move {
            if *closed.borrow() {
                return None;
            }
            let msg = tokio::select! {
                biased;
                _ = closed.changed() => return None,
                msg = rx.recv() => msg?,
            };
            let acker = MemoryAcker {
                queue: Arc::clone(&q),
                data: msg.data.clone(),
            };
            let delivery = Delivery::new(msg.data, msg.redelivered, Box::new(acker));
            Some((Ok(delivery), (rx, q, closed)))
        });
        Ok(Box::pin(stream))
    }

    async fn close(&self) -> Result<()> {
        self.state.closed.send_replace(true);
        Ok(())
    }
}
