//! In-process simulated broker.
//!
//! Messages published here are delivered to a single consumer per queue.
//! With `no_ack` a delivery leaves the queue the moment it is handed to the
//! consumer, and nothing ever redelivers it. Without `no_ack` deliveries are
//! counted as unacknowledged, since the consumer never acknowledges.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{
    BrokerChannel, BrokerConnection, BrokerConnector, BrokerError, ConsumeOptions, Delivery,
    DeliveryStream, QueueOptions,
};

/// Point-in-time view of a simulated queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub durable: bool,
    /// Published and not yet delivered
    pub ready: usize,
    pub delivered: u64,
    /// Delivered and still awaiting acknowledgment
    pub unacked: usize,
}

struct MemoryQueue {
    durable: AtomicBool,
    sender: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
    ready: AtomicUsize,
    delivered: AtomicU64,
    unacked: AtomicUsize,
}

impl MemoryQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            durable: AtomicBool::new(false),
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            ready: AtomicUsize::new(0),
            delivered: AtomicU64::new(0),
            unacked: AtomicUsize::new(0),
        }
    }
}

#[derive(Default)]
struct MemoryBrokerInner {
    queues: DashMap<String, Arc<MemoryQueue>>,
    refuse_connections: AtomicBool,
}

/// Cloneable handle; all clones share the same queues
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<MemoryBrokerInner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, name: &str) -> Arc<MemoryQueue> {
        self.inner
            .queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryQueue::new()))
            .clone()
    }

    /// Enqueue a raw message body. Returns false once the queue is closed.
    pub fn publish(&self, queue: &str, body: impl Into<Vec<u8>>) -> bool {
        let queue = self.queue(queue);
        let sender = match queue.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return false,
        };

        match sender {
            Some(tx) => {
                queue.ready.fetch_add(1, Ordering::SeqCst);
                if tx.send(body.into()).is_err() {
                    queue.ready.fetch_sub(1, Ordering::SeqCst);
                    return false;
                }
                true
            }
            None => false,
        }
    }

    pub fn publish_json(&self, queue: &str, message: &serde_json::Value) -> bool {
        self.publish(queue, message.to_string())
    }

    /// Stop accepting messages; the consumer stream ends once the backlog is delivered.
    pub fn close_queue(&self, queue: &str) {
        if let Ok(mut sender) = self.queue(queue).sender.lock() {
            sender.take();
        }
    }

    /// Make subsequent `connect` calls fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    pub fn stats(&self, queue: &str) -> Option<QueueStats> {
        self.inner.queues.get(queue).map(|q| QueueStats {
            durable: q.durable.load(Ordering::SeqCst),
            ready: q.ready.load(Ordering::SeqCst),
            delivered: q.delivered.load(Ordering::SeqCst),
            unacked: q.unacked.load(Ordering::SeqCst),
        })
    }
}

#[async_trait]
impl BrokerConnector for MemoryBroker {
    async fn connect(&self, url: &str) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        if self.inner.refuse_connections.load(Ordering::SeqCst) {
            return Err(BrokerError::Connection(format!("connection refused: {}", url)));
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl BrokerConnection for MemoryBroker {
    async fn create_channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl BrokerChannel for MemoryBroker {
    async fn assert_queue(&self, queue: &str, options: QueueOptions) -> Result<(), BrokerError> {
        self.queue(queue).durable.store(options.durable, Ordering::SeqCst);
        Ok(())
    }

    async fn consume(&self, queue: &str, options: ConsumeOptions) -> Result<DeliveryStream, BrokerError> {
        let state = self.queue(queue);
        let receiver = state
            .receiver
            .lock()
            .ok()
            .and_then(|mut guard| guard.take())
            .ok_or_else(|| BrokerError::Consume {
                queue: queue.to_string(),
                reason: "queue already has a consumer".to_string(),
            })?;

        let no_ack = options.no_ack;
        let stream = UnboundedReceiverStream::new(receiver).map(move |body| {
            state.ready.fetch_sub(1, Ordering::SeqCst);
            let delivery_tag = state.delivered.fetch_add(1, Ordering::SeqCst) + 1;
            if !no_ack {
                state.unacked.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Delivery { delivery_tag, body })
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_channel(broker: &MemoryBroker) -> Box<dyn BrokerChannel> {
        let connection = broker.connect("memory://").await.unwrap();
        connection.create_channel().await.unwrap()
    }

    #[tokio::test]
    async fn test_auto_ack_removes_message_on_delivery() {
        let broker = MemoryBroker::new();
        let channel = open_channel(&broker).await;
        channel.assert_queue("events", QueueOptions { durable: true }).await.unwrap();

        assert!(broker.publish("events", "one"));
        assert!(broker.publish("events", "two"));
        assert_eq!(broker.stats("events").unwrap().ready, 2);

        let mut stream = channel
            .consume("events", ConsumeOptions { no_ack: true })
            .await
            .unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.body, b"one");
        assert_eq!(first.delivery_tag, 1);

        let stats = broker.stats("events").unwrap();
        assert!(stats.durable);
        assert_eq!(stats.ready, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.unacked, 0);
    }

    #[tokio::test]
    async fn test_manual_ack_leaves_deliveries_unacked() {
        let broker = MemoryBroker::new();
        let channel = open_channel(&broker).await;
        broker.publish("events", "one");

        let mut stream = channel
            .consume("events", ConsumeOptions { no_ack: false })
            .await
            .unwrap();
        stream.next().await.unwrap().unwrap();

        assert_eq!(broker.stats("events").unwrap().unacked, 1);
    }

    #[tokio::test]
    async fn test_close_queue_ends_stream_after_backlog() {
        let broker = MemoryBroker::new();
        let channel = open_channel(&broker).await;
        broker.publish("events", "last");
        broker.close_queue("events");
        assert!(!broker.publish("events", "too late"));

        let mut stream = channel
            .consume("events", ConsumeOptions { no_ack: true })
            .await
            .unwrap();
        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_single_consumer_per_queue() {
        let broker = MemoryBroker::new();
        let channel = open_channel(&broker).await;
        let _stream = channel
            .consume("events", ConsumeOptions { no_ack: true })
            .await
            .unwrap();

        let second = channel.consume("events", ConsumeOptions { no_ack: true }).await;
        assert!(matches!(second, Err(BrokerError::Consume { .. })));
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let broker = MemoryBroker::new();
        broker.refuse_connections(true);

        let result = broker.connect("memory://nowhere").await;
        assert!(matches!(result, Err(BrokerError::Connection(_))));
    }
}
