//! Message broker client capability.
//!
//! The consumer talks to the broker through three small traits mirroring
//! the usual client shape: connect to a URL, open a channel on the
//! connection, then assert and consume a queue on the channel.
//!
//! Backends:
//!
//! - [`AmqpConnector`]: RabbitMQ or any AMQP 0.9.1 broker
//! - [`RedisConnector`]: Redis list used as a queue (`BLPOP`)
//! - [`MemoryBroker`]: in-process simulated broker, used for tests and local runs
//!
//! Use [`create_broker_connector`] to select one from configuration.

mod amqp;
mod memory;
mod redis_list;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::config::BrokerConfig;

pub use amqp::AmqpConnector;
pub use memory::{MemoryBroker, QueueStats};
pub use redis_list::RedisConnector;

/// Broker error type
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker connection failed: {0}")]
    Connection(String),

    #[error("Channel creation failed: {0}")]
    Channel(String),

    #[error("Queue assertion failed for \"{queue}\": {reason}")]
    Queue { queue: String, reason: String },

    #[error("Subscription to \"{queue}\" failed: {reason}")]
    Consume { queue: String, reason: String },

    #[error("Delivery stream failed: {0}")]
    Delivery(String),

    #[error("Unsupported broker option: {0}")]
    Unsupported(String),
}

/// Options for asserting a queue
#[derive(Debug, Clone, Copy)]
pub struct QueueOptions {
    pub durable: bool,
}

/// Options for consuming a queue
#[derive(Debug, Clone, Copy)]
pub struct ConsumeOptions {
    /// The broker considers a message consumed as soon as it is delivered
    pub no_ack: bool,
}

/// A message handed over by the broker
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub body: Vec<u8>,
}

pub type DeliveryStream = BoxStream<'static, Result<Delivery, BrokerError>>;

#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn BrokerConnection>, BrokerError>;
}

#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn create_channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError>;
}

#[async_trait]
pub trait BrokerChannel: Send + Sync {
    async fn assert_queue(&self, queue: &str, options: QueueOptions) -> Result<(), BrokerError>;

    async fn consume(&self, queue: &str, options: ConsumeOptions) -> Result<DeliveryStream, BrokerError>;
}

/// Create a broker connector based on configuration.
///
/// - `"redis"`: [`RedisConnector`]
/// - `"memory"`: an empty [`MemoryBroker`]
/// - `"amqp"` (default): [`AmqpConnector`]
pub fn create_broker_connector(settings: &BrokerConfig) -> Arc<dyn BrokerConnector> {
    match settings.backend.as_str() {
        "redis" => {
            tracing::info!(backend = "redis", queue = %settings.queue, "Creating Redis broker connector");
            Arc::new(RedisConnector::new(Duration::from_secs(settings.poll_timeout_secs)))
        }
        "memory" => {
            tracing::warn!(
                backend = "memory",
                "Creating in-memory broker, nothing outside this process can publish to it"
            );
            Arc::new(MemoryBroker::new())
        }
        other => {
            if other != "amqp" {
                tracing::warn!(backend = %other, "Unknown broker backend, falling back to amqp");
            }
            tracing::info!(backend = "amqp", queue = %settings.queue, "Creating AMQP broker connector");
            Arc::new(AmqpConnector::new(settings.consumer_tag.clone()))
        }
    }
}
