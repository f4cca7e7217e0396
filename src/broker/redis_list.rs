//! Redis list used as a work queue.
//!
//! Producers `RPUSH` JSON events onto the list; the consumer pops them with
//! `BLPOP`. A popped message is gone from Redis, which is exactly automatic
//! acknowledgment, so manual acknowledgment is rejected.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use super::{
    BrokerChannel, BrokerConnection, BrokerConnector, BrokerError, ConsumeOptions, Delivery,
    DeliveryStream, QueueOptions,
};

pub struct RedisConnector {
    poll_timeout: Duration,
}

impl RedisConnector {
    pub fn new(poll_timeout: Duration) -> Self {
        Self { poll_timeout }
    }
}

#[async_trait]
impl BrokerConnector for RedisConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        let client = redis::Client::open(url).map_err(|e| BrokerError::Connection(e.to_string()))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        Ok(Box::new(RedisConnection {
            connection,
            poll_timeout: self.poll_timeout,
        }))
    }
}

struct RedisConnection {
    connection: MultiplexedConnection,
    poll_timeout: Duration,
}

#[async_trait]
impl BrokerConnection for RedisConnection {
    async fn create_channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError> {
        let mut connection = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;

        Ok(Box::new(RedisChannel {
            connection,
            poll_timeout: self.poll_timeout,
        }))
    }
}

struct RedisChannel {
    connection: MultiplexedConnection,
    poll_timeout: Duration,
}

#[async_trait]
impl BrokerChannel for RedisChannel {
    async fn assert_queue(&self, queue: &str, options: QueueOptions) -> Result<(), BrokerError> {
        // Lists come into existence on first push; only check the key is usable
        let mut connection = self.connection.clone();
        let kind: String = redis::cmd("TYPE")
            .arg(queue)
            .query_async(&mut connection)
            .await
            .map_err(|e| BrokerError::Queue {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;

        if kind != "list" && kind != "none" {
            return Err(BrokerError::Queue {
                queue: queue.to_string(),
                reason: format!("key holds a {} value", kind),
            });
        }

        tracing::debug!(queue = %queue, durable = options.durable, "Redis list queue asserted");
        Ok(())
    }

    async fn consume(&self, queue: &str, options: ConsumeOptions) -> Result<DeliveryStream, BrokerError> {
        if !options.no_ack {
            return Err(BrokerError::Unsupported(
                "redis list queues only support automatic acknowledgment".to_string(),
            ));
        }

        let mut connection = self.connection.clone();
        let queue = queue.to_string();
        let timeout = self.poll_timeout.as_secs().max(1);

        let stream = async_stream::stream! {
            let mut delivery_tag = 0u64;
            loop {
                let reply: redis::RedisResult<Option<(String, Vec<u8>)>> = redis::cmd("BLPOP")
                    .arg(&queue)
                    .arg(timeout)
                    .query_async(&mut connection)
                    .await;

                match reply {
                    Ok(Some((_, body))) => {
                        delivery_tag += 1;
                        yield Ok(Delivery { delivery_tag, body });
                    }
                    // Poll timeout, nothing queued
                    Ok(None) => continue,
                    Err(e) => {
                        yield Err(BrokerError::Delivery(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
