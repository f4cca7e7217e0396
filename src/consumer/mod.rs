//! Broker to router bridge.
//!
//! [`EventsConsumer`] owns the broker connection. It subscribes to one
//! queue with automatic acknowledgment and republishes every parsed
//! message on the [`EventRouter`] under [`EVENT_RECEIVED`].
//!
//! Delivery is at-most-once: the broker forgets a message as soon as it
//! hands it over, so a message that fails to parse, or whose dispatch
//! fails later on, is gone.

use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::broker::{BrokerConnector, BrokerError, ConsumeOptions, Delivery, QueueOptions};
use crate::config::BrokerConfig;
use crate::event::MailEvent;
use crate::router::{EventRouter, EVENT_RECEIVED};

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("Malformed event message: {0}")]
    Parse(#[from] serde_json::Error),
}

pub struct EventsConsumer {
    config: BrokerConfig,
    connector: Arc<dyn BrokerConnector>,
    router: Arc<EventRouter<MailEvent>>,
    shutdown: broadcast::Sender<()>,
}

impl EventsConsumer {
    pub fn new(
        config: BrokerConfig,
        connector: Arc<dyn BrokerConnector>,
        router: Arc<EventRouter<MailEvent>>,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            config,
            connector,
            router,
            shutdown,
        }
    }

    /// Get a shutdown signal sender
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Connect, subscribe and relay messages until shutdown or end of stream.
    ///
    /// Setup failures are returned immediately and never retried.
    pub async fn start_consuming(&self) -> Result<(), ConsumerError> {
        let queue = self.config.queue.as_str();
        // Subscribe before the first await so a signal sent during setup is not missed
        let mut shutdown_rx = self.shutdown.subscribe();

        let connection = self.connector.connect(&self.config.url).await?;
        tracing::debug!(backend = %self.config.backend, "Broker connection established");

        let channel = connection.create_channel().await?;
        tracing::debug!("Broker channel created");

        channel.assert_queue(queue, QueueOptions { durable: true }).await?;
        tracing::info!(queue = %queue, "Queue asserted");

        let mut deliveries = channel.consume(queue, ConsumeOptions { no_ack: true }).await?;
        tracing::info!(queue = %queue, "Waiting for events");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Received shutdown signal, consumer stopping");
                    break;
                }
                delivery = deliveries.next() => {
                    match delivery {
                        Some(Ok(delivery)) => {
                            if let Err(e) = self.handle_delivery(&delivery) {
                                tracing::warn!(
                                    error = %e,
                                    delivery_tag = delivery.delivery_tag,
                                    body = %String::from_utf8_lossy(&delivery.body),
                                    "Message already acknowledged, dropped"
                                );
                            }
                        }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, queue = %queue, "Delivery stream failed");
                            return Err(e.into());
                        }
                        None => {
                            tracing::warn!(queue = %queue, "Delivery stream ended");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Parse one delivery and publish it on the router.
    ///
    /// Returns once every subscriber has been invoked; subscribers that do
    /// asynchronous work spawn it, so this does not wait for a dispatch.
    pub fn handle_delivery(&self, delivery: &Delivery) -> Result<MailEvent, ConsumerError> {
        let event: MailEvent = serde_json::from_slice(&delivery.body)?;

        tracing::info!(
            timestamp = ?event.timestamp,
            key = %event.lookup_key(),
            "Event received"
        );
        tracing::debug!(event = ?event, "Event content");

        self.router.publish(EVENT_RECEIVED, &event);
        Ok(event)
    }
}
