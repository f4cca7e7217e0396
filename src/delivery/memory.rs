use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{DeliveryError, DeliveryGateway, DeliveryReceipt, OutboundMessage};

/// Records messages instead of sending them.
///
/// Optionally fails every send, to exercise transport error paths.
#[derive(Clone, Default)]
pub struct MemoryGateway {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    failure: Option<String>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway whose every send fails with `reason`
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            sent: Arc::default(),
            failure: Some(reason.into()),
        }
    }

    /// Messages handed to `send`, including failed attempts
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }
}

#[async_trait]
impl DeliveryGateway for MemoryGateway {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DeliveryError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }

        if let Some(reason) = &self.failure {
            return Err(DeliveryError::Transport(reason.clone()));
        }

        tracing::debug!(to = %message.to, subject = %message.subject, "Message recorded by memory gateway");
        Ok(DeliveryReceipt::new("recorded"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_messages() {
        let gateway = MemoryGateway::new();
        let message = OutboundMessage::new("a@b.com".into(), "Hi", "body", vec![]);

        let receipt = gateway.send(&message).await.unwrap();
        assert_eq!(receipt.response, "recorded");
        assert_eq!(gateway.send_count(), 1);
        assert_eq!(gateway.messages()[0].subject, "Hi");
    }

    #[tokio::test]
    async fn test_failing_gateway() {
        let gateway = MemoryGateway::failing("connection reset");
        let message = OutboundMessage::new("a@b.com".into(), "Hi", "body", vec![]);

        let err = gateway.send(&message).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(ref r) if r == "connection reset"));
        assert_eq!(gateway.send_count(), 1);
    }
}
