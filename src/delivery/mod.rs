//! Outbound mail delivery.
//!
//! The orchestrator hands a fully rendered [`OutboundMessage`] to a
//! [`DeliveryGateway`] and only learns whether the send succeeded.

mod memory;
mod smtp;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::{MessageDefaults, SmtpConfig};
use crate::event::Recipients;

pub use memory::MemoryGateway;
pub use smtp::SmtpGateway;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Invalid address \"{address}\": {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Invalid content type \"{0}\" for attachment")]
    InvalidContentType(String),

    #[error("Cannot read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot build message: {0}")]
    Build(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Attachment with its path resolved against the template base path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAttachment {
    pub filename: String,
    pub path: PathBuf,
    pub content_type: String,
}

/// One rendered mail, built and consumed within a single dispatch
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    pub to: Recipients,
    pub subject: String,
    pub html: String,
    /// Absent rather than empty when the template has no attachments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<ResolvedAttachment>>,
}

impl OutboundMessage {
    pub fn new(
        to: Recipients,
        subject: impl Into<String>,
        html: impl Into<String>,
        attachments: Vec<ResolvedAttachment>,
    ) -> Self {
        Self {
            to,
            subject: subject.into(),
            html: html.into(),
            attachments: if attachments.is_empty() {
                None
            } else {
                Some(attachments)
            },
        }
    }
}

/// Transport acknowledgment of a successful send
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReceipt {
    pub response: String,
    pub sent_at: DateTime<Utc>,
}

impl DeliveryReceipt {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            sent_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Create a delivery gateway based on configuration.
///
/// - `"memory"`: [`MemoryGateway`], messages are recorded and logged, never sent
/// - `"smtp"` (default): [`SmtpGateway`]
pub fn create_delivery_gateway(
    smtp: &SmtpConfig,
    defaults: &MessageDefaults,
) -> Result<Arc<dyn DeliveryGateway>, DeliveryError> {
    match smtp.backend.as_str() {
        "memory" => {
            tracing::warn!(backend = "memory", "Creating in-memory delivery gateway, no mail will leave this process");
            Ok(Arc::new(MemoryGateway::new()))
        }
        other => {
            if other != "smtp" {
                tracing::warn!(backend = %other, "Unknown delivery backend, falling back to smtp");
            }
            let gateway = SmtpGateway::new(smtp, defaults)?;
            tracing::info!(host = %smtp.host, port = smtp.port, secure = smtp.secure, "SMTP transport initialized");
            Ok(Arc::new(gateway))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_attachments_are_omitted() {
        let message = OutboundMessage::new("a@b.com".into(), "Hi", "<p>hi</p>", vec![]);
        assert!(message.attachments.is_none());

        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("attachments").is_none());
        assert_eq!(json["to"], "a@b.com");
    }

    #[test]
    fn test_attachments_are_kept_in_order() {
        let attachments = vec![
            ResolvedAttachment {
                filename: "a.pdf".to_string(),
                path: PathBuf::from("/t/a.pdf"),
                content_type: "application/pdf".to_string(),
            },
            ResolvedAttachment {
                filename: "b.pdf".to_string(),
                path: PathBuf::from("/t/b.pdf"),
                content_type: "application/pdf".to_string(),
            },
        ];

        let message = OutboundMessage::new("a@b.com".into(), "Hi", "body", attachments);
        let names: Vec<_> = message
            .attachments
            .as_ref()
            .unwrap()
            .iter()
            .map(|a| a.filename.as_str())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    }
}
