use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, Mailboxes, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::{MessageDefaults, SmtpConfig};

use super::{DeliveryError, DeliveryGateway, DeliveryReceipt, OutboundMessage};

/// SMTP delivery through a pooled async transport
pub struct SmtpGateway {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    reply_to: Option<Mailbox>,
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| DeliveryError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Parse one recipient entry, which may itself be a comma separated list
fn parse_mailboxes(addresses: &str) -> Result<Mailboxes, DeliveryError> {
    addresses
        .parse::<Mailboxes>()
        .map_err(|e| DeliveryError::InvalidAddress {
            address: addresses.to_string(),
            reason: e.to_string(),
        })
}

impl SmtpGateway {
    pub fn new(config: &SmtpConfig, defaults: &MessageDefaults) -> Result<Self, DeliveryError> {
        let tls = if config.secure {
            let parameters = TlsParameters::builder(config.host.clone())
                .dangerous_accept_invalid_certs(!config.tls_reject_unauthorized)
                .build()
                .map_err(|e| DeliveryError::Transport(e.to_string()))?;
            Tls::Wrapper(parameters)
        } else {
            Tls::None
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.host.as_str())
            .port(config.port)
            .tls(tls);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: parse_mailbox(&defaults.from)?,
            reply_to: defaults.reply_to.as_deref().map(parse_mailbox).transpose()?,
        })
    }

    /// Build the MIME message; attachment files are read here, at send time.
    pub async fn build_message(&self, message: &OutboundMessage) -> Result<Message, DeliveryError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(message.subject.clone());

        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(reply_to.clone());
        }

        for entry in message.to.addresses() {
            for mailbox in parse_mailboxes(entry)? {
                builder = builder.to(mailbox);
            }
        }

        let html = SinglePart::html(message.html.clone());

        let email = match &message.attachments {
            None => builder.singlepart(html),
            Some(attachments) => {
                let mut multipart = MultiPart::mixed().singlepart(html);
                for attachment in attachments {
                    tracing::debug!(filename = %attachment.filename, "Message attachment");

                    let body = tokio::fs::read(&attachment.path)
                        .await
                        .map_err(|source| DeliveryError::Attachment {
                            path: attachment.path.clone(),
                            source,
                        })?;
                    let content_type = ContentType::parse(&attachment.content_type)
                        .map_err(|_| DeliveryError::InvalidContentType(attachment.content_type.clone()))?;

                    multipart = multipart
                        .singlepart(Attachment::new(attachment.filename.clone()).body(body, content_type));
                }
                builder.multipart(multipart)
            }
        };

        email.map_err(|e| DeliveryError::Build(e.to_string()))
    }
}

#[async_trait]
impl DeliveryGateway for SmtpGateway {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DeliveryError> {
        let email = self.build_message(message).await?;

        let response = self
            .transport
            .send(email)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let text: Vec<&str> = response.message().collect();
        Ok(DeliveryReceipt::new(format!("{} {}", response.code(), text.join(" "))))
    }
}
