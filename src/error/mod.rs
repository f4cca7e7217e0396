use thiserror::Error;

use crate::consumer::ConsumerError;
use crate::delivery::DeliveryError;
use crate::telemetry::TelemetryError;
use crate::template::TemplateError;

/// Errors that stop the mailer from starting or running
#[derive(Error, Debug)]
pub enum MailerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Delivery setup error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Consumer error: {0}")]
    Consumer(#[from] ConsumerError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

pub type Result<T> = std::result::Result<T, MailerError>;
