//! Event driven e-mail dispatcher.
//!
//! Events consumed from a broker queue are matched against registered
//! templates by `type:spec`, rendered and handed to a delivery gateway.

// Shared infrastructure
pub mod config;
pub mod error;
pub mod telemetry;

// Domain
pub mod event;
pub mod router;
pub mod template;

// Pipeline
pub mod broker;
pub mod consumer;
pub mod delivery;
pub mod dispatcher;
pub mod render;

pub mod mailer;

pub use error::{MailerError, Result};
pub use mailer::Mailer;
