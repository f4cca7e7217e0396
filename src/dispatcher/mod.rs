//! Event to delivery orchestration.
//!
//! For every event published on [`EVENT_RECEIVED`](crate::router::EVENT_RECEIVED)
//! the [`DispatchOrchestrator`]:
//!
//! 1. derives the `type:spec` key and looks up the template
//! 2. resolves the body and attachment paths against the registry base path
//! 3. builds the render context from the payload
//! 4. renders the body
//! 5. hands the message to the delivery gateway
//!
//! # Failure handling
//!
//! | Situation | Result |
//! |-----------|--------|
//! | No template for the key | logged, `Ok(Unmatched)`, no send |
//! | Context or render failure | `Err(DispatchError)`, no send, event lost |
//! | Gateway failure | logged, `Ok(DeliveryFailed)` |
//!
//! Nothing is retried. The broker acknowledged the message on delivery, so
//! an aborted dispatch loses the event.

mod orchestrator;
mod stats;

pub use orchestrator::{DispatchError, DispatchOrchestrator, DispatchOutcome};
pub use stats::{DispatcherStats, DispatcherStatsSnapshot};
