use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::delivery::{DeliveryGateway, DeliveryReceipt, OutboundMessage};
use crate::event::MailEvent;
use crate::render::{RenderError, Renderer};
use crate::router::{EventRouter, EVENT_RECEIVED};
use crate::template::{ContextError, TemplateDescriptor, TemplateRegistry};

use super::stats::{DispatcherStats, DispatcherStatsSnapshot};

/// Errors that abort a dispatch before anything is sent
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Render context for \"{key}\" could not be built: {source}")]
    Context {
        key: String,
        #[source]
        source: ContextError,
    },

    #[error("Rendering \"{key}\" failed: {source}")]
    Render {
        key: String,
        #[source]
        source: RenderError,
    },
}

/// How a dispatch ended when it was not aborted
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// No template registered for the key
    Unmatched { key: String },
    Delivered { key: String, receipt: DeliveryReceipt },
    DeliveryFailed { key: String, reason: String },
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

struct InFlightGuard(Arc<InFlight>);

impl InFlightGuard {
    fn enter(in_flight: &Arc<InFlight>) -> Self {
        in_flight.count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(in_flight))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Turns one event into zero or one delivery attempt
pub struct DispatchOrchestrator {
    registry: Arc<TemplateRegistry>,
    renderer: Arc<dyn Renderer>,
    gateway: Arc<dyn DeliveryGateway>,
    stats: DispatcherStats,
    in_flight: Arc<InFlight>,
}

impl DispatchOrchestrator {
    pub fn new(
        registry: Arc<TemplateRegistry>,
        renderer: Arc<dyn Renderer>,
        gateway: Arc<dyn DeliveryGateway>,
    ) -> Self {
        Self {
            registry,
            renderer,
            gateway,
            stats: DispatcherStats::default(),
            in_flight: Arc::default(),
        }
    }

    /// Get dispatcher statistics
    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of spawned dispatches still running
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Handle every event published on `event-received`.
    ///
    /// Each event is dispatched on its own task, so the publisher returns as
    /// soon as the task is spawned and dispatches may complete out of order.
    pub fn subscribe_to(self: &Arc<Self>, router: &EventRouter<MailEvent>) {
        let orchestrator = Arc::clone(self);
        router.subscribe(EVENT_RECEIVED, move |event: &MailEvent| {
            orchestrator.spawn_dispatch(event.clone());
        });
        tracing::info!(topic = EVENT_RECEIVED, "Dispatch orchestrator subscribed");
    }

    fn spawn_dispatch(self: &Arc<Self>, event: MailEvent) {
        let guard = InFlightGuard::enter(&self.in_flight);
        let orchestrator = Arc::clone(self);

        tokio::spawn(async move {
            let _guard = guard;
            // Deliberately unhandled beyond logging: the broker acknowledged
            // the message on delivery, so the event is lost and never retried.
            if let Err(e) = orchestrator.dispatch(event).await {
                tracing::error!(error = %e, "Dispatch aborted, event lost");
            }
        });
    }

    /// Wait until no spawned dispatch is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Run the full resolve, render, deliver sequence for one event
    #[tracing::instrument(
        name = "dispatcher.dispatch",
        skip(self, event),
        fields(dispatch_id = %Uuid::new_v4(), key = %event.lookup_key())
    )]
    pub async fn dispatch(&self, event: MailEvent) -> Result<DispatchOutcome, DispatchError> {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(event = ?event, "Dispatching event");

        let key = event.lookup_key();
        let descriptor = match self.registry.lookup(&key) {
            Some(descriptor) => descriptor,
            None => {
                self.stats.unmatched.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    key = %key,
                    mailto = %event.mailto,
                    "No template found, no mail has been sent"
                );
                return Ok(DispatchOutcome::Unmatched { key });
            }
        };

        let message = match self.compose(&descriptor, event).await {
            Ok(message) => message,
            Err(e) => {
                self.stats.aborted.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        tracing::info!(to = %message.to, "Sending email");

        match self.gateway.send(&message).await {
            Ok(receipt) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                tracing::info!(to = %message.to, response = %receipt.response, "Email sent successfully");
                Ok(DispatchOutcome::Delivered { key, receipt })
            }
            Err(e) => {
                self.stats.delivery_failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(to = %message.to, error = %e, "Error sending email");
                Ok(DispatchOutcome::DeliveryFailed {
                    key,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Build the outbound message for a matched event.
    ///
    /// Paths are resolved into fresh values; the registered descriptor is never modified.
    pub async fn compose(
        &self,
        descriptor: &TemplateDescriptor,
        event: MailEvent,
    ) -> Result<OutboundMessage, DispatchError> {
        let body_path = self.registry.resolve(&descriptor.body_template);
        let attachments = descriptor
            .attachments
            .iter()
            .map(|attachment| attachment.resolve(self.registry.base_path()))
            .collect();

        let context = descriptor
            .context_builder
            .build(&event.payload)
            .map_err(|source| DispatchError::Context {
                key: descriptor.key.clone(),
                source,
            })?;

        let html = self
            .renderer
            .render(&body_path, &context)
            .await
            .map_err(|source| DispatchError::Render {
                key: descriptor.key.clone(),
                source,
            })?;
        tracing::debug!(body = %html, "Email message body");

        Ok(OutboundMessage::new(
            event.mailto,
            descriptor.subject.clone(),
            html,
            attachments,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Barrier;

    use super::*;
    use crate::delivery::MemoryGateway;
    use crate::render::PlaceholderRenderer;
    use crate::template::{require_str, AttachmentSpec, ContextBuilder};

    struct Fixture {
        _dir: tempfile::TempDir,
        base: PathBuf,
        registry: Arc<TemplateRegistry>,
        gateway: MemoryGateway,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_gateway(MemoryGateway::new())
        }

        fn with_gateway(gateway: MemoryGateway) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let base = dir.path().to_path_buf();
            std::fs::write(base.join("new-user.txt"), "{{username}}|{{name}}").unwrap();
            Self {
                _dir: dir,
                registry: Arc::new(TemplateRegistry::new(&base)),
                base,
                gateway,
            }
        }

        fn register_new_user(&self, attachments: Vec<AttachmentSpec>) {
            self.registry.register(
                "NewUser:NormalUser",
                TemplateDescriptor {
                    key: String::new(),
                    subject: "User registration".to_string(),
                    body_template: PathBuf::from("new-user.txt"),
                    attachments,
                    context_builder: ContextBuilder::function(|p| {
                        Ok(json!({
                            "username": require_str(p, "username")?,
                            "name": format!("{} {}", require_str(p, "name")?, require_str(p, "surname")?),
                        }))
                    }),
                },
            );
        }

        fn orchestrator(&self) -> Arc<DispatchOrchestrator> {
            Arc::new(DispatchOrchestrator::new(
                self.registry.clone(),
                Arc::new(PlaceholderRenderer),
                Arc::new(self.gateway.clone()),
            ))
        }
    }

    fn new_user_event() -> MailEvent {
        serde_json::from_value(json!({
            "type": "NewUser",
            "spec": "NormalUser",
            "mailto": "a@b.com",
            "payload": {"username": "joe", "name": "Joe", "surname": "Doe"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_delivers_rendered_message() {
        let fixture = Fixture::new();
        fixture.register_new_user(vec![AttachmentSpec::new(
            "Privacy.pdf",
            "attachments/Privacy.pdf",
            "application/pdf",
        )]);
        let orchestrator = fixture.orchestrator();

        let outcome = orchestrator.dispatch(new_user_event()).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Delivered { ref key, .. } if key == "NewUser:NormalUser"));

        let sent = fixture.gateway.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to.to_string(), "a@b.com");
        assert_eq!(sent[0].subject, "User registration");
        assert_eq!(sent[0].html, "joe|Joe Doe");

        let attachments = sent[0].attachments.as_ref().unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].path, fixture.base.join("attachments/Privacy.pdf"));
        assert!(attachments[0].path.ends_with("attachments/Privacy.pdf"));

        assert_eq!(orchestrator.stats().delivered, 1);
    }

    #[tokio::test]
    async fn test_unmatched_event_is_dropped_without_error() {
        let fixture = Fixture::new();
        fixture.register_new_user(vec![]);
        let orchestrator = fixture.orchestrator();

        let event: MailEvent = serde_json::from_value(json!({
            "type": "Unknown", "spec": "Nothing", "mailto": "x@y.com"
        }))
        .unwrap();

        let outcome = orchestrator.dispatch(event).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Unmatched { ref key } if key == "Unknown:Nothing"));
        assert_eq!(fixture.gateway.send_count(), 0);
        assert_eq!(orchestrator.stats().unmatched, 1);
    }

    #[tokio::test]
    async fn test_no_attachments_field_when_template_has_none() {
        let fixture = Fixture::new();
        fixture.register_new_user(vec![]);

        fixture.orchestrator().dispatch(new_user_event()).await.unwrap();

        let sent = fixture.gateway.messages();
        assert!(sent[0].attachments.is_none());
    }

    #[tokio::test]
    async fn test_repeated_dispatch_does_not_compound_paths() {
        let fixture = Fixture::new();
        fixture.register_new_user(vec![AttachmentSpec::new("x.pdf", "attachments/x.pdf", "application/pdf")]);
        let orchestrator = fixture.orchestrator();

        orchestrator.dispatch(new_user_event()).await.unwrap();
        orchestrator.dispatch(new_user_event()).await.unwrap();

        let sent = fixture.gateway.messages();
        let first = &sent[0].attachments.as_ref().unwrap()[0].path;
        let second = &sent[1].attachments.as_ref().unwrap()[0].path;
        assert_eq!(first, second);

        let registered = fixture.registry.lookup("NewUser:NormalUser").unwrap();
        assert_eq!(registered.attachments[0].path, Path::new("attachments/x.pdf"));
    }

    // Known gap: a context failure aborts the dispatch. The message was
    // already acknowledged by the broker, so nothing sends or retries it.
    #[tokio::test]
    async fn test_context_failure_loses_event() {
        let fixture = Fixture::new();
        fixture.register_new_user(vec![]);
        let orchestrator = fixture.orchestrator();

        let event: MailEvent = serde_json::from_value(json!({
            "type": "NewUser", "spec": "NormalUser", "mailto": "a@b.com", "payload": {"username": "joe"}
        }))
        .unwrap();

        let err = orchestrator.dispatch(event).await.unwrap_err();
        assert!(matches!(err, DispatchError::Context { .. }));
        assert_eq!(fixture.gateway.send_count(), 0);
        assert_eq!(orchestrator.stats().aborted, 1);
    }

    #[tokio::test]
    async fn test_render_failure_loses_event() {
        let fixture = Fixture::new();
        fixture.registry.register(
            "Broken:Template",
            TemplateDescriptor {
                key: String::new(),
                subject: "Broken".to_string(),
                body_template: PathBuf::from("missing.txt"),
                attachments: vec![],
                context_builder: ContextBuilder::Passthrough,
            },
        );
        let orchestrator = fixture.orchestrator();

        let event: MailEvent = serde_json::from_value(json!({
            "type": "Broken", "spec": "Template", "mailto": "a@b.com", "payload": {}
        }))
        .unwrap();

        let err = orchestrator.dispatch(event).await.unwrap_err();
        assert!(matches!(err, DispatchError::Render { .. }));
        assert_eq!(fixture.gateway.send_count(), 0);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_absorbed() {
        let fixture = Fixture::with_gateway(MemoryGateway::failing("550 mailbox unavailable"));
        fixture.register_new_user(vec![]);
        let orchestrator = fixture.orchestrator();

        let outcome = orchestrator.dispatch(new_user_event()).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::DeliveryFailed { ref reason, .. } if reason.contains("550")));
        assert_eq!(fixture.gateway.send_count(), 1);

        let stats = orchestrator.stats();
        assert_eq!(stats.delivery_failed, 1);
        assert_eq!(stats.delivered, 0);
    }

    #[tokio::test]
    async fn test_router_publish_spawns_dispatch() {
        let fixture = Fixture::new();
        fixture.register_new_user(vec![]);
        let orchestrator = fixture.orchestrator();
        let router = EventRouter::new();
        orchestrator.subscribe_to(&router);

        assert_eq!(router.publish(EVENT_RECEIVED, &new_user_event()), 1);
        orchestrator.wait_idle().await;

        assert_eq!(fixture.gateway.send_count(), 1);
        assert_eq!(orchestrator.in_flight(), 0);
    }

    /// Holds every render until `parties` renders are waiting at once
    struct RendezvousRenderer {
        barrier: Barrier,
    }

    #[async_trait]
    impl Renderer for RendezvousRenderer {
        async fn render(&self, _template: &Path, _context: &serde_json::Value) -> Result<String, RenderError> {
            self.barrier.wait().await;
            Ok("body".to_string())
        }
    }

    #[tokio::test]
    async fn test_dispatches_for_same_key_run_concurrently() {
        let fixture = Fixture::new();
        fixture.register_new_user(vec![]);
        let orchestrator = Arc::new(DispatchOrchestrator::new(
            fixture.registry.clone(),
            Arc::new(RendezvousRenderer {
                barrier: Barrier::new(2),
            }),
            Arc::new(fixture.gateway.clone()),
        ));
        let router = EventRouter::new();
        orchestrator.subscribe_to(&router);

        router.publish(EVENT_RECEIVED, &new_user_event());
        router.publish(EVENT_RECEIVED, &new_user_event());

        // Serialized dispatch would never get both renders past the barrier
        tokio::time::timeout(Duration::from_secs(5), orchestrator.wait_idle())
            .await
            .expect("dispatches should overlap");
        assert_eq!(fixture.gateway.send_count(), 2);
    }
}
