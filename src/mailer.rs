//! Host object wiring registry, router, consumer and orchestrator.
//!
//! Every component is constructed here and handed its collaborators
//! explicitly. Templates are registered before the consumer is created,
//! so lookups never race with registration.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::broker::{create_broker_connector, BrokerConnector};
use crate::config::Settings;
use crate::consumer::EventsConsumer;
use crate::delivery::{create_delivery_gateway, DeliveryGateway};
use crate::dispatcher::{DispatchOrchestrator, DispatcherStatsSnapshot};
use crate::error::Result;
use crate::event::MailEvent;
use crate::render::{create_renderer, Renderer};
use crate::router::EventRouter;
use crate::template::{TemplateRegistry, TemplatesDefinition};

pub struct Mailer {
    settings: Arc<Settings>,
    registry: Arc<TemplateRegistry>,
    router: Arc<EventRouter<MailEvent>>,
    orchestrator: Arc<DispatchOrchestrator>,
    consumer: EventsConsumer,
}

impl Mailer {
    /// Build a mailer from explicit collaborators.
    ///
    /// Every registration is validated first; an invalid one fails the
    /// whole construction and nothing is registered.
    pub fn new(
        settings: Settings,
        definition: TemplatesDefinition,
        connector: Arc<dyn BrokerConnector>,
        renderer: Arc<dyn Renderer>,
        gateway: Arc<dyn DeliveryGateway>,
    ) -> Result<Self> {
        for registration in &definition.templates {
            registration.validate()?;
        }

        let registry = Arc::new(TemplateRegistry::from_definition(definition));
        tracing::info!(
            count = registry.len(),
            base_path = %registry.base_path().display(),
            "Templates registered"
        );

        let router = Arc::new(EventRouter::new());
        let orchestrator = Arc::new(DispatchOrchestrator::new(registry.clone(), renderer, gateway));
        orchestrator.subscribe_to(&router);

        let consumer = EventsConsumer::new(settings.broker.clone(), connector, router.clone());

        Ok(Self {
            settings: Arc::new(settings),
            registry,
            router,
            orchestrator,
            consumer,
        })
    }

    /// Build a mailer with the backends selected in `settings`
    pub fn from_settings(settings: Settings, definition: TemplatesDefinition) -> Result<Self> {
        let connector = create_broker_connector(&settings.broker);
        let renderer = create_renderer(&settings.templates.engine);
        let gateway = create_delivery_gateway(&settings.smtp, &settings.mail)?;

        Self::new(settings, definition, connector, renderer, gateway)
    }

    pub fn registry(&self) -> &Arc<TemplateRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<EventRouter<MailEvent>> {
        &self.router
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.orchestrator.stats()
    }

    /// Get a shutdown signal sender that stops consumption
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.consumer.shutdown_signal()
    }

    /// Consume until shutdown or end of stream, then wait for running dispatches.
    ///
    /// Broker setup failures are returned without retrying.
    pub async fn run(&self) -> Result<()> {
        tracing::info!(
            service = %self.settings.service.full_name(),
            queue = %self.settings.broker.queue,
            "Mailer starting"
        );

        let consumed = self.consumer.start_consuming().await;

        let in_flight = self.orchestrator.in_flight();
        if in_flight > 0 {
            tracing::info!(in_flight, "Waiting for in-flight dispatches");
        }
        self.orchestrator.wait_idle().await;

        let stats = self.stats();
        tracing::info!(
            received = stats.received,
            delivered = stats.delivered,
            delivery_failed = stats.delivery_failed,
            unmatched = stats.unmatched,
            aborted = stats.aborted,
            "Mailer stopped"
        );

        consumed.map_err(Into::into)
    }
}
