//! Delivery facade used by producers

use crate::config::{Config, RoutingConfig};
use crate::credentials::CredentialStore;
use crate::error::Result;
use crate::escalation::{create_sink, UndeliverableSink};
use crate::publisher::amqp::AmqpConnector;
use crate::publisher::confirming::ConfirmingPublisher;
use crate::publisher::error::PublisherResult;
use crate::publisher::events::{DataCategory, EolEnvelope};
use crate::publisher::registry::RetryRegistry;
use crate::publisher::supervisor::{DeliveryReport, RetrySupervisor};
use crate::publisher::traits::BrokerConnector;
use std::sync::Arc;
use tracing::info;

/// Entry point for publishing scraped EOL data
///
/// Calls block (asynchronously) until every payload was acknowledged or
/// escalated.
pub struct DeliveryService {
    supervisor: RetrySupervisor,
    routing: RoutingConfig,
}

impl DeliveryService {
    pub fn new(supervisor: RetrySupervisor, routing: RoutingConfig) -> Self {
        Self {
            supervisor,
            routing,
        }
    }

    /// Wire the service from configuration using the AMQP broker
    pub fn from_config(config: &Config, credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        let connector: Arc<dyn BrokerConnector> =
            Arc::new(AmqpConnector::new(config.publisher.heartbeat_secs));
        let sink = create_sink(&config.escalation, &config.publisher.service_name)?;
        Ok(Self::with_connector(config, connector, credentials, sink))
    }

    /// Wire the service around an arbitrary broker connector and sink
    pub fn with_connector(
        config: &Config,
        connector: Arc<dyn BrokerConnector>,
        credentials: Arc<dyn CredentialStore>,
        sink: Arc<dyn UndeliverableSink>,
    ) -> Self {
        let registry = Arc::new(RetryRegistry::new());
        let publisher = ConfirmingPublisher::new(connector, credentials, registry, &config.publisher);
        let supervisor = RetrySupervisor::new(publisher, sink, &config.publisher);
        Self::new(supervisor, config.routing.clone())
    }

    pub fn supervisor(&self) -> &RetrySupervisor {
        &self.supervisor
    }

    pub fn registry(&self) -> &Arc<RetryRegistry> {
        self.supervisor.registry()
    }

    pub fn routing_key(&self, category: DataCategory) -> &str {
        match category {
            DataCategory::Software => &self.routing.software_routing_key,
            DataCategory::Hardware => &self.routing.hardware_routing_key,
        }
    }

    /// Publish pre-serialized payloads and wait for the registry to drain
    pub async fn publish_messages(
        &self,
        exchange: &str,
        routing_key: &str,
        payloads: &[Vec<u8>],
        request_id: &str,
    ) -> PublisherResult<DeliveryReport> {
        self.supervisor
            .publish_messages(exchange, routing_key, payloads, request_id)
            .await
    }

    /// Wrap scraped data in an envelope and publish it by category
    pub async fn publish_scraper_data(
        &self,
        data: serde_json::Value,
        category: DataCategory,
    ) -> PublisherResult<DeliveryReport> {
        let envelope = EolEnvelope::new(data);
        let payload = envelope.to_bytes()?;
        let exchange = self.routing.exchange.as_str();
        let routing_key = self.routing_key(category);

        info!(
            request_id = %envelope.request_id,
            exchange = exchange,
            routing_key = routing_key,
            "Publishing scraped data"
        );

        let report = self
            .publish_messages(exchange, routing_key, &[payload], &envelope.request_id)
            .await?;

        info!(
            request_id = %envelope.request_id,
            exchange = exchange,
            routing_key = routing_key,
            sweeps = report.sweeps,
            escalated = report.escalated.len(),
            "Published scraped data"
        );

        Ok(report)
    }

    pub async fn publish_software_data(&self, data: serde_json::Value) -> PublisherResult<DeliveryReport> {
        self.publish_scraper_data(data, DataCategory::Software).await
    }

    pub async fn publish_hardware_data(&self, data: serde_json::Value) -> PublisherResult<DeliveryReport> {
        self.publish_scraper_data(data, DataCategory::Hardware).await
    }
}
