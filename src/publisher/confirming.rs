//! Confirmation-driven publisher: one connection, one message, one confirmation

use crate::config::{ConnectionFailurePolicy, PublisherConfig};
use crate::credentials::{CredentialStore, RabbitCredentials};
use crate::publisher::error::{PublisherError, PublisherResult};
use crate::publisher::metrics::PUBLISHER_METRICS;
use crate::publisher::registry::RetryRegistry;
use crate::publisher::traits::{BrokerConnector, BrokerSession, Confirmation};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum::Display;
use tracing::{debug, error, warn};

/// How a single publish attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AttemptOutcome {
    /// Broker acknowledged the message
    Acked,
    /// Broker rejected the message; it is now in the registry
    Rejected,
    /// No confirmation within the timeout; registered like a rejection
    TimedOut,
    /// Connection or channel could not be opened
    Unreachable,
}

/// Publishes one message per call and records rejections for retry
pub struct ConfirmingPublisher {
    connector: Arc<dyn BrokerConnector>,
    credentials: Arc<dyn CredentialStore>,
    registry: Arc<RetryRegistry>,
    service_name: String,
    confirm_timeout: Duration,
    connection_failure_policy: ConnectionFailurePolicy,
}

impl ConfirmingPublisher {
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        credentials: Arc<dyn CredentialStore>,
        registry: Arc<RetryRegistry>,
        config: &PublisherConfig,
    ) -> Self {
        Self {
            connector,
            credentials,
            registry,
            service_name: config.service_name.clone(),
            confirm_timeout: config.confirm_timeout(),
            connection_failure_policy: config.connection_failure_policy,
        }
    }

    pub fn registry(&self) -> &Arc<RetryRegistry> {
        &self.registry
    }

    /// Publish `payload` and wait for the broker's verdict
    ///
    /// A rejection or confirmation timeout is recorded in the registry and
    /// reported as an outcome, never as an error. Errors are limited to missing
    /// credentials (before any connection is made) and transport failures of
    /// the publish call itself. The connection is closed on every path.
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        request_id: &str,
        is_retry: bool,
    ) -> PublisherResult<AttemptOutcome> {
        let credentials = RabbitCredentials::load(self.credentials.as_ref()).await?;

        let result = match self.connector.connect(&credentials).await {
            Ok(mut session) => {
                let result = self
                    .deliver(session.as_mut(), exchange, routing_key, payload, request_id, is_retry)
                    .await;

                if let Err(e) = session.close().await {
                    warn!(request_id = request_id, error = %e, "Failed to close broker connection");
                }
                result
            }
            Err(e) => Ok(self.handle_unreachable(exchange, routing_key, payload, request_id, &e)),
        };

        let outcome_label = match &result {
            Ok(outcome) => outcome.to_string(),
            Err(_) => "error".to_string(),
        };
        PUBLISHER_METRICS
            .attempts
            .with_label_values(&[routing_key, &outcome_label])
            .inc();

        result
    }

    async fn deliver(
        &self,
        session: &mut dyn BrokerSession,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        request_id: &str,
        is_retry: bool,
    ) -> PublisherResult<AttemptOutcome> {
        if let Err(e) = session.open_confirm_channel().await {
            return Ok(self.handle_unreachable(exchange, routing_key, payload, request_id, &e));
        }

        let started = Instant::now();
        let pending = session
            .publish(exchange, routing_key, payload)
            .await
            .map_err(|e| {
                error!(
                    request_id = request_id,
                    exchange = exchange,
                    routing_key = routing_key,
                    error = %e,
                    "Error while publishing"
                );
                e
            })?;

        let outcome = match tokio::time::timeout(self.confirm_timeout, pending).await {
            Ok(Ok(Confirmation::Ack)) => {
                if is_retry {
                    self.registry.mark_for_removal(request_id);
                }
                debug!(request_id = request_id, is_retry = is_retry, "Publish acknowledged");
                AttemptOutcome::Acked
            }
            Ok(Ok(Confirmation::Nack)) => {
                self.register_failure(exchange, routing_key, payload, request_id);
                error!(
                    request_id = request_id,
                    exchange = exchange,
                    routing_key = routing_key,
                    "Failed to publish: broker rejected message"
                );
                AttemptOutcome::Rejected
            }
            Ok(Err(e)) => {
                self.register_failure(exchange, routing_key, payload, request_id);
                error!(
                    request_id = request_id,
                    exchange = exchange,
                    routing_key = routing_key,
                    error = %e,
                    "Failed to publish: confirmation lost"
                );
                AttemptOutcome::Rejected
            }
            Err(_) => {
                self.register_failure(exchange, routing_key, payload, request_id);
                error!(
                    request_id = request_id,
                    exchange = exchange,
                    routing_key = routing_key,
                    timeout_secs = self.confirm_timeout.as_secs_f64(),
                    "Failed to publish: no confirmation before timeout"
                );
                AttemptOutcome::TimedOut
            }
        };

        PUBLISHER_METRICS
            .confirm_latency
            .with_label_values(&[routing_key])
            .observe(started.elapsed().as_secs_f64());

        Ok(outcome)
    }

    /// Upsert the failure record, keeping any retry count already accrued
    fn register_failure(&self, exchange: &str, routing_key: &str, payload: &[u8], request_id: &str) {
        self.registry
            .record_failure(request_id, payload, exchange, routing_key, &self.service_name);
    }

    fn handle_unreachable(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        request_id: &str,
        err: &PublisherError,
    ) -> AttemptOutcome {
        error!(
            request_id = request_id,
            error = %err,
            "Unable to publish: broken or uninitialized broker connection"
        );

        if self.connection_failure_policy == ConnectionFailurePolicy::Retry {
            self.register_failure(exchange, routing_key, payload, request_id);
        }

        AttemptOutcome::Unreachable
    }
}
