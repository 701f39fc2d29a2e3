//! Retry supervisor: publish once, then sweep the registry until it drains

use crate::config::PublisherConfig;
use crate::escalation::UndeliverableSink;
use crate::publisher::confirming::{AttemptOutcome, ConfirmingPublisher};
use crate::publisher::error::{PublisherError, PublisherResult};
use crate::publisher::metrics::PUBLISHER_METRICS;
use crate::publisher::registry::{MessageRecord, RetryRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// What one sweep did
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Request ids re-published in this sweep, in order
    pub retried: Vec<String>,
    /// Records removed because a retry was acknowledged
    pub delivered: Vec<MessageRecord>,
    /// Records removed and handed to the escalation path
    pub escalated: Vec<MessageRecord>,
}

/// Result of a full publish-and-drain cycle
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub request_id: String,
    /// Outcome of each first attempt, in payload order
    pub initial_outcomes: Vec<AttemptOutcome>,
    /// Number of sweeps run before the registry drained
    pub sweeps: u32,
    /// Messages that exhausted their retry budget
    pub escalated: Vec<MessageRecord>,
}

impl DeliveryReport {
    pub fn is_fully_delivered(&self) -> bool {
        self.escalated.is_empty()
    }
}

/// Drives bounded retries over the registry on a fixed interval
pub struct RetrySupervisor {
    publisher: ConfirmingPublisher,
    sink: Arc<dyn UndeliverableSink>,
    max_retries: u32,
    retry_interval: Duration,
}

impl RetrySupervisor {
    pub fn new(
        publisher: ConfirmingPublisher,
        sink: Arc<dyn UndeliverableSink>,
        config: &PublisherConfig,
    ) -> Self {
        Self {
            publisher,
            sink,
            max_retries: config.max_retries,
            retry_interval: config.retry_interval(),
        }
    }

    /// Override the sweep interval
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn registry(&self) -> &Arc<RetryRegistry> {
        self.publisher.registry()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Publish every payload once, then retry until the registry is empty
    pub async fn publish_messages(
        &self,
        exchange: &str,
        routing_key: &str,
        payloads: &[Vec<u8>],
        request_id: &str,
    ) -> PublisherResult<DeliveryReport> {
        let mut initial_outcomes = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let outcome = self
                .publisher
                .publish(exchange, routing_key, payload, request_id, false)
                .await?;
            initial_outcomes.push(outcome);
        }
        self.update_registry_gauge();

        let (sweeps, escalated) = self.drain().await?;

        Ok(DeliveryReport {
            request_id: request_id.to_string(),
            initial_outcomes,
            sweeps,
            escalated,
        })
    }

    /// Sleep, sweep, repeat until the registry is empty
    ///
    /// Returns the number of sweeps run and every escalated record.
    pub async fn drain(&self) -> PublisherResult<(u32, Vec<MessageRecord>)> {
        let mut sweeps = 0;
        let mut escalated = Vec::new();

        while !self.registry().is_empty() {
            tokio::time::sleep(self.retry_interval).await;
            let report = self.sweep().await?;
            sweeps += 1;
            escalated.extend(report.escalated);
        }

        Ok((sweeps, escalated))
    }

    /// One pass over the registry
    pub async fn sweep(&self) -> PublisherResult<SweepReport> {
        let registry = self.registry();
        let mut report = SweepReport::default();
        let mut undeliverable = Vec::new();

        let mut failure: Option<PublisherError> = None;

        for record in registry.snapshot() {
            if registry.is_marked_for_removal(&record.request_id) {
                continue;
            }

            if record.retry_count >= self.max_retries {
                undeliverable.push(record.request_id);
                continue;
            }

            // A failed retry halts further publishing for this sweep only
            if failure.is_some() {
                continue;
            }

            let retry_count = registry
                .increment_retries(&record.request_id)
                .unwrap_or(record.retry_count + 1);

            info!(
                request_id = %record.request_id,
                exchange = %record.exchange,
                routing_key = %record.routing_key,
                retry_count = retry_count,
                "Retrying failed message"
            );
            PUBLISHER_METRICS
                .retries
                .with_label_values(&[&record.routing_key])
                .inc();

            match self
                .publisher
                .publish(
                    &record.exchange,
                    &record.routing_key,
                    &record.payload,
                    &record.request_id,
                    true,
                )
                .await
            {
                Ok(_) => report.retried.push(record.request_id),
                Err(e) => {
                    error!(
                        request_id = %record.request_id,
                        error = %e,
                        "Retry failed, halting sweep"
                    );
                    failure = Some(e);
                }
            }
        }

        report.delivered = registry.flush_removals();

        if !undeliverable.is_empty() {
            warn!(
                request_ids = ?undeliverable,
                "Retries exhausted, escalating undeliverable messages"
            );

            report.escalated = undeliverable
                .iter()
                .filter_map(|request_id| registry.remove(request_id))
                .collect();

            for record in &report.escalated {
                PUBLISHER_METRICS
                    .escalations
                    .with_label_values(&[&record.routing_key])
                    .inc();
            }

            if let Err(e) = self.sink.escalate(report.escalated.clone()).await {
                error!(error = %e, "Escalation path rejected undeliverable batch");
            }
        }

        self.update_registry_gauge();
        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    fn update_registry_gauge(&self) {
        PUBLISHER_METRICS
            .registry_size
            .set(self.registry().len() as f64);
    }
}
