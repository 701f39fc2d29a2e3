use crate::config::{EscalationConfig, EscalationMode};
use crate::error::{AppError, Result};
use crate::escalation::webhook::WebhookSink;
use crate::publisher::{MessageRecord, PublisherResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Receives messages that exhausted their retry budget
///
/// The publisher's responsibility ends once the batch is handed over.
#[async_trait]
pub trait UndeliverableSink: Send + Sync {
    async fn escalate(&self, records: Vec<MessageRecord>) -> PublisherResult<()>;
}

/// Sink that only logs undeliverable messages
#[derive(Debug, Clone, Default)]
pub struct LogSink;

#[async_trait]
impl UndeliverableSink for LogSink {
    async fn escalate(&self, records: Vec<MessageRecord>) -> PublisherResult<()> {
        for record in &records {
            warn!(
                request_id = %record.request_id,
                exchange = %record.exchange,
                routing_key = %record.routing_key,
                origin_service = %record.origin_service,
                retry_count = record.retry_count,
                enqueued_at = %record.enqueued_at,
                "Message undeliverable after retries"
            );
        }
        Ok(())
    }
}

/// Build the configured sink
pub fn create_sink(config: &EscalationConfig, service_name: &str) -> Result<Arc<dyn UndeliverableSink>> {
    match config.mode {
        EscalationMode::Log => Ok(Arc::new(LogSink)),
        EscalationMode::Webhook => {
            let url = config.webhook_url.as_ref().ok_or_else(|| {
                AppError::Configuration("Webhook escalation requires 'webhook_url'".to_string())
            })?;

            tracing::info!(url = %url, "Escalating undeliverable messages via webhook");
            Ok(Arc::new(WebhookSink::new(
                url.clone(),
                service_name.to_string(),
                config.webhook_timeout_secs,
            )?))
        }
    }
}
