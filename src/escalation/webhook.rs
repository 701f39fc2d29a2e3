use crate::error::{AppError, Result};
use crate::escalation::sink::UndeliverableSink;
use crate::publisher::{MessageRecord, PublisherError, PublisherResult};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

/// Posts undeliverable batches to an HTTP endpoint
#[derive(Clone)]
pub struct WebhookSink {
    pub(crate) client: Client,
    pub(crate) url: String,
    pub(crate) service_name: String,
}

#[derive(Debug, Serialize)]
struct EscalationPayload {
    service: String,
    escalated_at: String,
    messages: Vec<UndeliverableMessage>,
}

#[derive(Debug, Serialize)]
struct UndeliverableMessage {
    request_id: String,
    exchange: String,
    routing_key: String,
    origin_service: String,
    retry_count: u32,
    enqueued_at: String,
    payload: serde_json::Value,
}

impl From<&MessageRecord> for UndeliverableMessage {
    fn from(record: &MessageRecord) -> Self {
        // JSON bodies are forwarded as-is, anything else as a lossy string
        let payload = serde_json::from_slice(&record.payload).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&record.payload).into_owned())
        });

        Self {
            request_id: record.request_id.clone(),
            exchange: record.exchange.clone(),
            routing_key: record.routing_key.clone(),
            origin_service: record.origin_service.clone(),
            retry_count: record.retry_count,
            enqueued_at: record.enqueued_at.to_rfc3339(),
            payload,
        }
    }
}

impl WebhookSink {
    /// Create a new webhook sink
    pub fn new(url: String, service_name: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url,
            service_name,
        })
    }

    fn build_payload(&self, records: &[MessageRecord]) -> EscalationPayload {
        EscalationPayload {
            service: self.service_name.clone(),
            escalated_at: Utc::now().to_rfc3339(),
            messages: records.iter().map(UndeliverableMessage::from).collect(),
        }
    }
}

#[async_trait]
impl UndeliverableSink for WebhookSink {
    async fn escalate(&self, records: Vec<MessageRecord>) -> PublisherResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let payload = self.build_payload(&records);
        let result = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(response) => {
                info!(
                    url = %self.url,
                    status = response.status().as_u16(),
                    messages = records.len(),
                    "Undeliverable messages escalated"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    url = %self.url,
                    messages = records.len(),
                    error = %e,
                    "Failed to escalate undeliverable messages"
                );
                Err(PublisherError::Escalation(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(request_id: &str, payload: &[u8]) -> MessageRecord {
        MessageRecord {
            request_id: request_id.to_string(),
            payload: payload.to_vec(),
            exchange: "exchange".to_string(),
            routing_key: "routing.key".to_string(),
            origin_service: "Scraper-Service".to_string(),
            retry_count: 5,
            enqueued_at: Utc::now(),
        }
    }

    #[test]
    fn test_payload_keeps_json_bodies() {
        let sink = WebhookSink::new("http://localhost".to_string(), "svc".to_string(), 5).unwrap();
        let payload = sink.build_payload(&[
            record("r1", br#"{"requestId":"r1"}"#),
            record("r2", b"not json"),
        ]);

        assert_eq!(payload.messages.len(), 2);
        assert_eq!(payload.messages[0].payload["requestId"], "r1");
        assert_eq!(payload.messages[1].payload, serde_json::json!("not json"));
    }

    #[tokio::test]
    async fn test_escalate_posts_batch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/undeliverable")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "service": "Scraper-Service",
                "messages": [{"request_id": "r1", "retry_count": 5}]
            })))
            .with_status(202)
            .create_async()
            .await;

        let sink = WebhookSink::new(
            format!("{}/undeliverable", server.url()),
            "Scraper-Service".to_string(),
            5,
        )
        .unwrap();

        sink.escalate(vec![record("r1", br#"{"requestId":"r1"}"#)])
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_escalate_reports_http_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/undeliverable")
            .with_status(500)
            .create_async()
            .await;

        let sink = WebhookSink::new(
            format!("{}/undeliverable", server.url()),
            "Scraper-Service".to_string(),
            5,
        )
        .unwrap();

        let result = sink.escalate(vec![record("r1", b"{}")]).await;
        assert!(matches!(result, Err(PublisherError::Escalation(_))));
    }
}
