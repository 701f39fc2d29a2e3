//! Reliable, confirmation-driven publishing of EOL data
//!
//! Every message goes out over its own broker connection with publisher
//! confirms enabled. A rejected (or unconfirmed) message is parked in the
//! [`RetryRegistry`]; the [`RetrySupervisor`] then sweeps the registry on a
//! fixed interval, retrying each message up to `max_retries` times before
//! handing it to the escalation path.
//!
//! ```text
//! producer ──▶ DeliveryService ──▶ ConfirmingPublisher ──▶ broker
//!                   │                     │  nack / timeout
//!                   ▼                     ▼
//!            RetrySupervisor ◀──── RetryRegistry
//!                   │  retries exhausted
//!                   ▼
//!           UndeliverableSink
//! ```
//!
//! Attempts never overlap: the first attempts and every sweep run one message
//! at a time on the caller's task.
//!
//! # Example
//!
//! ```no_run
//! use eol_integrator::config::Config;
//! use eol_integrator::credentials::InMemoryCredentialStore;
//! use eol_integrator::publisher::DeliveryService;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let credentials = Arc::new(InMemoryCredentialStore::with_rabbit("localhost", 5672, "guest", "guest"));
//!     let service = DeliveryService::from_config(&config, credentials)?;
//!
//!     let report = service
//!         .publish_software_data(serde_json::json!([{"originalName": "7-Zip"}]))
//!         .await?;
//!     assert!(report.is_fully_delivered());
//!     Ok(())
//! }
//! ```

mod amqp;
mod confirming;
mod error;
mod events;
mod metrics;
mod registry;
mod service;
mod supervisor;
mod traits;

pub use amqp::{AmqpConnector, AmqpSession};
pub use confirming::{AttemptOutcome, ConfirmingPublisher};
pub use error::{PublisherError, PublisherResult};
pub use events::{DataCategory, EolEnvelope};
pub use metrics::{init_publisher_metrics, render_metrics, PUBLISHER_METRICS};
pub use registry::{MessageRecord, RetryRegistry};
pub use service::DeliveryService;
pub use supervisor::{DeliveryReport, RetrySupervisor, SweepReport};
pub use traits::{BrokerConnector, BrokerSession, Confirmation, PendingConfirmation};
