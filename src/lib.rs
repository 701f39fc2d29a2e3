//! EOL metadata integrator
//!
//! Collects end-of-life data from vendor sources and delivers it to an AMQP
//! broker with publisher confirms, bounded retries and escalation of messages
//! that cannot be delivered.

pub mod config;
pub mod credentials;
pub mod error;
pub mod escalation;
pub mod publisher;
pub mod sources;

pub use config::Config;
pub use error::{AppError, Result};
pub use publisher::{DataCategory, DeliveryReport, DeliveryService};
