//! Hand-off of permanently undeliverable messages

pub mod sink;
pub mod webhook;

pub use sink::{create_sink, LogSink, UndeliverableSink};
pub use webhook::WebhookSink;
