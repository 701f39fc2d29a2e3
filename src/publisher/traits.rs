//! Broker abstractions used by the confirming publisher

use crate::credentials::RabbitCredentials;
use crate::publisher::error::PublisherResult;
use async_trait::async_trait;
use futures::future::BoxFuture;
use strum::Display;

/// Broker verdict on a single published message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Confirmation {
    Ack,
    Nack,
}

/// Resolves once the broker sends the confirmation frame for one publish
pub type PendingConfirmation = BoxFuture<'static, PublisherResult<Confirmation>>;

/// Opens broker connections
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Open a new connection with the given credentials
    async fn connect(&self, credentials: &RabbitCredentials) -> PublisherResult<Box<dyn BrokerSession>>;
}

/// One open broker connection
#[async_trait]
pub trait BrokerSession: Send {
    /// Open a channel and switch it to publisher-confirm mode
    async fn open_confirm_channel(&mut self) -> PublisherResult<()>;

    /// Publish one body; the returned future yields its confirmation
    async fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> PublisherResult<PendingConfirmation>;

    /// Close the connection
    async fn close(&mut self) -> PublisherResult<()>;
}
