//! AMQP 0-9-1 broker implementation backed by lapin

use crate::credentials::RabbitCredentials;
use crate::publisher::error::{PublisherError, PublisherResult};
use crate::publisher::traits::{BrokerConnector, BrokerSession, Confirmation, PendingConfirmation};
use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::publisher_confirm::Confirmation as AmqpConfirmation;
use lapin::uri::{AMQPAuthority, AMQPQueryString, AMQPUri, AMQPUserInfo};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Connector opening one lapin connection per publish attempt
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    heartbeat_secs: u16,
}

impl AmqpConnector {
    pub fn new(heartbeat_secs: u16) -> Self {
        Self { heartbeat_secs }
    }

    fn uri(&self, credentials: &RabbitCredentials) -> AMQPUri {
        AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: credentials.user.clone(),
                    password: credentials.password.clone(),
                },
                host: credentials.host.clone(),
                port: credentials.port,
            },
            query: AMQPQueryString {
                heartbeat: Some(self.heartbeat_secs),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(&self, credentials: &RabbitCredentials) -> PublisherResult<Box<dyn BrokerSession>> {
        let connection = Connection::connect_uri(self.uri(credentials), ConnectionProperties::default())
            .await
            .map_err(|e| {
                PublisherError::ConnectionFailed(format!(
                    "AMQP connection to {}:{} failed: {}",
                    credentials.host, credentials.port, e
                ))
            })?;

        Ok(Box::new(AmqpSession {
            connection,
            channel: None,
        }))
    }
}

/// One lapin connection plus its confirm-mode channel
pub struct AmqpSession {
    connection: Connection,
    channel: Option<Channel>,
}

#[async_trait]
impl BrokerSession for AmqpSession {
    async fn open_confirm_channel(&mut self) -> PublisherResult<()> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| PublisherError::ChannelFailed(format!("AMQP channel open failed: {}", e)))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| PublisherError::ChannelFailed(format!("AMQP confirm.select failed: {}", e)))?;

        self.channel = Some(channel);
        Ok(())
    }

    async fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> PublisherResult<PendingConfirmation> {
        let channel = self
            .channel
            .as_ref()
            .ok_or_else(|| PublisherError::ChannelFailed("No open channel".to_string()))?;

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(PERSISTENT_DELIVERY_MODE);

        let confirm = channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| PublisherError::PublishFailed(format!("AMQP basic.publish failed: {}", e)))?;

        Ok(Box::pin(async move {
            match confirm.await {
                Ok(AmqpConfirmation::Ack(_)) => Ok(Confirmation::Ack),
                Ok(AmqpConfirmation::Nack(_)) => Ok(Confirmation::Nack),
                Ok(AmqpConfirmation::NotRequested) => Err(PublisherError::ConfirmationFailed(
                    "Channel is not in confirm mode".to_string(),
                )),
                Err(e) => Err(PublisherError::ConfirmationFailed(e.to_string())),
            }
        }))
    }

    async fn close(&mut self) -> PublisherResult<()> {
        self.channel = None;
        self.connection
            .close(200, "OK")
            .await
            .map_err(|e| PublisherError::ConnectionFailed(format!("AMQP close failed: {}", e)))
    }
}
