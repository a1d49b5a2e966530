use lapin::options::ConfirmSelectOptions;
use lapin::{Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::{debug, info};

use crate::amqp::channel::{BrokerChannel, LapinChannel};
use crate::amqp::routing_key::{RoutingKeyStrategy, EMPTY_ROUTING_KEY};
use crate::config::{Config, RabbitMqConfig};
use crate::{Error, Result};

/// The process-wide broker connection and its single confirm-mode channel.
pub struct AmqpConnection {
    connection: Connection,
    channel: Arc<LapinChannel>,
}

impl AmqpConnection {
    /// Connects, opens a channel with publisher confirms enabled and, when the
    /// routing key is known up front, declares its queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when the broker does not answer within
    /// `connection_timeout_ms`, and [`Error::Amqp`] for any protocol failure
    /// while connecting, enabling confirms or declaring the queue.
    pub async fn connect(config: &Config, strategy: &RoutingKeyStrategy) -> Result<Self> {
        let rabbitmq = &config.rabbitmq;
        info!(
            host = %rabbitmq.connection.host,
            port = rabbitmq.connection.port,
            "Using connection to RabbitMQ"
        );

        let connection = tokio::time::timeout(
            rabbitmq.connection_timeout(),
            Connection::connect_uri(config.amqp_uri(), ConnectionProperties::default()),
        )
        .await
        .map_err(|_| {
            Error::Connection(format!(
                "Timed out after {}ms connecting to {}:{}",
                rabbitmq.connection.connection_timeout_ms,
                rabbitmq.connection.host,
                rabbitmq.connection.port
            ))
        })??;

        let channel = connection.create_channel().await?;
        channel.confirm_select(ConfirmSelectOptions::default()).await?;
        let channel = Arc::new(LapinChannel::new(channel));

        provision_static_queue(channel.as_ref(), rabbitmq, strategy).await?;

        info!("Connected to RabbitMQ with publisher confirms enabled");
        Ok(Self {
            connection,
            channel,
        })
    }

    /// Shared handle to the confirm-mode channel.
    pub fn channel(&self) -> Arc<LapinChannel> {
        Arc::clone(&self.channel)
    }

    /// Closes the channel, then the connection, skipping whichever is
    /// already closed.
    pub async fn close(&self) -> Result<()> {
        self.channel.close().await?;

        if self.connection.status().connected() {
            self.connection.close(200, "OK").await?;
        } else {
            debug!("Connection already closed");
        }

        info!("RabbitMQ connection closed");
        Ok(())
    }
}

/// Declares the queue named by the static routing key. In `topic` mode the
/// key is only known per event, so the publisher declares it instead.
pub async fn provision_static_queue(
    channel: &dyn BrokerChannel,
    config: &RabbitMqConfig,
    strategy: &RoutingKeyStrategy,
) -> Result<()> {
    if strategy.is_topic() || !config.auto_create_routing_key {
        return Ok(());
    }

    let name = config.routing_key.as_deref().unwrap_or(EMPTY_ROUTING_KEY);
    info!("Creating queue for routing key named '{}'", name);
    channel.declare_queue(name, config.routing_key_durable).await
}
