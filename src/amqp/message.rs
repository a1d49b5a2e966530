use bytes::Bytes;
use lapin::BasicProperties;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::amqp::exchange::ExchangeResolver;
use crate::amqp::headers::{convert_headers, to_field_table};
use crate::amqp::routing_key::RoutingKeyStrategy;
use crate::config::RabbitMqConfig;
use crate::engine::{ChangeEvent, DestinationMapper, Payload};

/// A fully resolved message, ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub exchange: String,
    pub routing_key: String,
    pub delivery_mode: u8,
    pub headers: BTreeMap<String, Option<Payload>>,
    pub body: Bytes,
}

impl OutgoingMessage {
    /// AMQP properties carrying the delivery mode and the header table.
    pub fn properties(&self) -> BasicProperties {
        BasicProperties::default()
            .with_delivery_mode(self.delivery_mode)
            .with_headers(to_field_table(&self.headers))
    }
}

/// Turns change events into [`OutgoingMessage`]s.
pub struct MessageBuilder {
    exchange: ExchangeResolver,
    routing_key: RoutingKeyStrategy,
    mapper: Arc<dyn DestinationMapper>,
    delivery_mode: u8,
    null_value: Bytes,
}

impl MessageBuilder {
    pub fn new(
        config: &RabbitMqConfig,
        routing_key: RoutingKeyStrategy,
        mapper: Arc<dyn DestinationMapper>,
    ) -> Self {
        Self {
            exchange: ExchangeResolver::from_config(config),
            routing_key,
            mapper,
            delivery_mode: config.delivery_mode,
            null_value: Bytes::from(config.null_value.clone()),
        }
    }

    pub fn routing_key_strategy(&self) -> &RoutingKeyStrategy {
        &self.routing_key
    }

    /// Resolves exchange, routing key, headers and body for one event.
    ///
    /// An event without a value (a deletion tombstone) gets the configured
    /// `null_value` as its body. Building never fails; a missing routing key
    /// becomes the empty string.
    pub fn build(&self, event: &ChangeEvent) -> OutgoingMessage {
        let body = match &event.value {
            Some(value) => Bytes::copy_from_slice(value.as_bytes()),
            None => self.null_value.clone(),
        };

        OutgoingMessage {
            exchange: self.exchange.resolve(event, self.mapper.as_ref()),
            routing_key: self.routing_key.resolve_or_empty(event, self.mapper.as_ref()),
            delivery_mode: self.delivery_mode,
            headers: convert_headers(&event.headers),
            body,
        }
    }
}
