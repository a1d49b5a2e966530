use crate::config::RabbitMqConfig;
use crate::engine::{ChangeEvent, DestinationMapper};

/// Picks the exchange each event is published to.
#[derive(Debug, Clone, Default)]
pub struct ExchangeResolver {
    exchange: Option<String>,
}

impl ExchangeResolver {
    /// An empty override counts as unset.
    pub fn new(exchange: Option<String>) -> Self {
        Self {
            exchange: exchange.filter(|e| !e.is_empty()),
        }
    }

    pub fn from_config(config: &RabbitMqConfig) -> Self {
        Self::new(config.exchange_override().map(str::to_string))
    }

    pub fn resolve(&self, event: &ChangeEvent, mapper: &dyn DestinationMapper) -> String {
        match &self.exchange {
            Some(exchange) => exchange.clone(),
            None => mapper.map(&event.destination),
        }
    }
}
