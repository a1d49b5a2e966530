use crate::config::{RabbitMqConfig, RoutingKeySource};
use crate::engine::{ChangeEvent, DestinationMapper};
use tracing::warn;

/// Routing key used when a strategy resolves nothing.
pub const EMPTY_ROUTING_KEY: &str = "";

/// How the routing key of each outgoing message is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingKeyStrategy {
    /// The configured routing key for every event, if any.
    Static(Option<String>),
    /// The mapped destination name of the event.
    Topic,
    /// The event key rendered as a string.
    Key,
}

impl RoutingKeyStrategy {
    /// Selects the strategy once at startup.
    ///
    /// The deprecated `routing_key_from_topic_name` flag wins over
    /// `routing_key_source` and logs a warning pointing at its replacement.
    pub fn from_config(config: &RabbitMqConfig) -> Self {
        if config.routing_key_from_topic_name {
            warn!(
                "Using deprecated `rabbitmq.routing_key_from_topic_name` config value. \
                 Please, use `rabbitmq.routing_key_source` with value `topic` \
                 (routingKey.source=topic) instead"
            );
            return RoutingKeyStrategy::Topic;
        }

        match config.routing_key_source {
            RoutingKeySource::Static => RoutingKeyStrategy::Static(config.routing_key.clone()),
            RoutingKeySource::Topic => RoutingKeyStrategy::Topic,
            RoutingKeySource::Key => RoutingKeyStrategy::Key,
        }
    }

    /// Routing key for `event`, or `None` when the strategy has nothing to
    /// offer (no static key configured, or an event without a key).
    pub fn resolve(&self, event: &ChangeEvent, mapper: &dyn DestinationMapper) -> Option<String> {
        match self {
            RoutingKeyStrategy::Static(routing_key) => routing_key.clone(),
            RoutingKeyStrategy::Topic => Some(mapper.map(&event.destination)),
            RoutingKeyStrategy::Key => event.key.as_ref().map(|k| k.to_string_lossy().into_owned()),
        }
    }

    pub fn resolve_or_empty(&self, event: &ChangeEvent, mapper: &dyn DestinationMapper) -> String {
        self.resolve(event, mapper)
            .unwrap_or_else(|| EMPTY_ROUTING_KEY.to_string())
    }

    pub fn is_topic(&self) -> bool {
        matches!(self, RoutingKeyStrategy::Topic)
    }

    pub fn source(&self) -> RoutingKeySource {
        match self {
            RoutingKeyStrategy::Static(_) => RoutingKeySource::Static,
            RoutingKeyStrategy::Topic => RoutingKeySource::Topic,
            RoutingKeyStrategy::Key => RoutingKeySource::Key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{IdentityMapper, PrefixMapper};
    use std::fmt;
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    /// Collects the message of every WARN event.
    #[derive(Clone, Default)]
    struct WarningLog(Arc<Mutex<Vec<String>>>);

    struct MessageVisitor<'a>(&'a mut String);

    impl Visit for MessageVisitor<'_> {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "message" {
                *self.0 = format!("{:?}", value);
            }
        }
    }

    impl<S: Subscriber> Layer<S> for WarningLog {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                let mut message = String::new();
                event.record(&mut MessageVisitor(&mut message));
                self.0.lock().unwrap().push(message);
            }
        }
    }

    fn warnings_from_config(config: &RabbitMqConfig) -> (RoutingKeyStrategy, Vec<String>) {
        let log = WarningLog::default();
        let subscriber = tracing_subscriber::registry().with(log.clone());
        let strategy =
            tracing::subscriber::with_default(subscriber, || RoutingKeyStrategy::from_config(config));
        let warnings = log.0.lock().unwrap().clone();
        (strategy, warnings)
    }

    fn config_with(source: RoutingKeySource, routing_key: Option<&str>) -> RabbitMqConfig {
        RabbitMqConfig {
            routing_key_source: source,
            routing_key: routing_key.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_static_strategy_ignores_event() {
        let strategy =
            RoutingKeyStrategy::from_config(&config_with(RoutingKeySource::Static, Some("cdc")));
        let mapper = PrefixMapper::new("testc");

        let a = ChangeEvent::new("inventory.customers").with_key("1");
        let b = ChangeEvent::new("inventory.orders").with_key("2");

        assert_eq!(strategy.resolve(&a, &mapper), Some("cdc".to_string()));
        assert_eq!(strategy.resolve(&b, &mapper), Some("cdc".to_string()));
    }

    #[test]
    fn test_static_strategy_without_key_is_empty() {
        let strategy = RoutingKeyStrategy::from_config(&config_with(RoutingKeySource::Static, None));
        let event = ChangeEvent::new("inventory.customers");

        assert_eq!(strategy.resolve(&event, &IdentityMapper), None);
        assert_eq!(strategy.resolve_or_empty(&event, &IdentityMapper), "");
    }

    #[test]
    fn test_topic_strategy_uses_mapper() {
        let strategy = RoutingKeyStrategy::from_config(&config_with(RoutingKeySource::Topic, Some("ignored")));
        let event = ChangeEvent::new("inventory.customers");

        assert_eq!(
            strategy.resolve(&event, &PrefixMapper::new("testc")),
            Some("testc.inventory.customers".to_string())
        );
    }

    #[test]
    fn test_key_strategy() {
        let strategy = RoutingKeyStrategy::from_config(&config_with(RoutingKeySource::Key, Some("ignored")));

        let keyed = ChangeEvent::new("inventory.customers").with_key("{\"id\":1001}");
        assert_eq!(
            strategy.resolve(&keyed, &IdentityMapper),
            Some("{\"id\":1001}".to_string())
        );

        let binary = ChangeEvent::new("inventory.customers").with_key(b"1002".to_vec());
        assert_eq!(strategy.resolve(&binary, &IdentityMapper), Some("1002".to_string()));

        let unkeyed = ChangeEvent::new("inventory.customers");
        assert_eq!(strategy.resolve(&unkeyed, &IdentityMapper), None);
        assert_eq!(strategy.resolve_or_empty(&unkeyed, &IdentityMapper), "");
    }

    #[test]
    fn test_deprecated_flag_overrides_source() {
        let mapper = PrefixMapper::new("testc");
        let event = ChangeEvent::new("inventory.customers").with_key("1001");
        let expected = RoutingKeyStrategy::Topic.resolve(&event, &mapper);

        for source in [RoutingKeySource::Static, RoutingKeySource::Topic, RoutingKeySource::Key] {
            let config = RabbitMqConfig {
                routing_key_from_topic_name: true,
                ..config_with(source, Some("cdc"))
            };
            let strategy = RoutingKeyStrategy::from_config(&config);

            assert_eq!(strategy, RoutingKeyStrategy::Topic);
            assert_eq!(strategy.resolve(&event, &mapper), expected);
        }
    }

    #[test]
    fn test_deprecated_flag_warns_once() {
        let config = RabbitMqConfig {
            routing_key_from_topic_name: true,
            ..config_with(RoutingKeySource::Key, None)
        };

        let (strategy, warnings) = warnings_from_config(&config);

        assert_eq!(strategy, RoutingKeyStrategy::Topic);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("routing_key_from_topic_name"));
        assert!(warnings[0].contains("rabbitmq.routing_key_source"));
        assert!(warnings[0].contains("routingKey.source=topic"));
    }

    #[test]
    fn test_no_warning_without_deprecated_flag() {
        for source in [RoutingKeySource::Static, RoutingKeySource::Topic, RoutingKeySource::Key] {
            let (_, warnings) = warnings_from_config(&config_with(source, Some("cdc")));
            assert!(warnings.is_empty(), "unexpected warnings for {}: {:?}", source, warnings);
        }
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let mapper = PrefixMapper::new("testc");
        let event = ChangeEvent::new("inventory.customers").with_key("1001");

        for strategy in [
            RoutingKeyStrategy::Static(Some("cdc".to_string())),
            RoutingKeyStrategy::Topic,
            RoutingKeyStrategy::Key,
        ] {
            assert_eq!(strategy.resolve(&event, &mapper), strategy.resolve(&event, &mapper));
        }
    }
}
