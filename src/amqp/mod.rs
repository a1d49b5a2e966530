pub mod channel;
pub mod connection;
pub mod exchange;
pub mod headers;
pub mod message;
pub mod publisher;
pub mod routing_key;


pub use channel::{BrokerChannel, LapinChannel};
pub use connection::AmqpConnection;
pub use exchange::ExchangeResolver;
pub use headers::convert_headers;
pub use message::{MessageBuilder, OutgoingMessage};
pub use publisher::{BatchPublisher, BatchState};
pub use routing_key::RoutingKeyStrategy;
