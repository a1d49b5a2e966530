pub mod checkpoint;
pub mod config;
pub mod error;
pub mod replicator;

pub mod amqp;
pub mod engine;

pub use config::Config;
pub use error::{Error, Result};
pub use replicator::{ReplicationStats, Replicator};
