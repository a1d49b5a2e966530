use lapin::uri::{AMQPAuthority, AMQPUri, AMQPUserInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

const ENV_PREFIX: &str = "AMQP_SINK";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub rabbitmq: RabbitMqConfig,
    #[serde(default)]
    pub mapper: MapperConfig,
    pub source: SourceConfig,
}

/// Broker connection settings, the `rabbitmq.connection` table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_credential")]
    pub username: String,
    #[serde(default = "default_credential")]
    pub password: String,
    #[serde(default = "default_virtual_host")]
    pub virtual_host: String,
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

/// Routing and delivery settings, loaded once and never changed afterwards.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RabbitMqConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Fixed exchange for every event; unset or empty derives it from the destination.
    #[serde(default)]
    pub exchange: Option<String>,
    /// Routing key used by the `static` source.
    #[serde(default)]
    pub routing_key: Option<String>,
    #[serde(default)]
    pub routing_key_source: RoutingKeySource,
    #[serde(default)]
    pub auto_create_routing_key: bool,
    #[serde(default = "default_true")]
    pub routing_key_durable: bool,
    /// Deprecated: use `routing_key_source = "topic"`. Takes precedence when true.
    #[serde(default)]
    pub routing_key_from_topic_name: bool,
    #[serde(default = "default_delivery_mode")]
    pub delivery_mode: u8,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default = "default_null_value")]
    pub null_value: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoutingKeySource {
    #[default]
    Static,
    Topic,
    Key,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct MapperConfig {
    /// Prepended to every destination as `{prefix}.{destination}`.
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub path: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub follow: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub checkpoint_file: Option<PathBuf>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(Self::environment())
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    pub fn validate(&self) -> Result<()> {
        let rabbitmq = &self.rabbitmq;

        if !matches!(rabbitmq.delivery_mode, 1 | 2) {
            return Err(Error::Config(format!(
                "rabbitmq.delivery_mode must be 1 (non-persistent) or 2 (persistent), got {}",
                rabbitmq.delivery_mode
            )));
        }

        if rabbitmq.ack_timeout_ms == 0 {
            return Err(Error::Config(
                "rabbitmq.ack_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.source.batch_size == 0 {
            return Err(Error::Config(
                "source.batch_size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Broker address assembled field by field, so credentials and vhost are
    /// passed verbatim and never need URI escaping.
    pub fn amqp_uri(&self) -> AMQPUri {
        let conn = &self.rabbitmq.connection;
        AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: conn.username.clone(),
                    password: conn.password.clone(),
                },
                host: conn.host.clone(),
                port: conn.port,
            },
            vhost: conn.virtual_host.clone(),
            ..Default::default()
        }
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.source
            .checkpoint_file
            .clone()
            .unwrap_or_else(|| self.source.path.with_extension("checkpoint.json"))
    }
}

impl RabbitMqConfig {
    pub fn exchange_override(&self) -> Option<&str> {
        self.exchange.as_deref().filter(|e| !e.is_empty())
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection.connection_timeout_ms)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: default_credential(),
            password: default_credential(),
            virtual_host: default_virtual_host(),
            connection_timeout_ms: default_connection_timeout_ms(),
        }
    }
}

impl Default for RabbitMqConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            exchange: None,
            routing_key: None,
            routing_key_source: RoutingKeySource::default(),
            auto_create_routing_key: false,
            routing_key_durable: true,
            routing_key_from_topic_name: false,
            delivery_mode: default_delivery_mode(),
            ack_timeout_ms: default_ack_timeout_ms(),
            null_value: default_null_value(),
        }
    }
}

impl fmt::Display for RoutingKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingKeySource::Static => write!(f, "static"),
            RoutingKeySource::Topic => write!(f, "topic"),
            RoutingKeySource::Key => write!(f, "key"),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5672
}

fn default_credential() -> String {
    "guest".to_string()
}

fn default_virtual_host() -> String {
    "/".to_string()
}

fn default_connection_timeout_ms() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

fn default_delivery_mode() -> u8 {
    2
}

fn default_ack_timeout_ms() -> u64 {
    30_000
}

fn default_null_value() -> String {
    "default".to_string()
}

fn default_batch_size() -> usize {
    500
}

fn default_poll_interval_ms() -> u64 {
    100
}
