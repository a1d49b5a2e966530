#![allow(dead_code)]

use async_trait::async_trait;
use cdc_amqp_sink::amqp::{BrokerChannel, OutgoingMessage};
use cdc_amqp_sink::config::{Config, ConnectionConfig, MapperConfig, RabbitMqConfig, SourceConfig};
use cdc_amqp_sink::engine::{ChangeEvent, RecordCommitter};
use cdc_amqp_sink::{Error, Result};
use std::env;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared log of everything the fake broker and committer observe, in order.
pub type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmBehavior {
    Ack,
    Nack,
    Never,
}

/// In-memory broker channel with scriptable failures.
pub struct FakeChannel {
    pub journal: Journal,
    pub published: Mutex<Vec<OutgoingMessage>>,
    pub declared: Mutex<Vec<(String, bool)>>,
    pub fail_publish_at: Option<usize>,
    pub confirm: ConfirmBehavior,
    pub closed: AtomicBool,
    publish_calls: Mutex<usize>,
}

impl FakeChannel {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            published: Mutex::new(Vec::new()),
            declared: Mutex::new(Vec::new()),
            fail_publish_at: None,
            confirm: ConfirmBehavior::Ack,
            closed: AtomicBool::new(false),
            publish_calls: Mutex::new(0),
        }
    }

    pub fn failing_publish_at(mut self, index: usize) -> Self {
        self.fail_publish_at = Some(index);
        self
    }

    pub fn with_confirm(mut self, confirm: ConfirmBehavior) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn published(&self) -> Vec<OutgoingMessage> {
        self.published.lock().unwrap().clone()
    }

    pub fn declared(&self) -> Vec<(String, bool)> {
        self.declared.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl BrokerChannel for FakeChannel {
    async fn declare_queue(&self, name: &str, durable: bool) -> Result<()> {
        self.record(format!("declare:{}", name));
        self.declared.lock().unwrap().push((name.to_string(), durable));
        Ok(())
    }

    async fn publish(&self, message: &OutgoingMessage) -> Result<()> {
        let index = {
            let mut calls = self.publish_calls.lock().unwrap();
            let index = *calls;
            *calls += 1;
            index
        };

        if self.fail_publish_at == Some(index) {
            self.record(format!("publish-failed:{}", index));
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection reset by broker",
            )));
        }

        self.record(format!("publish:{}", message.routing_key));
        self.published.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn wait_for_confirms(&self, timeout: Duration) -> Result<()> {
        self.record("confirm".to_string());
        let total = self.published.lock().unwrap().len();

        match self.confirm {
            ConfirmBehavior::Ack => Ok(()),
            ConfirmBehavior::Nack => Err(Error::Nack { rejected: 1, total }),
            ConfirmBehavior::Never => {
                let _ = tokio::time::timeout(timeout, std::future::pending::<()>()).await;
                Err(Error::ConfirmTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                    outstanding: total,
                })
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Committer that records every callback.
pub struct RecordingCommitter {
    pub journal: Journal,
    pub processed: Vec<ChangeEvent>,
    pub finished: usize,
}

impl RecordingCommitter {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            processed: Vec::new(),
            finished: 0,
        }
    }
}

#[async_trait]
impl RecordCommitter for RecordingCommitter {
    async fn mark_processed(&mut self, event: &ChangeEvent) -> Result<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("processed:{}", event.destination));
        self.processed.push(event.clone());
        Ok(())
    }

    async fn mark_batch_finished(&mut self) -> Result<()> {
        self.journal.lock().unwrap().push("finished".to_string());
        self.finished += 1;
        Ok(())
    }
}

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(destinations: &[&str]) -> Vec<ChangeEvent> {
    destinations
        .iter()
        .enumerate()
        .map(|(i, d)| {
            ChangeEvent::new(*d)
                .with_key(format!("{{\"id\":{}}}", 1001 + i))
                .with_value(format!("{{\"id\":{}}}", 1001 + i))
        })
        .collect()
}

pub fn rabbitmq_config() -> RabbitMqConfig {
    RabbitMqConfig {
        ack_timeout_ms: 50,
        ..Default::default()
    }
}

/// Get test configuration from environment variables
pub fn get_test_config(source_path: &Path) -> Config {
    let connection = ConnectionConfig {
        host: env::var("TEST_AMQP_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: env::var("TEST_AMQP_PORT")
            .unwrap_or_else(|_| "5672".to_string())
            .parse()
            .unwrap_or(5672),
        username: env::var("TEST_AMQP_USERNAME").unwrap_or_else(|_| "guest".to_string()),
        password: env::var("TEST_AMQP_PASSWORD").unwrap_or_else(|_| "guest".to_string()),
        virtual_host: "/".to_string(),
        connection_timeout_ms: 5_000,
    };

    Config {
        rabbitmq: RabbitMqConfig {
            connection,
            ..rabbitmq_config()
        },
        mapper: MapperConfig {
            prefix: "testc".to_string(),
        },
        source: SourceConfig {
            path: source_path.to_path_buf(),
            batch_size: 2,
            follow: false,
            poll_interval_ms: 10,
            checkpoint_file: None,
        },
    }
}
