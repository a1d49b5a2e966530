use async_trait::async_trait;
use futures::future::join_all;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::publisher_confirm::PublisherConfirm;
use lapin::types::FieldTable;
use lapin::Channel;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::amqp::message::OutgoingMessage;
use crate::{Error, Result};

/// The broker operations the batch publisher depends on.
///
/// `publish` only enqueues a message; durability is established by a later
/// `wait_for_confirms`, which covers every publish since the previous call.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declares a queue; declaring an existing queue is a no-op.
    async fn declare_queue(&self, name: &str, durable: bool) -> Result<()>;

    /// Sends `message` and records it as awaiting a confirm.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the message could not be handed to the broker. A
    /// successful return says nothing about delivery.
    async fn publish(&self, message: &OutgoingMessage) -> Result<()>;

    /// Waits until every message published since the last call is confirmed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfirmTimeout`] if confirms are still outstanding
    /// after `timeout`, and [`Error::Nack`] if the broker rejected any of them.
    async fn wait_for_confirms(&self, timeout: Duration) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// A lapin channel in publisher confirm mode.
pub struct LapinChannel {
    channel: Channel,
    outstanding: Mutex<Vec<PublisherConfirm>>,
}

impl LapinChannel {
    /// `channel` must already have confirm mode enabled.
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            outstanding: Mutex::new(Vec::new()),
        }
    }

    fn take_outstanding(&self) -> Vec<PublisherConfirm> {
        match self.outstanding.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    fn push_outstanding(&self, confirm: PublisherConfirm) {
        match self.outstanding.lock() {
            Ok(mut guard) => guard.push(confirm),
            Err(poisoned) => poisoned.into_inner().push(confirm),
        }
    }
}

#[async_trait]
impl BrokerChannel for LapinChannel {
    async fn declare_queue(&self, name: &str, durable: bool) -> Result<()> {
        let options = QueueDeclareOptions {
            durable,
            exclusive: false,
            auto_delete: false,
            ..Default::default()
        };

        let queue = self
            .channel
            .queue_declare(name, options, FieldTable::default())
            .await?;

        trace!(queue = queue.name().as_str(), messages = queue.message_count(), "Queue declared");
        Ok(())
    }

    async fn publish(&self, message: &OutgoingMessage) -> Result<()> {
        let confirm = self
            .channel
            .basic_publish(
                &message.exchange,
                &message.routing_key,
                BasicPublishOptions::default(),
                &message.body,
                message.properties(),
            )
            .await?;

        self.push_outstanding(confirm);
        Ok(())
    }

    async fn wait_for_confirms(&self, timeout: Duration) -> Result<()> {
        let confirms = self.take_outstanding();
        let total = confirms.len();

        let results = tokio::time::timeout(timeout, join_all(confirms))
            .await
            .map_err(|_| Error::ConfirmTimeout {
                timeout_ms: timeout.as_millis() as u64,
                outstanding: total,
            })?;

        let mut rejected = 0;
        for result in results {
            let confirmation = result?;
            if confirmation.is_nack() {
                rejected += 1;
            }
        }

        if rejected > 0 {
            warn!(rejected, total, "Broker rejected published messages");
            return Err(Error::Nack { rejected, total });
        }

        debug!(confirmed = total, "Publisher confirms received");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.channel.status().connected() {
            debug!("Channel already closed");
            return Ok(());
        }

        self.channel.close(200, "OK").await?;
        Ok(())
    }
}
