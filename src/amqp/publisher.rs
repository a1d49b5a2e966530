//! Batch publishing with broker confirms.
//!
//! A batch is committed all-or-nothing: every event is published in order,
//! one confirm wait covers the whole batch, and only a positive confirmation
//! lets the events be marked processed. Any failure leaves the batch
//! uncommitted so the upstream engine delivers it again.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, trace};

use crate::amqp::channel::BrokerChannel;
use crate::amqp::message::MessageBuilder;
use crate::config::RabbitMqConfig;
use crate::engine::{ChangeEvent, RecordCommitter};
use crate::Result;

/// Progress of the batch in flight. Any failure ends the batch where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Publishing(usize),
    AllPublished,
    AwaitingConfirm,
    Committed,
}

/// Publishes batches of change events through a [`BrokerChannel`] and drives
/// the upstream engine's [`RecordCommitter`].
///
/// # Example
///
/// ```rust,no_run
/// use cdc_amqp_sink::amqp::{AmqpConnection, BatchPublisher, MessageBuilder, RoutingKeyStrategy};
/// use cdc_amqp_sink::checkpoint::CheckpointManager;
/// use cdc_amqp_sink::engine::{ChangeEvent, CheckpointCommitter, PrefixMapper};
/// use cdc_amqp_sink::Config;
/// use std::sync::Arc;
///
/// # async fn run(config: Config) -> cdc_amqp_sink::Result<()> {
/// let strategy = RoutingKeyStrategy::from_config(&config.rabbitmq);
/// let connection = AmqpConnection::connect(&config, &strategy).await?;
/// let mapper = Arc::new(PrefixMapper::new("testc"));
/// let builder = MessageBuilder::new(&config.rabbitmq, strategy, mapper);
/// let publisher = BatchPublisher::new(connection.channel(), builder, &config.rabbitmq);
///
/// let events = vec![ChangeEvent::new("inventory.customers").with_key("1001").with_value("{}")];
/// let mut committer =
///     CheckpointCommitter::new(CheckpointManager::new("events.checkpoint.json"), None);
/// committer.begin_batch(1, events.len());
/// publisher.handle_batch(&events, &mut committer).await?;
/// # connection.close().await
/// # }
/// ```
pub struct BatchPublisher<C: BrokerChannel + ?Sized> {
    channel: Arc<C>,
    builder: MessageBuilder,
    auto_create_routing_key: bool,
    routing_key_durable: bool,
    ack_timeout: Duration,
}

impl<C: BrokerChannel + ?Sized> BatchPublisher<C> {
    /// Takes queue auto-creation, queue durability and the confirm timeout
    /// from `config`; routing and exchange choices live in `builder`.
    pub fn new(channel: Arc<C>, builder: MessageBuilder, config: &RabbitMqConfig) -> Self {
        Self {
            channel,
            builder,
            auto_create_routing_key: config.auto_create_routing_key,
            routing_key_durable: config.routing_key_durable,
            ack_timeout: config.ack_timeout(),
        }
    }

    /// Publishes `events` in order and commits them once the broker has
    /// confirmed all of them.
    ///
    /// # Errors
    ///
    /// Returns the first declare, publish or confirm failure. In that case no
    /// event has been marked processed and the batch is not finished.
    #[instrument(skip_all, fields(events = events.len()))]
    pub async fn handle_batch(
        &self,
        events: &[ChangeEvent],
        committer: &mut dyn RecordCommitter,
    ) -> Result<()> {
        let mut state = BatchState::Idle;
        trace!(?state, "Handling batch");
        let declare_per_event =
            self.builder.routing_key_strategy().is_topic() && self.auto_create_routing_key;

        for (index, event) in events.iter().enumerate() {
            state = BatchState::Publishing(index);
            trace!(?state, destination = %event.destination, "Received event");

            let message = self.builder.build(event);

            // Declared on every event; the broker treats a repeat declare as a no-op.
            if declare_per_event {
                trace!("Creating queue for routing key named '{}'", message.routing_key);
                self.channel
                    .declare_queue(&message.routing_key, self.routing_key_durable)
                    .await
                    .inspect_err(|e| error!(index, error = %e, "Failed to declare queue"))?;
            }

            self.channel
                .publish(&message)
                .await
                .inspect_err(|e| error!(index, error = %e, "Failed to publish event"))?;
        }

        state = BatchState::AllPublished;
        trace!(?state, "Batch submitted");

        state = BatchState::AwaitingConfirm;
        trace!(?state, timeout_ms = self.ack_timeout.as_millis() as u64, "Waiting for confirms");
        self.channel
            .wait_for_confirms(self.ack_timeout)
            .await
            .inspect_err(|e| error!(error = %e, "Batch was not confirmed"))?;

        trace!("Marking {} records as processed.", events.len());
        for event in events {
            committer.mark_processed(event).await?;
        }
        committer.mark_batch_finished().await?;

        state = BatchState::Committed;
        debug!(?state, events = events.len(), "Batch marked finished");
        Ok(())
    }
}
