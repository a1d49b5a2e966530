use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::amqp::{AmqpConnection, BatchPublisher, BrokerChannel, MessageBuilder, RoutingKeyStrategy};
use crate::checkpoint::CheckpointManager;
use crate::engine::{mapper, CheckpointCommitter, DestinationMapper, JsonLinesSource};
use crate::{Config, Error, Result};

/// Totals of a replication run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicationStats {
    pub batches: u64,
    pub events: u64,
    pub offset: u64,
}

/// Feeds batches from the change event source through the batch publisher
/// and checkpoints each confirmed batch.
pub struct Replicator {
    config: Config,
}

impl Replicator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn reset_checkpoint(&self) -> Result<()> {
        CheckpointManager::new(self.config.checkpoint_path()).delete().await
    }

    /// Connects to the broker and replicates until the source is drained,
    /// or until Ctrl+C in follow mode.
    pub async fn run(&self) -> Result<ReplicationStats> {
        info!("Replicator starting");

        let mapper: Arc<dyn DestinationMapper> = Arc::from(mapper::from_prefix(&self.config.mapper.prefix));
        let strategy = RoutingKeyStrategy::from_config(&self.config.rabbitmq);
        info!(routing_key_source = %strategy.source(), "Routing key strategy selected");

        let connection = AmqpConnection::connect(&self.config, &strategy).await?;
        let builder = MessageBuilder::new(&self.config.rabbitmq, strategy, mapper);
        let publisher = BatchPublisher::new(connection.channel(), builder, &self.config.rabbitmq);

        let result = self
            .replicate(&publisher, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for shutdown signal: {}", e);
                    std::future::pending::<()>().await;
                }
            })
            .await;

        let closed = connection.close().await;

        match result {
            Ok(stats) => {
                closed?;
                info!(
                    batches = stats.batches,
                    events = stats.events,
                    offset = stats.offset,
                    "Replication finished"
                );
                Ok(stats)
            }
            Err(e) => {
                if let Err(close_error) = closed {
                    warn!("Failed to close RabbitMQ connection: {}", close_error);
                }
                Err(e)
            }
        }
    }

    /// Runs the batch loop against an already connected publisher. Resolving
    /// `shutdown` abandons the batch in flight without committing it.
    pub async fn replicate<C, F>(
        &self,
        publisher: &BatchPublisher<C>,
        shutdown: F,
    ) -> Result<ReplicationStats>
    where
        C: BrokerChannel + ?Sized,
        F: Future<Output = ()>,
    {
        let source_config = &self.config.source;
        let manager = CheckpointManager::new(self.config.checkpoint_path());
        let checkpoint = manager.load().await?;

        let start_offset = checkpoint.as_ref().map(|c| c.offset).unwrap_or(0);
        let mut source =
            JsonLinesSource::open(&source_config.path, start_offset, source_config.follow).await?;
        let mut committer = CheckpointCommitter::new(manager, checkpoint.as_ref());
        let mut stats = ReplicationStats {
            offset: committer.committed_offset(),
            ..Default::default()
        };

        let poll_interval = Duration::from_millis(source_config.poll_interval_ms);
        tokio::pin!(shutdown);

        loop {
            let batch = match source.next_batch(source_config.batch_size).await? {
                Some(batch) => batch,
                None if !source_config.follow => break,
                None => {
                    tokio::select! {
                        _ = &mut shutdown => {
                            info!("Shutdown requested");
                            return Err(Error::Shutdown);
                        }
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                    continue;
                }
            };

            committer.begin_batch(batch.end_offset, batch.events.len());

            tokio::select! {
                _ = &mut shutdown => {
                    warn!(
                        events = batch.events.len(),
                        "Shutdown requested, batch in flight left uncommitted"
                    );
                    return Err(Error::Shutdown);
                }
                result = publisher.handle_batch(&batch.events, &mut committer) => result?,
            }

            stats.batches += 1;
            stats.events += batch.events.len() as u64;
            stats.offset = committer.committed_offset();
            debug!(
                batches = stats.batches,
                events = stats.events,
                offset = stats.offset,
                "Batch committed"
            );
        }

        Ok(stats)
    }
}
