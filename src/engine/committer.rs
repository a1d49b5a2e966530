use async_trait::async_trait;
use tracing::{debug, warn};

use crate::checkpoint::{Checkpoint, CheckpointManager};
use crate::engine::ChangeEvent;
use crate::Result;

/// Commit callback exposed by the upstream engine for one batch.
///
/// `mark_processed` is called once per event in publish order and
/// `mark_batch_finished` exactly once afterwards, both only after the broker
/// confirmed the whole batch.
#[async_trait]
pub trait RecordCommitter: Send {
    async fn mark_processed(&mut self, event: &ChangeEvent) -> Result<()>;

    async fn mark_batch_finished(&mut self) -> Result<()>;
}

/// Commits batches read from a line-oriented source by persisting the line
/// offset at which the batch ended.
pub struct CheckpointCommitter {
    manager: CheckpointManager,
    committed_offset: u64,
    message_count: u64,
    batch_end_offset: u64,
    batch_len: usize,
    processed: usize,
}

impl CheckpointCommitter {
    pub fn new(manager: CheckpointManager, resume_from: Option<&Checkpoint>) -> Self {
        let (offset, count) = resume_from
            .map(|c| (c.offset, c.message_count))
            .unwrap_or((0, 0));

        Self {
            manager,
            committed_offset: offset,
            message_count: count,
            batch_end_offset: offset,
            batch_len: 0,
            processed: 0,
        }
    }

    /// Prepares for a batch of `len` events that ends at source line `end_offset`.
    pub fn begin_batch(&mut self, end_offset: u64, len: usize) {
        self.batch_end_offset = end_offset;
        self.batch_len = len;
        self.processed = 0;
    }

    pub fn committed_offset(&self) -> u64 {
        self.committed_offset
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }
}

#[async_trait]
impl RecordCommitter for CheckpointCommitter {
    async fn mark_processed(&mut self, event: &ChangeEvent) -> Result<()> {
        self.processed += 1;
        debug!(destination = %event.destination, processed = self.processed, "Event processed");
        Ok(())
    }

    async fn mark_batch_finished(&mut self) -> Result<()> {
        if self.processed != self.batch_len {
            warn!(
                processed = self.processed,
                expected = self.batch_len,
                "Batch finished with a different number of processed events"
            );
        }

        let message_count = self.message_count + self.processed as u64;
        self.manager
            .save(&Checkpoint::new(self.batch_end_offset, message_count))
            .await?;

        self.committed_offset = self.batch_end_offset;
        self.message_count = message_count;
        self.processed = 0;
        Ok(())
    }
}
