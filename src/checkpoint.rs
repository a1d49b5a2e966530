//! Persisted source position for at-least-once delivery.
//!
//! A checkpoint records how far into the change event source the broker has
//! confirmed delivery. It is only ever written after a whole batch has been
//! confirmed, so on restart the source resumes at a batch boundary and any
//! batch that was in flight during a crash is published again.
//!
//! # Example
//!
//! ```rust,no_run
//! use cdc_amqp_sink::checkpoint::{Checkpoint, CheckpointManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = CheckpointManager::new("events.checkpoint.json");
//!
//!     if let Some(checkpoint) = manager.load().await? {
//!         println!("Resuming after line {}", checkpoint.offset);
//!     }
//!
//!     manager.save(&Checkpoint::new(500, 500)).await?;
//!     Ok(())
//! }
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

/// Position in the change event source up to which every event is confirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Number of source lines fully delivered; reading resumes after them
    pub offset: u64,
    /// When this checkpoint was taken
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Events confirmed by the broker since the checkpoint file was created
    pub message_count: u64,
}

/// Loads and atomically stores a [`Checkpoint`] on disk.
pub struct CheckpointManager {
    file_path: PathBuf,
}

impl CheckpointManager {
    pub fn new(checkpoint_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: checkpoint_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Loads the checkpoint, or `None` when no file exists yet.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file exists but cannot be read or does not
    /// contain a valid checkpoint.
    pub async fn load(&self) -> Result<Option<Checkpoint>> {
        if !fs::try_exists(&self.file_path).await? {
            debug!("No checkpoint file found at {:?}", self.file_path);
            return Ok(None);
        }

        let content = fs::read_to_string(&self.file_path).await?;
        match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) => {
                info!(
                    offset = checkpoint.offset,
                    message_count = checkpoint.message_count,
                    timestamp = %checkpoint.timestamp,
                    "Loaded checkpoint"
                );
                Ok(Some(checkpoint))
            }
            Err(e) => {
                error!("Failed to parse checkpoint file {:?}: {}", self.file_path, e);
                Err(Error::Serialization(e))
            }
        }
    }

    /// Writes the checkpoint through a synced temp file and a rename, so a
    /// crash never leaves a half-written checkpoint behind.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        debug!(offset = checkpoint.offset, "Saving checkpoint");

        let temp_path = self.file_path.with_extension("tmp");

        let json = serde_json::to_string_pretty(checkpoint)?;
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.file_path).await?;

        Ok(())
    }

    /// Removes the checkpoint so the next run starts from the first event.
    pub async fn delete(&self) -> Result<()> {
        if fs::try_exists(&self.file_path).await? {
            fs::remove_file(&self.file_path).await?;
            info!("Deleted checkpoint file {:?}", self.file_path);
        }
        Ok(())
    }
}

impl Checkpoint {
    pub fn new(offset: u64, message_count: u64) -> Self {
        Self {
            offset,
            timestamp: chrono::Utc::now(),
            message_count,
        }
    }
}
