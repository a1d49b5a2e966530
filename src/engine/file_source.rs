//! Replays change events from a JSON-lines file in fixed-size batches.
//!
//! Each non-blank line holds one [`ChangeEvent`]. Positions are counted in
//! lines, blank lines included, so a checkpoint offset can be handed back to
//! [`JsonLinesSource::open`] to resume right after the last committed batch.
//!
//! A final line without a newline is an event in its own right, unless the
//! source follows the file, in which case it is still being written and is
//! held back until the newline arrives.

use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::engine::ChangeEvent;
use crate::{Error, Result};

/// An ordered group of events plus the source offset right after its last line.
#[derive(Debug)]
pub struct SourceBatch {
    pub events: Vec<ChangeEvent>,
    pub end_offset: u64,
}

pub struct JsonLinesSource {
    reader: BufReader<File>,
    offset: u64,
    follow: bool,
    // Text read past EOF without a trailing newline yet.
    partial: String,
}

impl JsonLinesSource {
    /// Opens `path` and skips the first `start_offset` lines.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened or read.
    pub async fn open(path: impl AsRef<Path>, start_offset: u64, follow: bool) -> Result<Self> {
        let file = File::open(path.as_ref()).await?;
        let mut source = Self {
            reader: BufReader::new(file),
            offset: 0,
            follow,
            partial: String::new(),
        };

        while source.offset < start_offset {
            if source.next_line().await?.is_none() {
                break;
            }
        }

        info!(path = ?path.as_ref(), offset = source.offset, follow, "Opened change event source");
        Ok(source)
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads up to `max_events` events. Returns `None` when nothing new is
    /// available; a later call picks up lines appended in the meantime.
    pub async fn next_batch(&mut self, max_events: usize) -> Result<Option<SourceBatch>> {
        let mut events = Vec::with_capacity(max_events);

        while events.len() < max_events {
            let Some(line) = self.next_line().await? else {
                break;
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let event: ChangeEvent =
                serde_json::from_str(trimmed).map_err(|e| Error::InvalidEvent {
                    line: self.offset,
                    message: e.to_string(),
                })?;
            events.push(event);
        }

        if events.is_empty() {
            return Ok(None);
        }

        debug!(events = events.len(), end_offset = self.offset, "Read batch");
        Ok(Some(SourceBatch {
            events,
            end_offset: self.offset,
        }))
    }

    async fn next_line(&mut self) -> Result<Option<String>> {
        // read_line only stops short of a newline at EOF.
        self.reader.read_line(&mut self.partial).await?;
        if self.partial.is_empty() || (self.follow && !self.partial.ends_with('\n')) {
            return Ok(None);
        }

        self.offset += 1;
        Ok(Some(std::mem::take(&mut self.partial)))
    }
}
