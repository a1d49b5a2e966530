//! Error types and result handling for cdc-amqp-sink.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! Every error is fatal for the batch in flight: nothing in this crate
//! retries, the upstream engine re-delivers the whole batch instead.
//!
//! # Example
//!
//! ```rust
//! use cdc_amqp_sink::{Error, Result};
//!
//! fn wait_for_broker() -> Result<()> {
//!     Err(Error::ConfirmTimeout { timeout_ms: 30_000, outstanding: 2 })
//! }
//!
//! match wait_for_broker() {
//!     Ok(()) => println!("Confirmed"),
//!     Err(Error::ConfirmTimeout { timeout_ms, .. }) => eprintln!("No confirm after {}ms", timeout_ms),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;

/// The main error type for cdc-amqp-sink operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, from the config file, environment or validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// AMQP client or protocol error (connect, declare, publish, close).
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// JSON error when decoding change events or checkpoints.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error, typically from the event source or checkpoint file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection error not covered by the AMQP client, e.g. a connect timeout.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The broker did not confirm the outstanding publishes in time.
    #[error("Timed out after {timeout_ms}ms waiting for {outstanding} publisher confirms")]
    ConfirmTimeout {
        /// Configured upper bound of the wait
        timeout_ms: u64,
        /// Number of publishes that were awaiting confirmation
        outstanding: usize,
    },

    /// The broker negatively acknowledged at least one message.
    #[error("Broker rejected {rejected} of {total} messages")]
    Nack {
        /// Number of negatively acknowledged messages
        rejected: usize,
        /// Number of messages covered by the confirm wait
        total: usize,
    },

    /// A change event in the source could not be decoded.
    #[error("Invalid change event at line {line}: {message}")]
    InvalidEvent {
        /// 1-based line number in the source file
        line: u64,
        /// Description of what was invalid
        message: String,
    },

    /// Graceful shutdown was requested (e.g., via Ctrl+C).
    ///
    /// Uses the error mechanism to leave the batch loop without committing
    /// the batch in flight.
    #[error("Shutdown requested")]
    Shutdown,
}

/// A convenient Result type alias for cdc-amqp-sink operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}
