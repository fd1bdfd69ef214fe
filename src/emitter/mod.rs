//! Delivery of shaped change events to downstream systems.
//!
//! Two implementations: [`EventBridgeNotification`] submits batched entries
//! to an event bus; [`FileNotification`] appends newline-delimited JSON to a
//! local file. Both follow last-error semantics: per-record failures are
//! logged, remaining records still proceed, and the call returns the last
//! error observed so callers know at least one delivery failed.

pub mod eventbridge;
pub mod file;

use async_trait::async_trait;
use thiserror::Error;

use crate::aws::AwsError;
use crate::types::{Channel, Detail};

pub use eventbridge::EventBridgeNotification;
pub use file::FileNotification;

/// Errors from event delivery.
#[derive(Debug, Error)]
pub enum EmitError {
    /// The transport to the event bus failed for a whole batch.
    #[error("event bus call failed: {0}")]
    Bus(#[from] AwsError),

    /// An individual entry was rejected by the event bus.
    #[error("put events entry failed error_code={code}, error_message={message}")]
    Entry { code: String, message: String },

    /// The event file could not be opened or written.
    #[error("event file error: {0}")]
    Io(#[from] std::io::Error),

    /// A record failed to encode.
    #[error("event encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The downstream delivery seam.
#[async_trait]
pub trait Notification: Send + Sync {
    /// Delivers a batch of change details for `channel`. An empty slice is a
    /// no-op with no side effects. Returns the last error observed, if any;
    /// partial failures do not stop remaining records.
    async fn send_changes(&self, channel: &Channel, details: &[Detail]) -> Result<(), EmitError>;
}
