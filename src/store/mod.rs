//! Durable keyed storage of channel records.
//!
//! Two backends implement the [`Storage`] capability set: a DynamoDB table
//! and a lock-guarded local file. The storage layer is the only authority
//! for channel identity and page tokens; the invariants of the data model
//! (unique channel ids, monotonic page-token updates) are enforced here via
//! conditional writes.

pub mod dynamo;
pub mod file;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::aws::AwsError;
use crate::types::{Channel, ChannelId};

pub use dynamo::DynamoDbStorage;
pub use file::FileStorage;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No record exists for the channel id.
    #[error("channel_id:{0} not found")]
    ChannelNotFound(ChannelId),

    /// A record already exists for the channel id.
    #[error("channel_id:{0} already exists")]
    ChannelAlreadyExists(ChannelId),

    /// A conditional update lost to a concurrent writer (the stored
    /// `updated_at` was not older than the incoming one).
    #[error("conditional update failed for channel_id:{0}")]
    PreconditionFailed(ChannelId),

    /// The cross-process file lock could not be acquired in time.
    #[error("cannot acquire storage lock at {path}: {reason}")]
    LockUnavailable { path: String, reason: String },

    /// Remote store failure.
    #[error("storage backend error: {0}")]
    Backend(#[from] AwsError),

    /// Local file IO failure.
    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Data file (de)serialization failure.
    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// The channel store capability set.
///
/// `find_all_channels` yields batches over a channel; the sequence is finite
/// and not restartable, and consumers must not assume a single batch.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Streams all channel records in batches. The stream terminates by
    /// closing the channel. Fails only if the initial listing fails.
    async fn find_all_channels(&self) -> Result<mpsc::Receiver<Vec<Channel>>, StorageError>;

    /// Looks up one channel by id.
    async fn find_one_by_channel_id(&self, id: &ChannelId) -> Result<Channel, StorageError>;

    /// Persists a new channel. Create-if-not-exists: an existing record with
    /// the same id yields [`StorageError::ChannelAlreadyExists`].
    async fn save_channel(&self, channel: &Channel) -> Result<(), StorageError>;

    /// Advances the page token. Conditional: the record must exist and the
    /// stored `updated_at` must be strictly older than the incoming one.
    /// Only `page_token` and `updated_at` are written.
    async fn update_page_token(&self, channel: &Channel) -> Result<(), StorageError>;

    /// Removes the record. Conditional on existence; a missing record yields
    /// [`StorageError::ChannelNotFound`], which callers on the teardown path
    /// treat as already-done.
    async fn delete_channel(&self, channel: &Channel) -> Result<(), StorageError>;
}

/// Collects every batch from a [`Storage::find_all_channels`] stream.
pub async fn collect_all(
    mut rx: mpsc::Receiver<Vec<Channel>>,
) -> Vec<Channel> {
    let mut all = Vec::new();
    while let Some(batch) = rx.recv().await {
        all.extend(batch);
    }
    all
}
