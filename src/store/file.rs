//! File-backed channel store.
//!
//! A single JSON data file holds every channel record. Each operation is a
//! transactional load → mutate → store guarded by two locks:
//!
//! - an in-process `tokio::sync::Mutex`, so concurrent tasks in this process
//!   do not churn the file lock against each other, and
//! - a cross-process advisory lock: a companion `.lock` file created with
//!   create-new semantics. Acquisition retries 100ms→1s with ±35ms jitter,
//!   up to 10 attempts.
//!
//! The store itself is an atomic write: temp file, fsync, rename, fsync of
//! the parent directory, so readers see either the old or the new document.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::types::{Channel, ChannelId};

use super::{Storage, StorageError};

/// Lock acquisition retry policy.
const LOCK_MIN_DELAY: Duration = Duration::from_millis(100);
const LOCK_MAX_DELAY: Duration = Duration::from_millis(1_000);
const LOCK_MAX_ATTEMPTS: u32 = 10;
const LOCK_JITTER_MS: i64 = 35;

/// On-disk document schema.
const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    schema_version: u32,
    channels: Vec<Channel>,
}

/// Cross-process advisory lock held for the duration of one transaction.
///
/// Creating the lock file with `create_new` is atomic on POSIX filesystems;
/// whoever wins the create owns the lock. Dropping the guard removes the
/// file on all exit paths.
struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    fn try_acquire(path: &Path) -> std::io::Result<Option<LockGuard>> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                // Record the owner pid for operator debugging.
                let _ = write!(file, "{}", std::process::id());
                Ok(Some(LockGuard {
                    path: path.to_path_buf(),
                }))
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %err, "failed to release storage lock");
        }
    }
}

/// Channel store backed by a local JSON file.
#[derive(Debug)]
pub struct FileStorage {
    data_file: PathBuf,
    lock_file: PathBuf,
    /// Serializes transactions within this process.
    mutex: Mutex<()>,
}

impl FileStorage {
    pub fn new(data_file: impl Into<PathBuf>, lock_file: impl Into<PathBuf>) -> Self {
        FileStorage {
            data_file: data_file.into(),
            lock_file: lock_file.into(),
            mutex: Mutex::new(()),
        }
    }

    /// Runs `apply` inside a locked load → mutate → store transaction.
    /// The data file is rewritten only when `apply` succeeds.
    async fn transactional<T>(
        &self,
        apply: impl FnOnce(&mut Vec<Channel>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let _in_process = self.mutex.lock().await;
        let _lock = self.acquire_lock().await?;

        let mut channels = self.load()?;
        let result = apply(&mut channels)?;
        self.save(&channels)?;
        debug!(path = %self.data_file.display(), "file storage store success");
        Ok(result)
    }

    async fn acquire_lock(&self) -> Result<LockGuard, StorageError> {
        let mut delay = LOCK_MIN_DELAY;
        let mut last_reason = String::from("lock held by another process");
        for attempt in 0..LOCK_MAX_ATTEMPTS {
            debug!(path = %self.lock_file.display(), attempt, "try file storage lock");
            match LockGuard::try_acquire(&self.lock_file) {
                Ok(Some(guard)) => {
                    debug!(path = %self.lock_file.display(), "file storage lock acquired");
                    return Ok(guard);
                }
                Ok(None) => {}
                Err(err) => {
                    last_reason = err.to_string();
                }
            }
            let jitter = rand::thread_rng().gen_range(-LOCK_JITTER_MS..=LOCK_JITTER_MS);
            let sleep_ms = (delay.as_millis() as i64 + jitter).max(0) as u64;
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
            delay = (delay * 2).min(LOCK_MAX_DELAY);
        }
        Err(StorageError::LockUnavailable {
            path: self.lock_file.display().to_string(),
            reason: last_reason,
        })
    }

    fn load(&self) -> Result<Vec<Channel>, StorageError> {
        let bytes = match std::fs::read(&self.data_file) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                // First run: no data yet.
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        let document: StoreDocument = serde_json::from_slice(&bytes)?;
        Ok(document.channels)
    }

    /// Atomic write: temp file, fsync, rename, fsync the directory.
    fn save(&self, channels: &[Channel]) -> Result<(), StorageError> {
        let document = StoreDocument {
            schema_version: SCHEMA_VERSION,
            channels: channels.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&document)?;

        let tmp_path = self.data_file.with_extension("tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.data_file)?;
        if let Some(parent) = self.data_file.parent() {
            if !parent.as_os_str().is_empty() {
                let dir = File::open(parent)?;
                dir.sync_all()?;
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Storage for FileStorage {
    async fn find_all_channels(&self) -> Result<mpsc::Receiver<Vec<Channel>>, StorageError> {
        let channels = self.transactional(|channels| Ok(channels.clone())).await?;
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let _ = tx.send(channels).await;
        });
        Ok(rx)
    }

    async fn find_one_by_channel_id(&self, id: &ChannelId) -> Result<Channel, StorageError> {
        let id = id.clone();
        self.transactional(move |channels| {
            channels
                .iter()
                .find(|c| c.channel_id == id)
                .cloned()
                .ok_or(StorageError::ChannelNotFound(id))
        })
        .await
    }

    async fn save_channel(&self, channel: &Channel) -> Result<(), StorageError> {
        let channel = channel.clone();
        self.transactional(move |channels| {
            if channels.iter().any(|c| c.channel_id == channel.channel_id) {
                return Err(StorageError::ChannelAlreadyExists(channel.channel_id));
            }
            channels.push(channel);
            Ok(())
        })
        .await
    }

    async fn update_page_token(&self, channel: &Channel) -> Result<(), StorageError> {
        let incoming = channel.clone();
        self.transactional(move |channels| {
            let stored = channels
                .iter_mut()
                .find(|c| c.channel_id == incoming.channel_id)
                .ok_or_else(|| StorageError::ChannelNotFound(incoming.channel_id.clone()))?;
            if stored.updated_at >= incoming.updated_at {
                return Err(StorageError::PreconditionFailed(incoming.channel_id));
            }
            debug!(
                channel_id = %stored.channel_id,
                old_page_token = %stored.page_token,
                new_page_token = %incoming.page_token,
                "update page token"
            );
            stored.page_token = incoming.page_token;
            stored.updated_at = incoming.updated_at;
            Ok(())
        })
        .await
    }

    async fn delete_channel(&self, channel: &Channel) -> Result<(), StorageError> {
        let id = channel.channel_id.clone();
        self.transactional(move |channels| {
            let before = channels.len();
            channels.retain(|c| c.channel_id != id);
            if channels.len() == before {
                return Err(StorageError::ChannelNotFound(id));
            }
            Ok(())
        })
        .await
    }
}
