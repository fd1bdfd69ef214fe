//! Incremental change pulling with durable page-token advancement.
//!
//! Given a channel, pages through the upstream change log from the stored
//! cursor, then advances the cursor with a conditional write. Concurrent
//! pulls on the same channel are resolved by the store's monotonicity check:
//! exactly one pull's advance takes effect, and the loser's work is
//! discarded (re-readable from the unchanged token on the next trigger).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::store::{Storage, StorageError};
use crate::types::Channel;
use crate::upstream::{DriveClient, UpstreamError, WireChange};

/// Pause between change-list pages. Bounds upstream QPS; a design
/// parameter, not a retry backoff.
const PAGE_PACING: Duration = Duration::from_millis(200);

/// Errors from a pull.
#[derive(Debug, Error)]
pub enum PullError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl PullError {
    /// True when the pull failed because the channel record is gone.
    pub fn is_channel_not_found(&self) -> bool {
        matches!(self, PullError::Storage(StorageError::ChannelNotFound(_)))
    }
}

/// Pages through changes and advances page tokens.
#[derive(Clone)]
pub struct ChangePuller {
    store: Arc<dyn Storage>,
    drive: DriveClient,
}

impl ChangePuller {
    pub fn new(store: Arc<dyn Storage>, drive: DriveClient) -> Self {
        ChangePuller { store, drive }
    }

    /// Pulls everything since `channel`'s stored token and advances the
    /// token. Returns the collected changes and the channel as persisted.
    ///
    /// Any page error aborts the pull with collected changes discarded; the
    /// token has not advanced, so the next trigger re-reads them. A lost
    /// conditional update (concurrent pull already advanced the token) is
    /// silent: the changes are discarded and the original channel returned.
    pub async fn pull(&self, channel: &Channel) -> Result<(Vec<WireChange>, Channel), PullError> {
        let mut collected: Vec<WireChange> = Vec::new();
        let mut token = channel.page_token.clone();
        let mut new_start = String::new();

        loop {
            let page = self.drive.changes_list(&channel.drive_id, &token).await?;
            debug!(
                channel_id = %channel.channel_id,
                drive_id = %channel.drive_id,
                page_token = %token,
                changes = page.changes.len(),
                "changes list page"
            );
            collected.extend(page.changes);
            // Overwritten every page; the final page's value wins.
            if let Some(start) = page.new_start_page_token {
                new_start = start;
            }
            match page.next_page_token {
                Some(next) if !next.is_empty() => {
                    tokio::time::sleep(PAGE_PACING).await;
                    token = next;
                }
                _ => break,
            }
        }

        if new_start.is_empty() {
            // The upstream did not return a fresh cursor; leave the stored
            // token alone so the next pull retries from the same position.
            warn!(
                channel_id = %channel.channel_id,
                "no new start page token returned, keeping cursor"
            );
            return Ok((collected, channel.clone()));
        }

        info!(
            channel_id = %channel.channel_id,
            old_page_token = %channel.page_token,
            new_page_token = %new_start,
            "page token refresh"
        );
        let mut advanced = channel.clone();
        advanced.page_token = new_start;
        advanced.updated_at = Utc::now();
        match self.store.update_page_token(&advanced).await {
            Ok(()) => Ok((collected, advanced)),
            Err(StorageError::PreconditionFailed(_)) => {
                // A concurrent pull advanced the token first. Monotonic
                // wins, loser silent: drop this pull's results.
                debug!(
                    channel_id = %channel.channel_id,
                    "page token already advanced by a concurrent pull, discarding results"
                );
                Ok((Vec::new(), channel.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }
}
