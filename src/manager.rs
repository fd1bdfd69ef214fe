//! Channel lifecycle management: create, rotate, delete, and the periodic
//! maintenance pass that keeps every drive scope covered.
//!
//! Concurrency model: channel creations for distinct drives run in
//! parallel, rotations for distinct drives run in parallel, and within one
//! drive rotation is sequential (at most one rotation in flight per drive).

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::store::{Storage, StorageError};
use crate::types::{Channel, ChannelId, DriveId, ResourceId, DEFAULT_DRIVE_ID, DEFAULT_DRIVE_NAME};
use crate::upstream::{DriveClient, UpstreamError, WireDrive};

/// How long a fetched drive listing stays fresh.
const DRIVES_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// A start page token older than this is re-acquired during rotation.
const PAGE_TOKEN_REFRESH_DAYS: i64 = 90;

/// Errors from lifecycle operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// `maintain` refuses to run without a webhook address to register.
    #[error("webhook address is empty")]
    EmptyWebhookAddress,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// A parallel phase failed; carries the first error observed.
    #[error("{phase}: {message}")]
    Phase { phase: &'static str, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The webhook address channels are registered with. Empty until configured
/// or auto-detected from the first inbound request; set once, read many.
#[derive(Debug, Clone, Default)]
pub struct WebhookAddress {
    inner: Arc<StdMutex<String>>,
}

impl WebhookAddress {
    pub fn new(address: impl Into<String>) -> Self {
        WebhookAddress {
            inner: Arc::new(StdMutex::new(address.into())),
        }
    }

    pub fn get(&self) -> String {
        self.inner.lock().expect("webhook address lock").clone()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("webhook address lock").is_empty()
    }

    /// Sets the address only when still empty. Returns whether this call
    /// set it.
    pub fn set_if_empty(&self, address: impl Into<String>) -> bool {
        let mut guard = self.inner.lock().expect("webhook address lock");
        if guard.is_empty() {
            *guard = address.into();
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Default)]
struct DrivesCache {
    drives: Vec<WireDrive>,
    fetched_at: Option<Instant>,
}

/// Creates, rotates, deletes and enumerates notification channels.
pub struct ChannelManager {
    store: Arc<dyn Storage>,
    drive: DriveClient,
    webhook: WebhookAddress,
    /// Requested channel lifetime.
    expiration: chrono::Duration,
    /// Channels within this much of expiry are rotation targets
    /// (20% of the configured expiration).
    rotate_remaining: chrono::Duration,
    drives_cache: Mutex<DrivesCache>,
}

impl ChannelManager {
    pub fn new(
        store: Arc<dyn Storage>,
        drive: DriveClient,
        webhook: WebhookAddress,
        expiration: chrono::Duration,
    ) -> Self {
        let rotate_remaining = expiration / 5;
        debug!(
            expiration = %expiration,
            rotate_remaining = %rotate_remaining,
            "channel manager configured"
        );
        ChannelManager {
            store,
            drive,
            webhook,
            expiration,
            rotate_remaining,
            drives_cache: Mutex::new(DrivesCache::default()),
        }
    }

    pub fn rotate_remaining(&self) -> chrono::Duration {
        self.rotate_remaining
    }

    pub fn webhook(&self) -> &WebhookAddress {
        &self.webhook
    }

    /// Enumerates drive scopes: the `__default__` sentinel plus every shared
    /// drive visible upstream. Results are cached for five minutes.
    pub async fn drives(&self) -> Result<Vec<WireDrive>, ManagerError> {
        let mut cache = self.drives_cache.lock().await;
        if let Some(fetched_at) = cache.fetched_at {
            if fetched_at.elapsed() < DRIVES_CACHE_TTL {
                return Ok(cache.drives.clone());
            }
        }

        let mut drives = vec![WireDrive {
            id: DEFAULT_DRIVE_ID.to_string(),
            name: DEFAULT_DRIVE_NAME.to_string(),
            ..Default::default()
        }];
        let mut page_token: Option<String> = None;
        loop {
            let page = self.drive.drives_list(page_token.as_deref()).await?;
            drives.extend(page.drives);
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }
        drives.sort_by(|a, b| a.id.cmp(&b.id));
        drives.dedup_by(|a, b| a.id == b.id);

        cache.drives = drives.clone();
        cache.fetched_at = Some(Instant::now());
        Ok(drives)
    }

    /// Creates a channel for `drive_id` from a fresh start page token.
    pub async fn create_channel(&self, drive_id: &DriveId) -> Result<Channel, ManagerError> {
        let token = self.drive.get_start_page_token(drive_id).await?;
        self.create_internal(ChannelSeed {
            drive_id: drive_id.clone(),
            page_token: token,
            page_token_fetched_at: None,
        })
        .await
    }

    /// Registers a new subscription and persists its record: fresh UUID,
    /// `watch` with the system's webhook address, server-granted expiration
    /// copied back, then a create-if-not-exists save.
    async fn create_internal(&self, seed: ChannelSeed) -> Result<Channel, ManagerError> {
        let now = Utc::now();
        let mut channel = Channel {
            channel_id: ChannelId::generate(),
            drive_id: seed.drive_id,
            page_token: seed.page_token,
            resource_id: ResourceId::default(),
            expiration: now + self.expiration,
            page_token_fetched_at: seed.page_token_fetched_at.unwrap_or(now),
            created_at: now,
            updated_at: now,
        };

        let address = self.webhook.get();
        let resp = self
            .drive
            .watch(
                &channel.drive_id,
                &channel.page_token,
                &channel.channel_id,
                &address,
                channel.expiration.timestamp_millis(),
            )
            .await?;
        channel.resource_id = ResourceId::new(resp.resource_id);
        if resp.expiration > 0 {
            // The server may grant a shorter lifetime than requested.
            if let Some(granted) = Utc.timestamp_millis_opt(resp.expiration).single() {
                channel.expiration = granted;
            }
        }
        info!(
            channel_id = %channel.channel_id,
            resource_id = %channel.resource_id,
            drive_id = %channel.drive_id,
            page_token = %channel.page_token,
            resource_uri = %resp.resource_uri,
            expiration = %channel.expiration,
            "created channel"
        );

        self.store.save_channel(&channel).await?;
        Ok(channel)
    }

    /// Stops the subscription and removes the store record. A subscription
    /// that is already gone upstream (NotFound) still has its record
    /// removed; a record that is already gone counts as done.
    pub async fn delete_channel(&self, channel: &Channel) -> Result<(), ManagerError> {
        info!(
            channel_id = %channel.channel_id,
            resource_id = %channel.resource_id,
            drive_id = %channel.drive_id,
            page_token = %channel.page_token,
            "deleting channel"
        );
        match self
            .drive
            .channels_stop(&channel.channel_id, &channel.resource_id)
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                warn!(
                    channel_id = %channel.channel_id,
                    resource_id = %channel.resource_id,
                    "channel already stopped upstream, removing record anyway"
                );
            }
            Err(err) => return Err(err.into()),
        }
        match self.store.delete_channel(channel).await {
            Ok(()) => Ok(()),
            Err(StorageError::ChannelNotFound(_)) => {
                debug!(channel_id = %channel.channel_id, "channel record already removed");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Brings up a replacement channel, then tears down the old one.
    /// Create-before-delete: a create failure aborts the rotation with the
    /// old channel intact; a teardown failure is surfaced after the
    /// replacement is already active.
    pub async fn rotate_channel(&self, channel: &Channel) -> Result<Channel, ManagerError> {
        info!(
            channel_id = %channel.channel_id,
            resource_id = %channel.resource_id,
            drive_id = %channel.drive_id,
            "rotating channel"
        );
        let now = Utc::now();
        let mut seed = ChannelSeed {
            drive_id: channel.drive_id.clone(),
            page_token: channel.page_token.clone(),
            page_token_fetched_at: Some(channel.page_token_fetched_at),
        };
        if now - channel.page_token_fetched_at >= chrono::Duration::days(PAGE_TOKEN_REFRESH_DAYS) {
            info!(
                channel_id = %channel.channel_id,
                drive_id = %channel.drive_id,
                "page token is over ninety days old, re-acquiring"
            );
            match self.drive.get_start_page_token(&channel.drive_id).await {
                Ok(token) => {
                    seed.page_token = token;
                    seed.page_token_fetched_at = Some(now);
                }
                Err(err) => {
                    error!(
                        channel_id = %channel.channel_id,
                        drive_id = %channel.drive_id,
                        error = %err,
                        "re-acquiring the page token failed"
                    );
                    warn!(
                        channel_id = %channel.channel_id,
                        "continuing rotation with the stale page token"
                    );
                }
            }
        }

        let replacement = match self.create_internal(seed).await {
            Ok(replacement) => replacement,
            Err(err) => {
                error!(
                    channel_id = %channel.channel_id,
                    drive_id = %channel.drive_id,
                    error = %err,
                    "rotation create failed"
                );
                return Err(err);
            }
        };
        info!(
            old_channel_id = %channel.channel_id,
            new_channel_id = %replacement.channel_id,
            drive_id = %channel.drive_id,
            "rotation replacement active"
        );
        if let Err(err) = self.delete_channel(channel).await {
            error!(
                channel_id = %channel.channel_id,
                error = %err,
                "failed to delete the rotated-out channel"
            );
            return Err(err);
        }
        Ok(replacement)
    }

    /// The maintenance pass:
    /// 1. every known drive scope gets a channel if it has none,
    /// 2. drives whose channels are all about to expire get one rotation
    ///    (and best-effort teardown of the surplus),
    /// 3. channels for drives no longer visible upstream are deleted.
    pub async fn maintain(&self) -> Result<(), ManagerError> {
        if self.webhook.is_empty() {
            return Err(ManagerError::EmptyWebhookAddress);
        }

        let mut rx = self.store.find_all_channels().await?;
        let drives = self.drives().await?;
        let mut coverage: HashMap<String, bool> = drives
            .iter()
            .map(|d| (d.id.clone(), false))
            .collect();
        let mut revoked: Vec<String> = Vec::new();
        let mut by_drive: HashMap<String, Vec<Channel>> = HashMap::new();

        let now = Utc::now();
        while let Some(batch) = rx.recv().await {
            for channel in batch {
                info!(
                    channel_id = %channel.channel_id,
                    drive_id = %channel.drive_id,
                    expiration = %channel.expiration,
                    created_at = %channel.created_at,
                    state = ?channel.state(now, self.rotate_remaining),
                    "found channel"
                );
                match coverage.get_mut(channel.drive_id.as_str()) {
                    Some(covered) => *covered = true,
                    None => revoked.push(channel.drive_id.as_str().to_string()),
                }
                by_drive
                    .entry(channel.drive_id.as_str().to_string())
                    .or_default()
                    .push(channel);
            }
        }

        // Phase 1: new channels for uncovered drives, in parallel.
        let creations = coverage
            .iter()
            .filter(|(_, covered)| !**covered)
            .map(|(drive_id, _)| {
                let drive_id = DriveId::new(drive_id.clone());
                async move {
                    info!(drive_id = %drive_id, "no channel for drive, creating");
                    self.create_channel(&drive_id).await.map_err(|err| {
                        error!(drive_id = %drive_id, error = %err, "create channel failed");
                        format!("drive {drive_id}: {err}")
                    })
                }
            });
        let create_errors: Vec<String> = join_all(creations)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();

        // Phase 2: rotations, one per drive in parallel.
        let rotations = by_drive.iter().filter_map(|(drive_id, channels)| {
            let mut targets: Vec<&Channel> = Vec::new();
            let mut fresh_exists = false;
            for channel in channels {
                if channel.is_about_to_expire(now, self.rotate_remaining) {
                    targets.push(channel);
                } else {
                    fresh_exists = true;
                }
            }
            if fresh_exists || targets.is_empty() {
                // A channel with plenty of lifetime left covers this drive.
                return None;
            }
            let drive_id = drive_id.clone();
            let (rotate_target, surplus): (Channel, Vec<Channel>) = {
                let mut iter = targets.into_iter().cloned();
                let first = iter.next()?;
                (first, iter.collect())
            };
            Some(async move {
                info!(drive_id = %drive_id, "rotating drive coverage");
                self.rotate_channel(&rotate_target)
                    .await
                    .map_err(|err| format!("drive {drive_id}: {err}"))?;
                for channel in &surplus {
                    if let Err(err) = self.delete_channel(channel).await {
                        warn!(
                            drive_id = %drive_id,
                            channel_id = %channel.channel_id,
                            resource_id = %channel.resource_id,
                            error = %err,
                            "surplus channel cleanup failed"
                        );
                    }
                }
                Ok::<(), String>(())
            })
        });
        let rotate_errors: Vec<String> = join_all(rotations)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();

        // Phase 3: drives that disappeared upstream lose their channels.
        let deletions = revoked.iter().filter_map(|drive_id| {
            let channels = by_drive.get(drive_id)?;
            let drive_id = drive_id.clone();
            Some(async move {
                info!(drive_id = %drive_id, "drive no longer listed, deleting its channels");
                for channel in channels {
                    match self.delete_channel(channel).await {
                        Ok(()) => info!(
                            drive_id = %drive_id,
                            channel_id = %channel.channel_id,
                            resource_id = %channel.resource_id,
                            "deleted channel"
                        ),
                        Err(err) => warn!(
                            drive_id = %drive_id,
                            channel_id = %channel.channel_id,
                            resource_id = %channel.resource_id,
                            error = %err,
                            "delete channel failed"
                        ),
                    }
                }
            })
        });
        join_all(deletions).await;

        if let Some(message) = create_errors.into_iter().next() {
            return Err(ManagerError::Phase {
                phase: "create",
                message,
            });
        }
        if let Some(message) = rotate_errors.into_iter().next() {
            return Err(ManagerError::Phase {
                phase: "rotate",
                message,
            });
        }
        Ok(())
    }

    /// Deletes every stored channel. Operator teardown; failures are logged
    /// and the pass continues.
    pub async fn cleanup(&self) -> Result<(), ManagerError> {
        let mut rx = self.store.find_all_channels().await?;
        while let Some(batch) = rx.recv().await {
            for channel in batch {
                info!(
                    channel_id = %channel.channel_id,
                    drive_id = %channel.drive_id,
                    expiration = %channel.expiration,
                    "cleaning up channel"
                );
                if let Err(err) = self.delete_channel(&channel).await {
                    warn!(
                        channel_id = %channel.channel_id,
                        resource_id = %channel.resource_id,
                        drive_id = %channel.drive_id,
                        error = %err,
                        "cleanup delete failed"
                    );
                }
            }
        }
        Ok(())
    }

    /// Renders every stored channel with its drive name, for operators.
    pub async fn list(&self, out: &mut dyn std::io::Write) -> Result<(), ManagerError> {
        let mut rx = self.store.find_all_channels().await?;
        let drives = match self.drives().await {
            Ok(drives) => drives,
            Err(err) => {
                warn!(error = %err, "drive listing failed, falling back to the default scope");
                vec![WireDrive {
                    id: DEFAULT_DRIVE_ID.to_string(),
                    name: DEFAULT_DRIVE_NAME.to_string(),
                    ..Default::default()
                }]
            }
        };
        let name_by_id: HashMap<&str, &str> = drives
            .iter()
            .map(|d| (d.id.as_str(), d.name.as_str()))
            .collect();
        let mut listed: HashMap<String, bool> =
            drives.iter().map(|d| (d.id.clone(), false)).collect();

        writeln!(
            out,
            "{:<38} {:<22} {:<30} {:<12} {:<25} {:<15} {:<25} {:<25} {:<25}",
            "Channel ID",
            "Drive ID",
            "Drive Name",
            "Page Token",
            "Expiration",
            "Resource ID",
            "Page Token Fetched At",
            "Created At",
            "Updated At"
        )?;
        while let Some(batch) = rx.recv().await {
            for channel in batch {
                if let Some(seen) = listed.get_mut(channel.drive_id.as_str()) {
                    *seen = true;
                }
                let drive_name = name_by_id
                    .get(channel.drive_id.as_str())
                    .copied()
                    .unwrap_or("-");
                writeln!(
                    out,
                    "{:<38} {:<22} {:<30} {:<12} {:<25} {:<15} {:<25} {:<25} {:<25}",
                    channel.channel_id,
                    channel.drive_id,
                    drive_name,
                    channel.page_token,
                    channel.expiration.to_rfc3339(),
                    channel.resource_id,
                    channel.page_token_fetched_at.to_rfc3339(),
                    channel.created_at.to_rfc3339(),
                    channel.updated_at.to_rfc3339(),
                )?;
            }
        }
        // Drives with no channel yet show as uncovered.
        for (drive_id, seen) in listed {
            if seen {
                continue;
            }
            writeln!(
                out,
                "{:<38} {:<22} {:<30} {:<12} {:<25} {:<15} {:<25} {:<25} {:<25}",
                "-",
                drive_id,
                name_by_id.get(drive_id.as_str()).copied().unwrap_or("-"),
                "-",
                "-",
                "-",
                "-",
                "-",
                "-",
            )?;
        }
        Ok(())
    }
}

/// Inputs to `create_internal`: the scope, the cursor to watch from, and
/// optionally when that cursor was freshly acquired.
struct ChannelSeed {
    drive_id: DriveId,
    page_token: String,
    page_token_fetched_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelManager")
            .field("expiration", &self.expiration)
            .field("rotate_remaining", &self.rotate_remaining)
            .finish_non_exhaustive()
    }
}
