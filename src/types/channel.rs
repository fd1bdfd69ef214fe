//! The durable channel record.
//!
//! A `Channel` is a server-side subscription to changes on a drive scope. It
//! is created by the channel manager, its page token is advanced by the
//! change puller, and it is destroyed by the channel manager once a
//! replacement is active or its drive scope disappears.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ChannelId, DriveId, ResourceId};

/// A durable notification channel record, keyed by [`ChannelId`].
///
/// Invariants (enforced by the storage layer):
/// - `channel_id` is unique across the fleet (create-if-not-exists on save).
/// - `page_token` is monotonic within a channel: updates only succeed when
///   the incoming `updated_at` is strictly greater than the stored one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Locally generated UUIDv4 identifying this subscription.
    pub channel_id: ChannelId,

    /// The drive scope this channel watches.
    pub drive_id: DriveId,

    /// Opaque monotonic cursor into the drive's change log; used on the
    /// next pull.
    pub page_token: String,

    /// Server-issued identifier needed to stop the subscription.
    pub resource_id: ResourceId,

    /// When the subscription ceases to deliver (millisecond precision).
    pub expiration: DateTime<Utc>,

    /// When the page token was last freshly acquired from the service, as
    /// opposed to plain cursor advances during pulls.
    pub page_token_fetched_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    /// True when the channel is within `remaining` of its expiration and
    /// should be rotated.
    pub fn is_about_to_expire(&self, now: DateTime<Utc>, remaining: chrono::Duration) -> bool {
        self.expiration - now <= remaining
    }

    /// Classifies the stored record as the rotation pass sees it.
    /// `Creating`, `Draining` and `Revoked` are transitions driven by the
    /// manager, not observable from the record alone.
    pub fn state(&self, now: DateTime<Utc>, rotate_remaining: chrono::Duration) -> ChannelState {
        if self.expiration < now {
            ChannelState::Expired
        } else if self.is_about_to_expire(now, rotate_remaining) {
            ChannelState::Rotating
        } else {
            ChannelState::Active
        }
    }
}

/// Lifecycle state of a channel, as observed by the rotation pass.
///
/// `∅ → Creating → Active → (Rotating → Draining → ∅)`, with `Expired` and
/// `Revoked` as terminal exits from `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// `watch` has been issued but the record is not yet persisted.
    Creating,
    /// Persisted and receiving pokes.
    Active,
    /// Chosen as the rotation target for its drive.
    Rotating,
    /// A replacement is active; this channel awaits stop + delete.
    Draining,
    /// Expiration passed with no replacement.
    Expired,
    /// The drive scope disappeared from the upstream listing.
    Revoked,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn channel_expiring_at(expiration: DateTime<Utc>) -> Channel {
        let created = Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).unwrap();
        Channel {
            channel_id: ChannelId::new("c1"),
            drive_id: DriveId::new("d1"),
            page_token: "100".to_string(),
            resource_id: ResourceId::new("r1"),
            expiration,
            page_token_fetched_at: created,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn about_to_expire_within_remaining() {
        let now = Utc.with_ymd_and_hms(2022, 6, 7, 0, 0, 0).unwrap();
        let ch = channel_expiring_at(now + Duration::hours(10));
        assert!(ch.is_about_to_expire(now, Duration::hours(24)));
    }

    #[test]
    fn not_about_to_expire_outside_remaining() {
        let now = Utc.with_ymd_and_hms(2022, 6, 7, 0, 0, 0).unwrap();
        let ch = channel_expiring_at(now + Duration::hours(48));
        assert!(!ch.is_about_to_expire(now, Duration::hours(24)));
    }

    #[test]
    fn already_expired_counts_as_about_to_expire() {
        let now = Utc.with_ymd_and_hms(2022, 6, 7, 0, 0, 0).unwrap();
        let ch = channel_expiring_at(now - Duration::hours(1));
        assert!(ch.is_about_to_expire(now, Duration::hours(24)));
    }

    #[test]
    fn boundary_is_inclusive() {
        let now = Utc.with_ymd_and_hms(2022, 6, 7, 0, 0, 0).unwrap();
        let ch = channel_expiring_at(now + Duration::hours(24));
        // expiration - now == remaining  →  rotate
        assert!(ch.is_about_to_expire(now, Duration::hours(24)));
    }

    #[test]
    fn state_classification() {
        let now = Utc.with_ymd_and_hms(2022, 6, 7, 0, 0, 0).unwrap();
        let remaining = Duration::hours(24);

        let fresh = channel_expiring_at(now + Duration::hours(100));
        assert_eq!(fresh.state(now, remaining), ChannelState::Active);

        let near_expiry = channel_expiring_at(now + Duration::hours(10));
        assert_eq!(near_expiry.state(now, remaining), ChannelState::Rotating);

        let lapsed = channel_expiring_at(now - Duration::hours(1));
        assert_eq!(lapsed.state(now, remaining), ChannelState::Expired);
    }
}
