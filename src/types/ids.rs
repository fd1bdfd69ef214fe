//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., using a
//! ResourceId where a ChannelId is expected) and make the code more
//! self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A notification channel identifier.
///
/// Chosen by this system at subscription time; a UUIDv4 string, globally
/// unique across the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(s: impl Into<String>) -> Self {
        ChannelId(s.into())
    }

    /// Generates a fresh random channel id.
    pub fn generate() -> Self {
        ChannelId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        ChannelId(s)
    }
}

/// The sentinel drive id denoting "the user's own drive plus untethered files".
pub const DEFAULT_DRIVE_ID: &str = "__default__";

/// Display name used for the default drive scope in operator listings.
pub const DEFAULT_DRIVE_NAME: &str = "My Drive and Individual Files";

/// A drive scope identifier.
///
/// Either a shared drive id, or the sentinel [`DEFAULT_DRIVE_ID`] for the
/// user's own drive plus untethered files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriveId(pub String);

impl DriveId {
    pub fn new(s: impl Into<String>) -> Self {
        DriveId(s.into())
    }

    /// Returns the sentinel scope for the user's own drive.
    pub fn default_drive() -> Self {
        DriveId(DEFAULT_DRIVE_ID.to_string())
    }

    /// True if this is the `__default__` sentinel scope.
    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_DRIVE_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DriveId {
    fn from(s: String) -> Self {
        DriveId(s)
    }
}

/// The opaque resource identifier returned by the upstream service at
/// subscription time. Required to stop the channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn new(s: impl Into<String>) -> Self {
        ResourceId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
