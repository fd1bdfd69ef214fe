//! Emitted event payload types.
//!
//! These are the JSON shapes that downstream consumers of the event bus
//! unmarshal. Field names are fixed camelCase; `actor` always serializes
//! `kind`, `displayName` and `emailAddress`, even when empty, so consumers
//! can rely on their presence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The event detail payload attached to every emitted event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detail {
    /// Human-readable sentence describing the change.
    pub subject: String,

    /// The file or drive that changed.
    pub entity: Option<Entity>,

    /// The user who effected the change. Synthesized as an "Unknown User"
    /// when the upstream payload names nobody.
    pub actor: Option<User>,

    /// The full change object as received from the upstream.
    pub change: Option<Change>,

    /// Present only when the rule-based copier stored the object.
    #[serde(rename = "s3Copy", skip_serializing_if = "Option::is_none")]
    pub s3_copy: Option<S3Copy>,
}

/// The file or drive that was changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "createdTime", default, skip_serializing_if = "String::is_empty")]
    pub created_time: String,
}

/// A drive user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub kind: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "emailAddress", default)]
    pub email_address: String,
    #[serde(rename = "photoLink", default, skip_serializing_if = "String::is_empty")]
    pub photo_link: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub me: bool,
    #[serde(rename = "permissionId", default, skip_serializing_if = "String::is_empty")]
    pub permission_id: String,
}

impl User {
    /// The fallback actor used when no user can be attributed to a change.
    pub fn unknown() -> Self {
        User {
            kind: "drive#user".to_string(),
            display_name: "Unknown User".to_string(),
            ..Default::default()
        }
    }
}

/// A change to a file or shared drive, as carried in the event detail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub kind: String,
    #[serde(rename = "changeType")]
    pub change_type: String,
    pub time: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub removed: bool,
    #[serde(rename = "fileId", default, skip_serializing_if = "String::is_empty")]
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<File>,
    #[serde(rename = "driveId", default, skip_serializing_if = "String::is_empty")]
    pub drive_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive: Option<Drive>,
}

/// A drive file as carried in the event detail.
///
/// `size` and `version` are decimal strings, empty when the upstream
/// reported zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub kind: String,
    pub id: String,
    pub name: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub size: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(rename = "createdTime", default, skip_serializing_if = "String::is_empty")]
    pub created_time: String,
    #[serde(rename = "modifiedTime", default, skip_serializing_if = "String::is_empty")]
    pub modified_time: String,
    #[serde(rename = "trashedTime", default, skip_serializing_if = "String::is_empty")]
    pub trashed_time: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub trashed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    #[serde(rename = "lastModifyingUser", default, skip_serializing_if = "Option::is_none")]
    pub last_modifying_user: Option<User>,
    #[serde(rename = "trashingUser", default, skip_serializing_if = "Option::is_none")]
    pub trashing_user: Option<User>,
}

/// A shared drive as carried in the event detail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Drive {
    pub kind: String,
    pub id: String,
    pub name: String,
    #[serde(rename = "createdTime", default, skip_serializing_if = "String::is_empty")]
    pub created_time: String,
}

/// Receipt for an object copied into the blob store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Copy {
    #[serde(rename = "s3Uri")]
    pub s3_uri: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
    pub size: i64,
    #[serde(rename = "copiedAt")]
    pub copied_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_user_shape() {
        let u = User::unknown();
        assert_eq!(u.kind, "drive#user");
        assert_eq!(u.display_name, "Unknown User");
        assert_eq!(u.email_address, "");
    }

    #[test]
    fn actor_serializes_empty_email() {
        let json = serde_json::to_value(User::unknown()).unwrap();
        // kind, displayName, emailAddress are always present
        assert_eq!(json["kind"], "drive#user");
        assert_eq!(json["displayName"], "Unknown User");
        assert_eq!(json["emailAddress"], "");
        // optional extras are omitted when empty
        assert!(json.get("photoLink").is_none());
        assert!(json.get("me").is_none());
    }

    #[test]
    fn s3_copy_omitted_when_absent() {
        let detail = Detail {
            subject: "x".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert!(json.get("s3Copy").is_none());
    }

    #[test]
    fn detail_round_trips() {
        let detail = Detail {
            subject: "File a (F) changed by u at T".to_string(),
            entity: Some(Entity {
                id: "F".to_string(),
                kind: "drive#file".to_string(),
                name: "a".to_string(),
                created_time: "2022-06-15T00:00:00Z".to_string(),
            }),
            actor: Some(User::unknown()),
            change: Some(Change {
                kind: "drive#change".to_string(),
                change_type: "file".to_string(),
                time: "2022-06-15T00:03:55.849Z".to_string(),
                file_id: "F".to_string(),
                ..Default::default()
            }),
            s3_copy: None,
        };
        let json = serde_json::to_string(&detail).unwrap();
        let back: Detail = serde_json::from_str(&json).unwrap();
        assert_eq!(back, detail);
    }

    #[test]
    fn file_size_and_version_are_strings() {
        let json = r#"{"kind":"drive#file","id":"X","name":"gdnotify",
            "mimeType":"application/vnd.google-apps.spreadsheet",
            "size":"1500","version":"20"}"#;
        let f: File = serde_json::from_str(json).unwrap();
        assert_eq!(f.size, "1500");
        assert_eq!(f.version, "20");
    }
}
