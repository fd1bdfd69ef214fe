//! Wire types for the Drive API v3 surface this system touches.
//!
//! The API formats int64 fields (`size`, `version`, `expiration`) as decimal
//! strings in JSON; [`i64_from_string_or_number`] accepts either so fixtures
//! can use plain numbers.

use serde::{Deserialize, Deserializer, Serialize};

/// Deserializes an i64 that may arrive as a JSON string or number.
pub fn i64_from_string_or_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Str(String),
    }
    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(0),
        Some(Raw::Num(n)) => Ok(n),
        Some(Raw::Str(s)) => {
            if s.is_empty() {
                Ok(0)
            } else {
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    }
}

/// Response of `changes.getStartPageToken`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPageTokenResponse {
    pub start_page_token: String,
}

/// Request body of `changes.watch` (a Channel resource).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub channel_type: String,
    pub address: String,
    /// Requested expiration, epoch milliseconds.
    pub expiration: i64,
    pub payload: bool,
}

/// Response of `changes.watch`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchResponse {
    pub resource_id: String,
    #[serde(default)]
    pub resource_uri: String,
    /// Granted expiration, epoch milliseconds. The server may shorten the
    /// requested lifetime.
    #[serde(default, deserialize_with = "i64_from_string_or_number")]
    pub expiration: i64,
}

/// Request body of `channels.stop`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    pub id: String,
    pub resource_id: String,
}

/// Response of `changes.list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeListResponse {
    #[serde(default)]
    pub changes: Vec<WireChange>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub new_start_page_token: Option<String>,
}

/// A single change entry as returned by `changes.list`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireChange {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub change_type: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub file_id: String,
    #[serde(default)]
    pub file: Option<WireFile>,
    #[serde(default)]
    pub drive_id: String,
    #[serde(default)]
    pub drive: Option<WireDrive>,
}

/// File metadata within a change, limited to the pinned field projection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFile {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub drive_id: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub created_time: String,
    #[serde(default)]
    pub modified_time: String,
    #[serde(default)]
    pub trashed: bool,
    #[serde(default)]
    pub trashed_time: String,
    #[serde(default)]
    pub last_modifying_user: Option<WireUser>,
    #[serde(default)]
    pub trashing_user: Option<WireUser>,
    #[serde(default, deserialize_with = "i64_from_string_or_number")]
    pub version: i64,
    #[serde(default, deserialize_with = "i64_from_string_or_number")]
    pub size: i64,
    #[serde(default)]
    pub md5_checksum: String,
    #[serde(default)]
    pub parents: Vec<String>,
}

/// A drive user.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireUser {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email_address: String,
    #[serde(default)]
    pub photo_link: String,
    #[serde(default)]
    pub me: bool,
    #[serde(default)]
    pub permission_id: String,
}

/// Shared-drive metadata within a change or listing.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireDrive {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub theme_id: String,
    #[serde(default)]
    pub org_unit_id: String,
    #[serde(default)]
    pub created_time: String,
    #[serde(default)]
    pub hidden: bool,
}

/// Response of `drives.list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveListResponse {
    #[serde(default)]
    pub drives: Vec<WireDrive>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Body, content type and length of a file download or export.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub body: bytes::Bytes,
    pub content_type: String,
    pub size: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_list_deserializes_api_shape() {
        let json = r#"{
            "newStartPageToken": "1",
            "changes": [{
                "kind": "drive#change",
                "changeType": "file",
                "time": "2022-06-15T00:03:55.849Z",
                "fileId": "XXXXXXXXXX",
                "file": {
                    "id": "XXXXXXXXXX",
                    "name": "gdnotify",
                    "mimeType": "application/vnd.google-apps.spreadsheet",
                    "modifiedTime": "2022-06-15T00:03:45.843Z",
                    "lastModifyingUser": {"displayName": "hoge", "kind": "drive#user"},
                    "version": "20",
                    "size": "1500"
                }
            }]
        }"#;
        let resp: ChangeListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.new_start_page_token.as_deref(), Some("1"));
        assert!(resp.next_page_token.is_none());
        let change = &resp.changes[0];
        assert_eq!(change.change_type, "file");
        let file = change.file.as_ref().unwrap();
        assert_eq!(file.version, 20);
        assert_eq!(file.size, 1500);
        assert_eq!(
            file.last_modifying_user.as_ref().unwrap().display_name,
            "hoge"
        );
    }

    #[test]
    fn int64_fields_accept_plain_numbers() {
        let json = r#"{"id": "F", "size": 1500, "version": 20}"#;
        let file: WireFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.size, 1500);
        assert_eq!(file.version, 20);
    }

    #[test]
    fn watch_request_serializes_type_field() {
        let req = WatchRequest {
            id: "c1".to_string(),
            channel_type: "web_hook".to_string(),
            address: "https://example.com/".to_string(),
            expiration: 1_700_000_000_000,
            payload: true,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "web_hook");
        assert_eq!(json["expiration"], 1_700_000_000_000i64);
    }

    #[test]
    fn empty_change_entry_tolerated() {
        let change: WireChange = serde_json::from_str("{}").unwrap();
        assert_eq!(change.change_type, "");
        assert!(change.file.is_none());
    }
}
