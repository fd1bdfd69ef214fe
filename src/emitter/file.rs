//! File emitter: newline-delimited JSON records appended to a local file.
//!
//! Suitable for development and debugging. Encoding is best-effort per
//! record: a failure on one record is logged and remembered as the last
//! error while subsequent records still attempt.

use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::types::{Channel, Detail};

use super::{EmitError, Notification};

/// Emitter appending NDJSON records to a configured file.
#[derive(Debug, Clone)]
pub struct FileNotification {
    event_file: PathBuf,
}

impl FileNotification {
    pub fn new(event_file: impl Into<PathBuf>) -> Self {
        FileNotification {
            event_file: event_file.into(),
        }
    }
}

#[async_trait]
impl Notification for FileNotification {
    async fn send_changes(&self, _channel: &Channel, details: &[Detail]) -> Result<(), EmitError> {
        if details.is_empty() {
            return Ok(());
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.event_file)
            .map_err(|err| {
                warn!(
                    event_file = %self.event_file.display(),
                    error = %err,
                    "cannot open notification event file"
                );
                EmitError::Io(err)
            })?;

        info!(event_file = %self.event_file.display(), "writing change events");
        let mut last_err: Option<EmitError> = None;
        for detail in details {
            let (change_type, file_id, drive_id) = match &detail.change {
                Some(c) => (c.change_type.as_str(), c.file_id.as_str(), c.drive_id.as_str()),
                None => ("", "", ""),
            };
            debug!(
                change_type = %dash_if_empty(change_type),
                file_id = %dash_if_empty(file_id),
                drive_id = %dash_if_empty(drive_id),
                "writing change event"
            );
            let line = match serde_json::to_vec(detail) {
                Ok(line) => line,
                Err(err) => {
                    warn!(error = %err, "event record encode failed");
                    last_err = Some(EmitError::Encode(err));
                    continue;
                }
            };
            if let Err(err) = file.write_all(&line).and_then(|_| file.write_all(b"\n")) {
                warn!(error = %err, "event record write failed");
                last_err = Some(EmitError::Io(err));
            }
        }
        match last_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn dash_if_empty(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Change, ChannelId, DriveId, ResourceId};
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn channel() -> Channel {
        let t = Utc.with_ymd_and_hms(2022, 6, 15, 0, 0, 0).unwrap();
        Channel {
            channel_id: ChannelId::new("c1"),
            drive_id: DriveId::new("d1"),
            page_token: "0".to_string(),
            resource_id: ResourceId::new("r"),
            expiration: t,
            page_token_fetched_at: t,
            created_at: t,
            updated_at: t,
        }
    }

    fn detail(subject: &str) -> Detail {
        Detail {
            subject: subject.to_string(),
            change: Some(Change {
                change_type: "file".to_string(),
                file_id: "F".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn appends_one_line_per_detail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.json");
        let emitter = FileNotification::new(&path);

        emitter
            .send_changes(&channel(), &[detail("one"), detail("two")])
            .await
            .unwrap();
        emitter
            .send_changes(&channel(), &[detail("three")])
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["subject"], "one");
        let third: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(third["subject"], "three");
    }

    #[tokio::test]
    async fn empty_details_creates_no_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.json");
        let emitter = FileNotification::new(&path);

        emitter.send_changes(&channel(), &[]).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn unwritable_path_is_an_io_error() {
        let emitter = FileNotification::new("/nonexistent-dir/events.json");
        let err = emitter
            .send_changes(&channel(), &[detail("x")])
            .await
            .unwrap_err();
        assert!(matches!(err, EmitError::Io(_)));
    }
}
