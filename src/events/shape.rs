//! Derivation of the emitted event from an upstream change.
//!
//! The `detail-type`, `source` suffix and subject sentence formats are part
//! of the external contract; downstream consumers filter on them.

use crate::types::{Change, Detail, Drive, DriveId, Entity, File, User};
use crate::upstream::{WireChange, WireDrive, WireFile, WireUser};

/// The closed set of emitted detail-types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailType {
    FileRemoved,
    FileTrashed,
    FileChanged,
    DriveRemoved,
    DriveChanged,
    Unexpected,
}

impl DetailType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetailType::FileRemoved => "File Removed",
            DetailType::FileTrashed => "File Move to trash",
            DetailType::FileChanged => "File Changed",
            DetailType::DriveRemoved => "Shared Drive Removed",
            DetailType::DriveChanged => "Drive Status Changed",
            DetailType::Unexpected => "Unexpected Changed",
        }
    }
}

impl std::fmt::Display for DetailType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a change into its detail-type.
pub fn detail_type(change: Option<&Change>) -> DetailType {
    let Some(change) = change else {
        return DetailType::Unexpected;
    };
    match change.change_type.as_str() {
        "file" => {
            if change.removed {
                DetailType::FileRemoved
            } else if change.file.as_ref().is_some_and(|f| f.trashed) {
                DetailType::FileTrashed
            } else {
                DetailType::FileChanged
            }
        }
        "drive" => {
            if change.removed {
                DetailType::DriveRemoved
            } else {
                DetailType::DriveChanged
            }
        }
        _ => DetailType::Unexpected,
    }
}

/// Builds the event source string: `oss.gdnotify/<drive>/<file|drive>/<id>`,
/// or `oss.gdnotify/<drive>/<changeType>` for unexpected change types.
pub fn event_source(drive_id: &DriveId, change: Option<&Change>) -> String {
    let prefix = format!("oss.gdnotify/{}", drive_id);
    let Some(change) = change else {
        return prefix;
    };
    match change.change_type.as_str() {
        "file" => format!("{}/file/{}", prefix, change.file_id),
        "drive" => format!("{}/drive/{}", prefix, change.drive_id),
        _ => format!("{}/{}", prefix, change.change_type),
    }
}

/// Converts a wire change into the emitted detail, populating the subject
/// sentence, entity and actor.
pub fn to_detail(wire: &WireChange) -> Detail {
    let change = convert_change(wire);
    let mut detail = Detail {
        change: Some(change.clone()),
        ..Default::default()
    };

    match detail_type(Some(&change)) {
        DetailType::FileRemoved => {
            detail.subject = format!("FileID {} was removed at {}", change.file_id, change.time);
        }
        DetailType::FileTrashed => match &change.file {
            Some(file) => match &file.trashing_user {
                Some(user) => {
                    detail.subject = format!(
                        "File {} ({}) moved to trash by {} at {}",
                        file.name,
                        change.file_id,
                        format_user(user),
                        file.trashed_time
                    );
                    detail.actor = Some(user.clone());
                }
                None => {
                    detail.subject = format!(
                        "File {} ({}) moved to trash at {}",
                        file.name, change.file_id, change.time
                    );
                }
            },
            None => {
                detail.subject = format!(
                    "FileID {} moved to trash at {}",
                    change.file_id, change.time
                );
            }
        },
        DetailType::FileChanged => match &change.file {
            Some(file) => match &file.last_modifying_user {
                Some(user) => {
                    detail.subject = format!(
                        "File {} ({}) changed by {} at {}",
                        file.name,
                        change.file_id,
                        format_user(user),
                        file.modified_time
                    );
                    detail.actor = Some(user.clone());
                }
                None => {
                    detail.subject = format!(
                        "File {} ({}) changed at {}",
                        file.name, change.file_id, change.time
                    );
                }
            },
            None => {
                detail.subject = format!("FileID {} changed at {}", change.file_id, change.time);
            }
        },
        DetailType::DriveRemoved => {
            detail.subject = format!("DriveId {} was removed at {}", change.drive_id, change.time);
        }
        DetailType::DriveChanged => match &change.drive {
            Some(drive) => {
                detail.subject = format!(
                    "Drive {} ({}) changed at {}",
                    drive.name, change.drive_id, change.time
                );
            }
            None => {
                detail.subject = format!("DriveId {} changed at {}", change.drive_id, change.time);
            }
        },
        DetailType::Unexpected => {}
    }

    if detail.actor.is_none() {
        detail.actor = Some(User::unknown());
    }

    detail.entity = if let Some(drive) = &change.drive {
        Some(Entity {
            id: drive.id.clone(),
            kind: drive.kind.clone(),
            name: drive.name.clone(),
            created_time: drive.created_time.clone(),
        })
    } else if let Some(file) = &change.file {
        Some(Entity {
            id: file.id.clone(),
            kind: file.kind.clone(),
            name: file.name.clone(),
            created_time: file.created_time.clone(),
        })
    } else if !change.drive_id.is_empty() {
        Some(Entity {
            id: change.drive_id.clone(),
            kind: "drive#drive".to_string(),
            ..Default::default()
        })
    } else if !change.file_id.is_empty() {
        Some(Entity {
            id: change.file_id.clone(),
            kind: "drive#file".to_string(),
            ..Default::default()
        })
    } else {
        None
    };

    detail
}

fn format_user(user: &User) -> String {
    if user.email_address.is_empty() {
        user.display_name.clone()
    } else {
        format!("{} [{}]", user.display_name, user.email_address)
    }
}

fn convert_change(wire: &WireChange) -> Change {
    Change {
        kind: wire.kind.clone(),
        change_type: wire.change_type.clone(),
        time: wire.time.clone(),
        removed: wire.removed,
        file_id: wire.file_id.clone(),
        file: wire.file.as_ref().map(convert_file),
        drive_id: wire.drive_id.clone(),
        drive: wire.drive.as_ref().map(convert_drive),
    }
}

fn convert_file(wire: &WireFile) -> File {
    File {
        kind: wire.kind.clone(),
        id: wire.id.clone(),
        name: wire.name.clone(),
        mime_type: wire.mime_type.clone(),
        size: format_i64(wire.size),
        version: format_i64(wire.version),
        created_time: wire.created_time.clone(),
        modified_time: wire.modified_time.clone(),
        trashed_time: wire.trashed_time.clone(),
        trashed: wire.trashed,
        parents: wire.parents.clone(),
        last_modifying_user: wire.last_modifying_user.as_ref().map(convert_user),
        trashing_user: wire.trashing_user.as_ref().map(convert_user),
    }
}

fn convert_user(wire: &WireUser) -> User {
    User {
        kind: wire.kind.clone(),
        display_name: wire.display_name.clone(),
        email_address: wire.email_address.clone(),
        photo_link: wire.photo_link.clone(),
        me: wire.me,
        permission_id: wire.permission_id.clone(),
    }
}

fn convert_drive(wire: &WireDrive) -> Drive {
    Drive {
        kind: wire.kind.clone(),
        id: wire.id.clone(),
        name: wire.name.clone(),
        created_time: wire.created_time.clone(),
    }
}

/// Zero renders as empty so absent counters do not serialize as `"0"`.
fn format_i64(n: i64) -> String {
    if n == 0 {
        String::new()
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{WireChange, WireFile, WireUser};

    fn file_change() -> WireChange {
        WireChange {
            kind: "drive#change".to_string(),
            change_type: "file".to_string(),
            time: "2022-06-15T00:03:55.849Z".to_string(),
            file_id: "XXXXXXXXXX".to_string(),
            file: Some(WireFile {
                id: "XXXXXXXXXX".to_string(),
                name: "gdnotify".to_string(),
                mime_type: "application/vnd.google-apps.spreadsheet".to_string(),
                modified_time: "2022-06-15T00:03:45.843Z".to_string(),
                last_modifying_user: Some(WireUser {
                    display_name: "hoge".to_string(),
                    kind: "drive#user".to_string(),
                    ..Default::default()
                }),
                version: 20,
                size: 1500,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn file_change_detail() {
        let detail = to_detail(&file_change());
        assert_eq!(
            detail_type(detail.change.as_ref()),
            DetailType::FileChanged
        );
        assert_eq!(
            detail.subject,
            "File gdnotify (XXXXXXXXXX) changed by hoge at 2022-06-15T00:03:45.843Z"
        );
        let actor = detail.actor.unwrap();
        assert_eq!(actor.display_name, "hoge");
        let entity = detail.entity.unwrap();
        assert_eq!(entity.id, "XXXXXXXXXX");
        let file = detail.change.unwrap().file.unwrap();
        assert_eq!(file.size, "1500");
        assert_eq!(file.version, "20");
    }

    #[test]
    fn file_changed_by_user_with_email() {
        let mut wire = file_change();
        wire.file.as_mut().unwrap().last_modifying_user = Some(WireUser {
            display_name: "hoge".to_string(),
            email_address: "hoge@example.com".to_string(),
            kind: "drive#user".to_string(),
            ..Default::default()
        });
        let detail = to_detail(&wire);
        assert!(detail
            .subject
            .contains("changed by hoge [hoge@example.com] at"));
    }

    #[test]
    fn file_removed_detail() {
        let wire = WireChange {
            change_type: "file".to_string(),
            file_id: "F".to_string(),
            removed: true,
            time: "T".to_string(),
            ..Default::default()
        };
        let detail = to_detail(&wire);
        assert_eq!(detail_type(detail.change.as_ref()), DetailType::FileRemoved);
        assert_eq!(detail.subject, "FileID F was removed at T");
        let entity = detail.entity.unwrap();
        assert_eq!(entity.id, "F");
        assert_eq!(entity.kind, "drive#file");
        let actor = detail.actor.unwrap();
        assert_eq!(actor.kind, "drive#user");
        assert_eq!(actor.display_name, "Unknown User");
    }

    #[test]
    fn trashed_file_with_known_user() {
        let wire = WireChange {
            change_type: "file".to_string(),
            file_id: "F".to_string(),
            time: "T".to_string(),
            file: Some(WireFile {
                id: "F".to_string(),
                name: "doc".to_string(),
                trashed: true,
                trashed_time: "T2".to_string(),
                trashing_user: Some(WireUser {
                    display_name: "fuga".to_string(),
                    kind: "drive#user".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let detail = to_detail(&wire);
        assert_eq!(detail_type(detail.change.as_ref()), DetailType::FileTrashed);
        assert!(detail.subject.starts_with("File doc (F) moved to trash by fuga at T2"));
        assert_eq!(detail.actor.unwrap().display_name, "fuga");
    }

    #[test]
    fn drive_changed_with_drive_object() {
        let wire = WireChange {
            change_type: "drive".to_string(),
            drive_id: "D".to_string(),
            time: "T".to_string(),
            drive: Some(crate::upstream::WireDrive {
                id: "D".to_string(),
                name: "Team Drive".to_string(),
                kind: "drive#drive".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let detail = to_detail(&wire);
        assert_eq!(detail_type(detail.change.as_ref()), DetailType::DriveChanged);
        assert_eq!(detail.subject, "Drive Team Drive (D) changed at T");
        assert_eq!(detail.entity.unwrap().kind, "drive#drive");
    }

    #[test]
    fn drive_removed_without_drive_object() {
        let wire = WireChange {
            change_type: "drive".to_string(),
            drive_id: "D".to_string(),
            removed: true,
            time: "T".to_string(),
            ..Default::default()
        };
        let detail = to_detail(&wire);
        assert_eq!(detail_type(detail.change.as_ref()), DetailType::DriveRemoved);
        assert_eq!(detail.subject, "DriveId D was removed at T");
        // No drive object: entity synthesized from the id.
        assert_eq!(detail.entity.unwrap().id, "D");
    }

    #[test]
    fn unexpected_change_type() {
        let wire = WireChange {
            change_type: "other".to_string(),
            ..Default::default()
        };
        let detail = to_detail(&wire);
        assert_eq!(detail_type(detail.change.as_ref()), DetailType::Unexpected);
        assert_eq!(detail_type(None), DetailType::Unexpected);
    }

    #[test]
    fn source_formats() {
        let d1 = DriveId::new("d1");
        let file = Change {
            change_type: "file".to_string(),
            file_id: "F".to_string(),
            ..Default::default()
        };
        assert_eq!(event_source(&d1, Some(&file)), "oss.gdnotify/d1/file/F");

        let drive = Change {
            change_type: "drive".to_string(),
            drive_id: "D".to_string(),
            ..Default::default()
        };
        assert_eq!(event_source(&d1, Some(&drive)), "oss.gdnotify/d1/drive/D");

        let other = Change {
            change_type: "other".to_string(),
            ..Default::default()
        };
        assert_eq!(event_source(&d1, Some(&other)), "oss.gdnotify/d1/other");
        assert_eq!(event_source(&d1, None), "oss.gdnotify/d1");
    }

    #[test]
    fn detail_types_closed_set() {
        let all = [
            DetailType::FileRemoved,
            DetailType::FileTrashed,
            DetailType::FileChanged,
            DetailType::DriveRemoved,
            DetailType::DriveChanged,
            DetailType::Unexpected,
        ];
        let expected = [
            "File Removed",
            "File Move to trash",
            "File Changed",
            "Shared Drive Removed",
            "Drive Status Changed",
            "Unexpected Changed",
        ];
        for (dt, name) in all.iter().zip(expected) {
            assert_eq!(dt.as_str(), name);
        }
    }
}
