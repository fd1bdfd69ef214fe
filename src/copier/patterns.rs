//! Validation corpus for rule expressions.
//!
//! Every compiled expression in a rule document is exercised against each of
//! these representative detail payloads at bind time. An expression that
//! errors on any of them fails startup instead of failing at event time.

use crate::types::{Change, Detail, Drive, Entity, File, User};

/// Builds the fixed corpus of representative detail payloads.
pub fn validation_patterns() -> Vec<Detail> {
    vec![
        // A plain file edit by a known user.
        Detail {
            subject: "File report.xlsx (F1) changed by hoge at 2022-06-15T00:03:45.843Z"
                .to_string(),
            entity: Some(Entity {
                id: "F1".to_string(),
                kind: "drive#file".to_string(),
                name: "report.xlsx".to_string(),
                created_time: "2022-06-01T00:00:00Z".to_string(),
            }),
            actor: Some(User {
                kind: "drive#user".to_string(),
                display_name: "hoge".to_string(),
                email_address: "hoge@example.com".to_string(),
                ..Default::default()
            }),
            change: Some(Change {
                kind: "drive#change".to_string(),
                change_type: "file".to_string(),
                time: "2022-06-15T00:03:55.849Z".to_string(),
                file_id: "F1".to_string(),
                file: Some(File {
                    kind: "drive#file".to_string(),
                    id: "F1".to_string(),
                    name: "report.xlsx".to_string(),
                    mime_type:
                        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
                            .to_string(),
                    size: "1500".to_string(),
                    version: "20".to_string(),
                    modified_time: "2022-06-15T00:03:45.843Z".to_string(),
                    last_modifying_user: Some(User {
                        kind: "drive#user".to_string(),
                        display_name: "hoge".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            s3_copy: None,
        },
        // A workspace document (export path).
        Detail {
            subject: "File plan (F2) changed at T".to_string(),
            entity: Some(Entity {
                id: "F2".to_string(),
                kind: "drive#file".to_string(),
                name: "plan".to_string(),
                ..Default::default()
            }),
            actor: Some(User::unknown()),
            change: Some(Change {
                change_type: "file".to_string(),
                time: "2022-06-15T01:00:00Z".to_string(),
                file_id: "F2".to_string(),
                file: Some(File {
                    id: "F2".to_string(),
                    name: "plan".to_string(),
                    mime_type: "application/vnd.google-apps.document".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            s3_copy: None,
        },
        // A removal: no file sub-object at all.
        Detail {
            subject: "FileID F3 was removed at T".to_string(),
            entity: Some(Entity {
                id: "F3".to_string(),
                kind: "drive#file".to_string(),
                ..Default::default()
            }),
            actor: Some(User::unknown()),
            change: Some(Change {
                change_type: "file".to_string(),
                removed: true,
                file_id: "F3".to_string(),
                time: "2022-06-15T02:00:00Z".to_string(),
                ..Default::default()
            }),
            s3_copy: None,
        },
        // A trashed file.
        Detail {
            subject: "File old (F4) moved to trash by fuga at T2".to_string(),
            entity: Some(Entity {
                id: "F4".to_string(),
                kind: "drive#file".to_string(),
                name: "old".to_string(),
                ..Default::default()
            }),
            actor: Some(User {
                kind: "drive#user".to_string(),
                display_name: "fuga".to_string(),
                ..Default::default()
            }),
            change: Some(Change {
                change_type: "file".to_string(),
                file_id: "F4".to_string(),
                time: "2022-06-15T03:00:00Z".to_string(),
                file: Some(File {
                    id: "F4".to_string(),
                    name: "old".to_string(),
                    mime_type: "text/plain".to_string(),
                    trashed: true,
                    trashed_time: "2022-06-15T02:59:00Z".to_string(),
                    trashing_user: Some(User {
                        kind: "drive#user".to_string(),
                        display_name: "fuga".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            s3_copy: None,
        },
        // A drive-scoped change.
        Detail {
            subject: "Drive Team (D1) changed at T".to_string(),
            entity: Some(Entity {
                id: "D1".to_string(),
                kind: "drive#drive".to_string(),
                name: "Team".to_string(),
                ..Default::default()
            }),
            actor: Some(User::unknown()),
            change: Some(Change {
                change_type: "drive".to_string(),
                drive_id: "D1".to_string(),
                time: "2022-06-15T04:00:00Z".to_string(),
                drive: Some(Drive {
                    kind: "drive#drive".to_string(),
                    id: "D1".to_string(),
                    name: "Team".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            s3_copy: None,
        },
        // The degenerate payload: everything absent.
        Detail::default(),
    ]
}
