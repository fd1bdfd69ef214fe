//! Event-bus emitter.
//!
//! Shapes each change detail into a bus entry and submits them in batches of
//! at most ten. Per-entry error codes are recorded as the last error while
//! the remaining batches proceed; per-call transport errors fail the whole
//! batch but processing continues with the next one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::aws::eventbridge::{EventBridgeClient, PutEventsRequestEntry};
use crate::events::{detail_type, event_source};
use crate::types::{Channel, Detail};

use super::{EmitError, Notification};

/// Maximum entries per `PutEvents` call.
const MAX_BATCH: usize = 10;

/// Emitter targeting an EventBridge-style bus.
#[derive(Debug, Clone)]
pub struct EventBridgeNotification {
    client: EventBridgeClient,
    event_bus: String,
}

impl EventBridgeNotification {
    pub fn new(client: EventBridgeClient, event_bus: impl Into<String>) -> Self {
        EventBridgeNotification {
            client,
            event_bus: event_bus.into(),
        }
    }

    fn to_entry(&self, channel: &Channel, detail: &Detail) -> PutEventsRequestEntry {
        let time = detail
            .change
            .as_ref()
            .filter(|c| !c.time.is_empty())
            .and_then(|c| match DateTime::parse_from_rfc3339(&c.time) {
                Ok(t) => Some(t.with_timezone(&Utc)),
                Err(err) => {
                    warn!(time = %c.time, error = %err, "change time parse failed");
                    None
                }
            })
            .unwrap_or_else(Utc::now);

        let body = serde_json::to_string(detail).unwrap_or_else(|err| {
            warn!(error = %err, "detail marshal failed");
            "{}".to_string()
        });
        let source = event_source(&channel.drive_id, detail.change.as_ref());
        let dt = detail_type(detail.change.as_ref());
        debug!(source = %source, detail_type = %dt, "event entry");

        PutEventsRequestEntry {
            event_bus_name: self.event_bus.clone(),
            source,
            detail_type: dt.as_str().to_string(),
            detail: body,
            time,
            resources: vec![],
        }
    }
}

#[async_trait]
impl Notification for EventBridgeNotification {
    async fn send_changes(&self, channel: &Channel, details: &[Detail]) -> Result<(), EmitError> {
        if details.is_empty() {
            return Ok(());
        }
        let entries: Vec<PutEventsRequestEntry> = details
            .iter()
            .map(|d| self.to_entry(channel, d))
            .collect();

        let mut last_err: Option<EmitError> = None;
        for batch in entries.chunks(MAX_BATCH) {
            let output = match self.client.put_events(batch).await {
                Ok(output) => output,
                Err(err) => {
                    error!(error = %err, "PutEvents failed");
                    last_err = Some(EmitError::Bus(err));
                    continue;
                }
            };
            for (i, entry) in output.entries.iter().enumerate() {
                if let Some(code) = &entry.error_code {
                    let message = entry.error_message.clone().unwrap_or_default();
                    error!(
                        event_bus = %self.event_bus,
                        error_code = %code,
                        error_message = %message,
                        detail = %batch.get(i).map(|e| e.detail.as_str()).unwrap_or("-"),
                        "put event entry failed"
                    );
                    last_err = Some(EmitError::Entry {
                        code: code.clone(),
                        message,
                    });
                } else if let Some(event_id) = &entry.event_id {
                    info!(event_bus = %self.event_bus, event_id = %event_id, "put event");
                }
            }
        }
        match last_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::{client::AwsClient, Credentials};
    use crate::types::{Change, ChannelId, DriveId, ResourceId};
    use chrono::TimeZone;

    fn emitter() -> EventBridgeNotification {
        let aws = AwsClient::new(
            Credentials {
                access_key_id: "AKID".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: None,
            },
            "us-east-1",
        );
        EventBridgeNotification::new(EventBridgeClient::new(aws), "default")
    }

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

    #[test]
    fn entry_uses_change_time() {
        let detail = Detail {
            change: Some(Change {
                change_type: "file".to_string(),
                file_id: "F".to_string(),
                time: "2022-06-15T00:03:55.849Z".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let entry = emitter().to_entry(&channel(), &detail);
        assert_eq!(entry.source, "oss.gdnotify/d1/file/F");
        assert_eq!(entry.detail_type, "File Changed");
        assert_eq!(
            entry.time,
            Utc.with_ymd_and_hms(2022, 6, 15, 0, 3, 55).unwrap()
                + chrono::Duration::milliseconds(849)
        );
        assert!(entry.resources.is_empty());
    }

    #[test]
    fn entry_falls_back_to_wall_clock_on_bad_time() {
        let detail = Detail {
            change: Some(Change {
                change_type: "file".to_string(),
                time: "not-a-time".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let before = Utc::now();
        let entry = emitter().to_entry(&channel(), &detail);
        assert!(entry.time >= before);
    }

    #[test]
    fn entry_detail_is_stringified_json() {
        let detail = Detail {
            subject: "s".to_string(),
            ..Default::default()
        };
        let entry = emitter().to_entry(&channel(), &detail);
        let parsed: serde_json::Value = serde_json::from_str(&entry.detail).unwrap();
        assert_eq!(parsed["subject"], "s");
    }

    #[tokio::test]
    async fn empty_details_is_noop() {
        // No bus call is made; the future resolves immediately with Ok.
        let result = emitter().send_changes(&channel(), &[]).await;
        assert!(result.is_ok());
    }
}

#[cfg(test)]
mod stub_tests {
    //! Batching and per-entry error semantics against a stub bus endpoint.

    use std::sync::{Arc, Mutex};

    use axum::routing::post;
    use axum::Json;

    use super::*;
    use crate::aws::{client::AwsClient, Credentials};
    use crate::server::test_support::spawn_stub;
    use crate::types::{Change, ChannelId, DriveId, ResourceId};
    use chrono::TimeZone;

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

    fn details(n: usize) -> Vec<Detail> {
        (0..n)
            .map(|i| Detail {
                subject: format!("change {i}"),
                change: Some(Change {
                    change_type: "file".to_string(),
                    file_id: format!("F{i}"),
                    time: "2022-06-15T00:03:55.849Z".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .collect()
    }

    async fn emitter_against(
        entries_per_call: Arc<Mutex<Vec<usize>>>,
        fail_entry_code: Option<&'static str>,
    ) -> EventBridgeNotification {
        let stub = axum::Router::new().route(
            "/",
            post(move |raw: axum::body::Bytes| {
                let entries_per_call = entries_per_call.clone();
                async move {
                    // PutEvents bodies are application/x-amz-json-1.1.
                    let body: serde_json::Value =
                        serde_json::from_slice(&raw).unwrap_or_default();
                    let entries = body["Entries"].as_array().cloned().unwrap_or_default();
                    entries_per_call.lock().unwrap().push(entries.len());
                    let results: Vec<serde_json::Value> = entries
                        .iter()
                        .enumerate()
                        .map(|(i, _)| match fail_entry_code {
                            // First entry of every batch fails when a code is set.
                            Some(code) if i == 0 => serde_json::json!({
                                "ErrorCode": code,
                                "ErrorMessage": "boom"
                            }),
                            _ => serde_json::json!({
                                "EventId": format!("event-{i}")
                            }),
                        })
                        .collect();
                    let failed = results
                        .iter()
                        .filter(|r| r.get("ErrorCode").is_some())
                        .count();
                    Json(serde_json::json!({
                        "FailedEntryCount": failed,
                        "Entries": results
                    }))
                }
            }),
        );
        let base = spawn_stub(stub).await;
        let aws = AwsClient::new(
            Credentials {
                access_key_id: "AKID".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: None,
            },
            "us-east-1",
        )
        .with_endpoint(base);
        EventBridgeNotification::new(EventBridgeClient::new(aws), "default")
    }

    #[tokio::test]
    async fn batches_are_capped_at_ten() {
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let emitter = emitter_against(sizes.clone(), None).await;

        emitter.send_changes(&channel(), &details(23)).await.unwrap();

        assert_eq!(*sizes.lock().unwrap(), vec![10, 10, 3]);
    }

    #[tokio::test]
    async fn per_entry_failure_is_last_error_but_all_batches_submit() {
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let emitter = emitter_against(sizes.clone(), Some("InternalFailure")).await;

        let err = emitter
            .send_changes(&channel(), &details(12))
            .await
            .unwrap_err();

        // Both batches were still submitted.
        assert_eq!(*sizes.lock().unwrap(), vec![10, 2]);
        match err {
            EmitError::Entry { code, .. } => assert_eq!(code, "InternalFailure"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
