//! Minimal EventBridge client: `PutEvents` only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::client::AwsClient;
use super::error::AwsError;

const SERVICE: &str = "events";
const TARGET: &str = "AWSEvents.PutEvents";

/// One entry of a `PutEvents` request. At most ten per call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutEventsRequestEntry {
    pub event_bus_name: String,
    pub source: String,
    pub detail_type: String,
    /// Stringified JSON payload.
    pub detail: String,
    /// Event time, epoch seconds (EventBridge's JSON timestamp encoding).
    #[serde(serialize_with = "serialize_epoch_seconds")]
    pub time: DateTime<Utc>,
    pub resources: Vec<String>,
}

fn serialize_epoch_seconds<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_i64(time.timestamp())
}

/// Per-entry result of a `PutEvents` call. Exactly one of `event_id` or
/// `error_code` is populated.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutEventsResultEntry {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutEventsOutput {
    #[serde(default)]
    pub failed_entry_count: u32,
    #[serde(default)]
    pub entries: Vec<PutEventsResultEntry>,
}

/// EventBridge client bound to one base client.
#[derive(Debug, Clone)]
pub struct EventBridgeClient {
    client: AwsClient,
}

impl EventBridgeClient {
    pub fn new(client: AwsClient) -> Self {
        Self { client }
    }

    /// Submits up to ten entries. A transport or service error fails the
    /// whole call; per-entry failures are reported in the output.
    pub async fn put_events(
        &self,
        entries: &[PutEventsRequestEntry],
    ) -> Result<PutEventsOutput, AwsError> {
        let body = serde_json::json!({ "Entries": entries });
        let resp = self
            .client
            .json_request(SERVICE, TARGET, "1.1", &body)
            .await?;
        serde_json::from_str(&resp.body)
            .map_err(|e| AwsError::new(SERVICE, "DeserializationError", &e.to_string(), 0))
    }
}
