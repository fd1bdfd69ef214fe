//! The poke endpoint.
//!
//! The upstream document service does not deliver changes in the poke; it
//! only signals that there may be new ones. On a `change` poke the handler
//! pulls the incremental change list for the poked channel and forwards the
//! result through the emission pipeline.
//!
//! Status mapping:
//! - 404 - the caller is not the document service (user-agent gate)
//! - 200 - `sync` handshakes, unknown states, stale pokes for unknown
//!   channels, and successful change handling
//! - 500 - pull or emit failure (the poke will be retried upstream)

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use tracing::{debug, error, info, warn};

use crate::types::ChannelId;

use super::address::ensure_webhook_address;
use super::AppState;

/// Expected user-agent prefix on genuine pokes.
const EXPECTED_USER_AGENT_PREFIX: &str = "APIs-Google;";

const HEADER_CHANNEL_ID: &str = "x-goog-channel-id";
const HEADER_RESOURCE_ID: &str = "x-goog-resource-id";
const HEADER_RESOURCE_STATE: &str = "x-goog-resource-state";
const HEADER_MESSAGE_NUMBER: &str = "x-goog-message-number";
const HEADER_CHANNEL_EXPIRATION: &str = "x-goog-channel-expiration";

/// `POST /` - accepts pokes from the document service.
pub async fn webhook_handler(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> (StatusCode, &'static str) {
    ensure_webhook_address(state.webhook(), &headers, &uri, state.lambda()).await;

    let channel_id = header(&headers, HEADER_CHANNEL_ID);
    let resource_id = header(&headers, HEADER_RESOURCE_ID);
    let resource_state = header(&headers, HEADER_RESOURCE_STATE);
    let user_agent = header(&headers, "user-agent");
    info!(
        user_agent = %dash(user_agent),
        channel_id = %dash(channel_id),
        resource_id = %dash(resource_id),
        resource_state = %dash(resource_state),
        message_number = %dash(header(&headers, HEADER_MESSAGE_NUMBER)),
        forwarded_for = %dash(header(&headers, "x-forwarded-for")),
        channel_expiration = %dash(header(&headers, HEADER_CHANNEL_EXPIRATION)),
        "received webhook request"
    );

    if !user_agent.starts_with(EXPECTED_USER_AGENT_PREFIX) {
        warn!(user_agent = %user_agent, "unexpected user-agent, returning 404");
        return (StatusCode::NOT_FOUND, "Not Found");
    }
    if resource_state == "sync" {
        info!(
            channel_id = %dash(channel_id),
            resource_id = %dash(resource_id),
            "sync accepted"
        );
        return (StatusCode::OK, "OK");
    }
    if resource_state != "change" {
        warn!(
            state = %resource_state,
            channel_id = %dash(channel_id),
            resource_id = %dash(resource_id),
            "unknown resource state"
        );
        return (StatusCode::OK, "OK");
    }

    info!(
        channel_id = %dash(channel_id),
        resource_id = %dash(resource_id),
        "change accepted"
    );
    let id = ChannelId::new(channel_id);
    let channel = match state.store().find_one_by_channel_id(&id).await {
        Ok(channel) => channel,
        Err(crate::store::StorageError::ChannelNotFound(_)) => {
            // Stale pokes for rotated-out channels are expected.
            warn!(channel_id = %id, "channel not found");
            return (StatusCode::OK, "OK");
        }
        Err(err) => {
            error!(channel_id = %id, error = %err, "channel lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        }
    };

    let (changes, channel) = match state.puller().pull(&channel).await {
        Ok(result) => result,
        Err(err) => {
            error!(
                channel_id = %id,
                resource_id = %dash(resource_id),
                error = %err,
                "failed to get changes list"
            );
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        }
    };

    if changes.is_empty() {
        debug!(channel_id = %id, "no changes");
        return (StatusCode::OK, "OK");
    }
    info!(channel_id = %id, changes = changes.len(), "sending changes");
    if let Err(err) = state.pipeline().send(&channel, &changes).await {
        error!(channel_id = %id, error = %err, "failed to send changes");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
    }
    (StatusCode::OK, "OK")
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}
