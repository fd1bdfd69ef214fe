//! Operator sync trigger.
//!
//! `POST /sync` runs the channel maintenance pass, then pulls and emits for
//! every stored channel. Errors are aggregated: the invocation reports 500
//! on any partial failure but never crashes the process.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use tracing::{debug, error, info, warn};

use super::address::ensure_webhook_address;
use super::AppState;

/// `POST /sync` - maintenance pass plus a full pull-and-emit sweep.
pub async fn sync_handler(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> (StatusCode, &'static str) {
    ensure_webhook_address(state.webhook(), &headers, &uri, state.lambda()).await;

    let mut has_err = false;

    if let Err(err) = state.manager().maintain().await {
        warn!(error = %err, "maintenance pass failed");
        has_err = true;
    }
    if let Err(()) = sync_all(&state).await {
        has_err = true;
    }

    if has_err {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    } else {
        (StatusCode::OK, "OK")
    }
}

/// Pulls and emits for every stored channel. Per-channel failures are
/// logged and the sweep continues; any failure marks the sweep failed.
pub async fn sync_all(state: &AppState) -> Result<(), ()> {
    let mut rx = match state.store().find_all_channels().await {
        Ok(rx) => rx,
        Err(err) => {
            warn!(error = %err, "channel listing failed");
            return Err(());
        }
    };

    let mut ok = true;
    while let Some(batch) = rx.recv().await {
        for channel in batch {
            info!(
                channel_id = %channel.channel_id,
                drive_id = %channel.drive_id,
                expiration = %channel.expiration,
                created_at = %channel.created_at,
                "syncing channel"
            );
            let (changes, advanced) = match state.puller().pull(&channel).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(
                        channel_id = %channel.channel_id,
                        resource_id = %channel.resource_id,
                        drive_id = %channel.drive_id,
                        error = %err,
                        "sync pull failed"
                    );
                    ok = false;
                    continue;
                }
            };
            if changes.is_empty() {
                debug!(channel_id = %channel.channel_id, "no changes");
                continue;
            }
            debug!(channel_id = %channel.channel_id, "sending changes");
            if let Err(err) = state.pipeline().send(&advanced, &changes).await {
                error!(
                    channel_id = %channel.channel_id,
                    resource_id = %channel.resource_id,
                    error = %err,
                    "sync send failed"
                );
                ok = false;
            }
        }
    }
    if ok {
        Ok(())
    } else {
        Err(())
    }
}
