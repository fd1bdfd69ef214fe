//! HTTP surface of the bridge.
//!
//! Three routes:
//! - `POST /` - the upstream poke endpoint (pull + emit)
//! - `POST /sync` - operator trigger: maintenance pass plus a full sync
//! - `GET /health` - liveness probe

pub mod address;
pub mod health;
pub mod sync;
pub mod webhook;

use std::sync::Arc;

use crate::aws::lambda::LambdaClient;
use crate::manager::{ChannelManager, WebhookAddress};
use crate::pipeline::NotificationPipeline;
use crate::puller::ChangePuller;
use crate::store::Storage;

pub use health::health_handler;
pub use sync::sync_handler;
pub use webhook::webhook_handler;

/// Shared application state, passed to handlers via axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn Storage>,
    puller: ChangePuller,
    pipeline: NotificationPipeline,
    manager: Arc<ChannelManager>,
    webhook: WebhookAddress,
    /// Present only when the hosting platform can be asked for the public
    /// function URL (webhook-address auto-detection of last resort).
    lambda: Option<LambdaClient>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Storage>,
        puller: ChangePuller,
        pipeline: NotificationPipeline,
        manager: Arc<ChannelManager>,
        webhook: WebhookAddress,
        lambda: Option<LambdaClient>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                store,
                puller,
                pipeline,
                manager,
                webhook,
                lambda,
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn Storage> {
        &self.inner.store
    }

    pub fn puller(&self) -> &ChangePuller {
        &self.inner.puller
    }

    pub fn pipeline(&self) -> &NotificationPipeline {
        &self.inner.pipeline
    }

    pub fn manager(&self) -> &Arc<ChannelManager> {
        &self.inner.manager
    }

    pub fn webhook(&self) -> &WebhookAddress {
        &self.inner.webhook
    }

    pub fn lambda(&self) -> Option<&LambdaClient> {
        self.inner.lambda.as_ref()
    }
}

/// Builds the axum router with all endpoints.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/", post(webhook_handler))
        .route("/sync", post(sync_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}
