//! gdnotify - main entry point.
//!
//! Subcommands:
//! - `serve` (default) - run the webhook server
//! - `sync` - maintenance pass plus a full pull-and-emit sweep
//! - `cleanup` - remove every notification channel
//! - `list` - print the channel fleet

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gdnotify::aws::dynamodb::DynamoDbClient;
use gdnotify::aws::eventbridge::EventBridgeClient;
use gdnotify::aws::lambda::LambdaClient;
use gdnotify::aws::s3::S3Client;
use gdnotify::aws::AwsClient;
use gdnotify::config::{Config, NotificationType, StorageType};
use gdnotify::copier::{Copier, CopyConfig};
use gdnotify::emitter::{EventBridgeNotification, FileNotification, Notification};
use gdnotify::manager::{ChannelManager, WebhookAddress};
use gdnotify::pipeline::NotificationPipeline;
use gdnotify::puller::ChangePuller;
use gdnotify::server::{build_router, sync::sync_all, AppState};
use gdnotify::store::{DynamoDbStorage, FileStorage, Storage};
use gdnotify::upstream::DriveClient;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gdnotify=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let command = std::env::args().nth(1).unwrap_or_else(|| "serve".to_string());

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let state = match build_app_state(&config).await {
        Ok(state) => state,
        Err(err) => {
            error!(error = %err, "initialization failed");
            return ExitCode::FAILURE;
        }
    };

    let result = match command.as_str() {
        "serve" => serve(&config, state).await,
        "sync" => sync(state).await,
        "cleanup" => state.manager().cleanup().await.map_err(|e| e.to_string()),
        "list" => {
            let mut stdout = std::io::stdout();
            state
                .manager()
                .list(&mut stdout)
                .await
                .map_err(|e| e.to_string())
        }
        other => Err(format!("unknown command: {other} (expected serve, sync, cleanup or list)")),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "runtime error");
            ExitCode::FAILURE
        }
    }
}

/// Wires the storage, emitter, upstream client, optional copier, and the
/// lifecycle manager into one shared state.
async fn build_app_state(config: &Config) -> Result<AppState, String> {
    let google_token = std::env::var("GOOGLE_ACCESS_TOKEN")
        .map_err(|_| "GOOGLE_ACCESS_TOKEN is not set".to_string())?;
    let drive = DriveClient::new(google_token).map_err(|e| e.to_string())?;

    // The AWS client is needed for the DynamoDB store, the EventBridge
    // emitter, the S3 copier, and webhook-address detection; a file-only
    // setup can run without credentials.
    let aws = AwsClient::from_env().ok();
    let require_aws = || {
        aws.clone()
            .ok_or_else(|| "AWS credentials are required for the configured backends".to_string())
    };

    let store: Arc<dyn Storage> = match config.storage_type {
        StorageType::DynamoDb => {
            let client = DynamoDbClient::new(require_aws()?);
            Arc::new(
                DynamoDbStorage::new(client, &config.table_name, config.auto_create)
                    .await
                    .map_err(|e| e.to_string())?,
            )
        }
        StorageType::File => Arc::new(FileStorage::new(&config.data_file, &config.lock_file)),
    };

    let notification: Arc<dyn Notification> = match config.notification_type {
        NotificationType::EventBridge => Arc::new(EventBridgeNotification::new(
            EventBridgeClient::new(require_aws()?),
            &config.event_bus,
        )),
        NotificationType::File => Arc::new(FileNotification::new(&config.event_file)),
    };

    let copier = match &config.s3_copy_config {
        Some(path) => {
            let rules = CopyConfig::load(path).map_err(|e| e.to_string())?;
            info!(path = %path.display(), "copy rules loaded");
            Some(Copier::new(rules, drive.clone(), S3Client::new(require_aws()?)))
        }
        None => None,
    };

    let webhook = WebhookAddress::new(&config.webhook);
    let manager = Arc::new(ChannelManager::new(
        store.clone(),
        drive.clone(),
        webhook.clone(),
        config.expiration,
    ));
    let puller = ChangePuller::new(store.clone(), drive);
    let pipeline = NotificationPipeline::new(notification, copier, config.within_modified_time);
    let lambda = aws.map(LambdaClient::new);

    Ok(AppState::new(
        store, puller, pipeline, manager, webhook, lambda,
    ))
}

async fn serve(config: &Config, state: AppState) -> Result<(), String> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = build_router(state);

    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind {addr}: {e}"))?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("shutdown signal received");
            signal_token.cancel();
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| format!("server failed: {e}"))
}

async fn sync(state: AppState) -> Result<(), String> {
    state
        .manager()
        .maintain()
        .await
        .map_err(|e| format!("maintenance: {e}"))?;
    sync_all(&state)
        .await
        .map_err(|()| "sync failed for at least one channel".to_string())
}
