//! Rule-based copy of changed file objects into the blob store.
//!
//! Wired as an optional collaborator on the emission path: when no rule
//! document is configured there is no copier, no copy, and no `s3Copy`
//! field. Copy failures are logged and suppressed; the event is still
//! emitted without the receipt.

pub mod formats;
pub mod patterns;
pub mod rules;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::aws::s3::S3Client;
use crate::types::{Detail, S3Copy};
use crate::upstream::{DownloadResult, DriveClient, UpstreamError};

pub use formats::{export_mime_type, is_workspace_mime, DEFAULT_EXPORT_FORMAT};
pub use rules::{CopyConfig, CopyRule, RuleConfigError};

/// Copies changed file objects to S3 when a rule matches.
#[derive(Debug)]
pub struct Copier {
    config: CopyConfig,
    drive: DriveClient,
    s3: S3Client,
}

impl Copier {
    pub fn new(config: CopyConfig, drive: DriveClient, s3: S3Client) -> Self {
        Copier { config, drive, s3 }
    }

    /// Evaluates the rules for `detail` and attaches a copy receipt when a
    /// non-skip rule matched and the copy succeeded. All failures are soft:
    /// logged, no receipt, the detail is otherwise untouched.
    pub async fn apply(&self, detail: &mut Detail) {
        if let Some(receipt) = self.copy(detail).await {
            detail.s3_copy = Some(receipt);
        }
    }

    /// Runs rule evaluation, download/export, and upload. `None` means "do
    /// not attach a receipt" for any reason: removal, no matching rule, a
    /// skip rule, or a soft failure.
    pub async fn copy(&self, detail: &Detail) -> Option<S3Copy> {
        // Removed files have nothing to download.
        if detail.change.as_ref().is_some_and(|c| c.removed) {
            debug!("copy: skipping removed file");
            return None;
        }

        let rule = match self.config.match_rule(detail) {
            Ok(Some(rule)) => rule,
            Ok(None) => {
                debug!("copy: no matching rule");
                return None;
            }
            Err(err) => {
                warn!(error = %err, "copy: rule matching failed");
                return None;
            }
        };
        if rule.skip {
            debug!("copy: matched skip rule");
            return None;
        }

        let bucket_name = match self.config.bucket_name(rule, detail) {
            Ok(name) => name,
            Err(err) => {
                warn!(error = %err, "copy: failed to evaluate bucket_name");
                return None;
            }
        };
        let object_key = match self.config.object_key(rule, detail) {
            Ok(key) => key,
            Err(err) => {
                warn!(error = %err, "copy: failed to evaluate object_key");
                return None;
            }
        };

        let file_id = file_id_of(detail);
        if file_id.is_empty() {
            warn!("copy: no file id in detail");
            return None;
        }
        let mime_type = mime_type_of(detail);

        info!(
            file_id = %file_id,
            bucket = %bucket_name,
            key = %object_key,
            export = %rule.export,
            "copy: starting"
        );

        let downloaded = match self
            .download_or_export(&file_id, &mime_type, &rule.export)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                warn!(file_id = %file_id, error = %err, "copy: download/export failed");
                return None;
            }
        };

        let content_type = downloaded.content_type.clone();
        let output = match self
            .s3
            .put_object(
                &bucket_name,
                &object_key,
                downloaded.body.to_vec(),
                Some(&content_type),
            )
            .await
        {
            Ok(output) => output,
            Err(err) => {
                warn!(bucket = %bucket_name, key = %object_key, error = %err, "copy: upload failed");
                return None;
            }
        };

        info!(s3_uri = %output.s3_uri, content_type = %content_type, "copy: completed");
        Some(S3Copy {
            s3_uri: output.s3_uri,
            content_type,
            size: output.size,
            copied_at: Utc::now(),
        })
    }

    /// Workspace documents are exported (defaulting to pdf); everything else
    /// downloads directly. An explicit `export` format forces the export
    /// path.
    async fn download_or_export(
        &self,
        file_id: &str,
        mime_type: &str,
        export_format: &str,
    ) -> Result<DownloadResult, CopyError> {
        if !export_format.is_empty() || is_workspace_mime(mime_type) {
            let format = if export_format.is_empty() {
                DEFAULT_EXPORT_FORMAT
            } else {
                export_format
            };
            let export_mime = export_mime_type(format)
                .ok_or_else(|| CopyError::UnsupportedFormat(format.to_string()))?;
            Ok(self.drive.files_export_download(file_id, export_mime).await?)
        } else {
            Ok(self.drive.files_get_download(file_id).await?)
        }
    }
}

/// File id resolution: the change's `fileId` is preferred, the entity id is
/// the fallback.
fn file_id_of(detail: &Detail) -> String {
    if let Some(change) = &detail.change {
        if !change.file_id.is_empty() {
            return change.file_id.clone();
        }
    }
    if let Some(entity) = &detail.entity {
        if !entity.id.is_empty() {
            return entity.id.clone();
        }
    }
    String::new()
}

fn mime_type_of(detail: &Detail) -> String {
    detail
        .change
        .as_ref()
        .and_then(|c| c.file.as_ref())
        .map(|f| f.mime_type.clone())
        .unwrap_or_default()
}

/// Internal copy failure reasons (always handled softly by [`Copier::copy`]).
#[derive(Debug, thiserror::Error)]
enum CopyError {
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}
