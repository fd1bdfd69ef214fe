//! HTTP client for the upstream document service (Drive API v3).
//!
//! Wraps `reqwest::Client` with bearer-token auth and a small retry loop for
//! transient statuses. The surface is exactly the seven operations the rest
//! of the system needs; nothing else from the API is exposed.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use tracing::{debug, warn};

use crate::types::{ChannelId, DriveId, ResourceId};

use super::error::UpstreamError;
use super::types::{
    ChangeListResponse, DownloadResult, DriveListResponse, StartPageTokenResponse, StopRequest,
    WatchRequest, WatchResponse,
};

/// Default base URL for Drive API v3.
pub const API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Page size requested from `changes.list`.
pub const CHANGES_PAGE_SIZE: u32 = 100;

/// Page size requested from `drives.list`.
pub const DRIVES_PAGE_SIZE: u32 = 10;

/// The pinned field projection for `changes.list`. Requested verbatim; the
/// event payload depends on every field listed here.
pub const CHANGES_FIELDS: &str = "newStartPageToken,nextPageToken,changes(time,kind,removed,fileId,changeType,driveId,drive(id,name,kind,themeId,orgUnitId,createdTime,hidden),file(id,name,driveId,kind,mimeType,modifiedTime,lastModifyingUser,trashed,trashedTime,trashingUser,version,size,md5Checksum,createdTime))";

/// Subscription delivery type. The service only pokes `web_hook` channels.
const CHANNEL_TYPE: &str = "web_hook";

/// Typed wrapper over the document service.
#[derive(Clone)]
pub struct DriveClient {
    http: reqwest::Client,
    token: String,
    base: String,
    max_retries: u32,
}

impl DriveClient {
    /// Creates a client against the production API.
    pub fn new(token: impl Into<String>) -> Result<Self, UpstreamError> {
        Self::with_base(token, API_BASE)
    }

    /// Creates a client against an alternate base URL (tests, emulators).
    pub fn with_base(
        token: impl Into<String>,
        base: impl Into<String>,
    ) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            token: token.into(),
            base: base.into().trim_end_matches('/').to_string(),
            max_retries: 3,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    fn auth_headers(&self) -> Result<HeaderMap, UpstreamError> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {}", self.token)).map_err(|_| {
            UpstreamError::Api {
                status: 0,
                message: "access token contains invalid header characters".to_string(),
            }
        })?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    /// Executes a request, retrying transient statuses with exponential
    /// backoff. Returns the successful response.
    async fn execute(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, UpstreamError> {
        let mut attempt = 0u32;
        loop {
            let mut req = self
                .http
                .request(method.clone(), url)
                .headers(self.auth_headers()?)
                .query(query);
            if let Some(ref b) = body {
                req = req.json(b);
            }
            debug!(%url, method = %method, "Drive API request");

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    }
                    let status_code = status.as_u16();
                    let text = resp.text().await.unwrap_or_default();
                    if UpstreamError::is_retriable_status(status_code) && attempt < self.max_retries
                    {
                        attempt += 1;
                        let backoff = Duration::from_millis(500 * 2u64.pow(attempt));
                        warn!(
                            status = status_code,
                            attempt,
                            max_retries = self.max_retries,
                            "Drive API transient error, retrying after {:?}",
                            backoff
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(UpstreamError::from_status(status_code, &text));
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    if attempt < self.max_retries {
                        attempt += 1;
                        let backoff = Duration::from_millis(500 * 2u64.pow(attempt));
                        warn!(
                            error = %e,
                            attempt,
                            "Drive API network error, retrying after {:?}",
                            backoff
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(UpstreamError::Transport(e));
                }
                Err(e) => return Err(UpstreamError::Transport(e)),
            }
        }
    }

    /// `changes.getStartPageToken`: the cursor for a fresh subscription.
    pub async fn get_start_page_token(&self, drive_id: &DriveId) -> Result<String, UpstreamError> {
        let mut query = vec![("supportsAllDrives", "true".to_string())];
        if !drive_id.is_default() {
            query.push(("driveId", drive_id.as_str().to_string()));
        }
        let resp = self
            .execute(
                Method::GET,
                &self.url("changes/startPageToken"),
                &query,
                None,
            )
            .await?;
        let token: StartPageTokenResponse = resp.json().await?;
        Ok(token.start_page_token)
    }

    /// `changes.watch`: subscribes a channel to pokes at `address`.
    pub async fn watch(
        &self,
        drive_id: &DriveId,
        page_token: &str,
        channel_id: &ChannelId,
        address: &str,
        expiration_ms: i64,
    ) -> Result<WatchResponse, UpstreamError> {
        let mut query = vec![
            ("pageToken", page_token.to_string()),
            ("supportsAllDrives", "true".to_string()),
            ("includeItemsFromAllDrives", "true".to_string()),
        ];
        if !drive_id.is_default() {
            query.push(("driveId", drive_id.as_str().to_string()));
        }
        let body = WatchRequest {
            id: channel_id.as_str().to_string(),
            channel_type: CHANNEL_TYPE.to_string(),
            address: address.to_string(),
            expiration: expiration_ms,
            payload: true,
        };
        let resp = self
            .execute(
                Method::POST,
                &self.url("changes/watch"),
                &query,
                Some(serde_json::to_value(&body)?),
            )
            .await?;
        Ok(resp.json().await?)
    }

    /// `changes.list`: one page of changes since `page_token`. The field
    /// projection is pinned; callers page via `next_page_token`.
    pub async fn changes_list(
        &self,
        drive_id: &DriveId,
        page_token: &str,
    ) -> Result<ChangeListResponse, UpstreamError> {
        let mut query = vec![
            ("pageToken", page_token.to_string()),
            ("pageSize", CHANGES_PAGE_SIZE.to_string()),
            ("includeCorpusRemovals", "true".to_string()),
            ("includeItemsFromAllDrives", "true".to_string()),
            ("supportsAllDrives", "true".to_string()),
            ("fields", CHANGES_FIELDS.to_string()),
        ];
        if !drive_id.is_default() {
            query.push(("driveId", drive_id.as_str().to_string()));
        }
        let resp = self
            .execute(Method::GET, &self.url("changes"), &query, None)
            .await?;
        Ok(resp.json().await?)
    }

    /// `channels.stop`: tears down a subscription. 404 surfaces as
    /// [`UpstreamError::NotFound`]; the caller treats that as success.
    pub async fn channels_stop(
        &self,
        channel_id: &ChannelId,
        resource_id: &ResourceId,
    ) -> Result<(), UpstreamError> {
        let body = StopRequest {
            id: channel_id.as_str().to_string(),
            resource_id: resource_id.as_str().to_string(),
        };
        self.execute(
            Method::POST,
            &self.url("channels/stop"),
            &[],
            Some(serde_json::to_value(&body)?),
        )
        .await?;
        Ok(())
    }

    /// `drives.list`: one page of shared drives visible to the credential.
    pub async fn drives_list(
        &self,
        page_token: Option<&str>,
    ) -> Result<DriveListResponse, UpstreamError> {
        let mut query = vec![("pageSize", DRIVES_PAGE_SIZE.to_string())];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        let resp = self
            .execute(Method::GET, &self.url("drives"), &query, None)
            .await?;
        Ok(resp.json().await?)
    }

    /// `files.get` with `alt=media`: downloads a regular file's content.
    pub async fn files_get_download(
        &self,
        file_id: &str,
    ) -> Result<DownloadResult, UpstreamError> {
        let query = vec![
            ("alt", "media".to_string()),
            ("supportsAllDrives", "true".to_string()),
        ];
        let url = self.url(&format!("files/{file_id}"));
        let resp = self.execute(Method::GET, &url, &query, None).await?;
        Self::download_result(resp).await
    }

    /// `files.export`: converts a workspace document to `mime_type` and
    /// downloads the result.
    pub async fn files_export_download(
        &self,
        file_id: &str,
        mime_type: &str,
    ) -> Result<DownloadResult, UpstreamError> {
        let query = vec![("mimeType", mime_type.to_string())];
        let url = self.url(&format!("files/{file_id}/export"));
        let resp = self.execute(Method::GET, &url, &query, None).await?;
        let mut result = Self::download_result(resp).await?;
        // The export endpoint does not always echo a content type; the
        // requested MIME type is authoritative.
        result.content_type = mime_type.to_string();
        Ok(result)
    }

    async fn download_result(resp: reqwest::Response) -> Result<DownloadResult, UpstreamError> {
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let declared_len = resp.content_length();
        let body = resp.bytes().await?;
        let size = declared_len.unwrap_or(body.len() as u64) as i64;
        Ok(DownloadResult {
            body,
            content_type,
            size,
        })
    }
}

impl std::fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveClient")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}
