//! Base AWS HTTP client: SigV4 signing, endpoint resolution, retry.
//!
//! Two request styles are supported: the JSON target-header protocol used by
//! DynamoDB and EventBridge, and plain REST used by S3 and the Lambda
//! control plane.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, warn};

use super::error::AwsError;
use super::signing::{Credentials, SigV4Signer};

/// Default region when none is configured.
const DEFAULT_REGION: &str = "us-east-1";

/// A response from an AWS API call.
#[derive(Debug, Clone)]
pub struct AwsResponse {
    pub status: u16,
    pub body: String,
}

/// SigV4-signing HTTP client shared by the per-service wrappers.
#[derive(Debug, Clone)]
pub struct AwsClient {
    http: reqwest::Client,
    credentials: Credentials,
    region: String,
    /// Endpoint override for emulators (LocalStack et al.).
    endpoint_override: Option<String>,
    max_attempts: u32,
}

impl AwsClient {
    pub fn new(credentials: Credentials, region: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        AwsClient {
            http,
            credentials,
            region: region.into(),
            endpoint_override: None,
            max_attempts: 3,
        }
    }

    /// Builds a client from `AWS_ACCESS_KEY_ID`/`AWS_SECRET_ACCESS_KEY`/
    /// `AWS_SESSION_TOKEN` and `AWS_DEFAULT_REGION` (or `AWS_REGION`), plus
    /// `AWS_ENDPOINT_URL` as an endpoint override.
    pub fn from_env() -> Result<Self, AwsError> {
        let credentials = Credentials::from_env().ok_or_else(|| {
            AwsError::new(
                "config",
                "MissingCredentials",
                "AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY are not set",
                0,
            )
        })?;
        let region = std::env::var("AWS_DEFAULT_REGION")
            .or_else(|_| std::env::var("AWS_REGION"))
            .unwrap_or_else(|_| DEFAULT_REGION.to_string());
        let mut client = AwsClient::new(credentials, region);
        if let Ok(endpoint) = std::env::var("AWS_ENDPOINT_URL") {
            client.endpoint_override = Some(endpoint);
        }
        Ok(client)
    }

    /// Overrides the service endpoint (tests, emulators).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_override = Some(endpoint.into());
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Regional endpoint for `service`, honoring the override.
    pub fn endpoint(&self, service: &str) -> String {
        match self.endpoint_override {
            Some(ref url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.{}.amazonaws.com", service, self.region),
        }
    }

    /// Executes a JSON target-header request (`x-amz-target` protocol).
    /// `json_version` selects the protocol content type: `"1.0"` for
    /// DynamoDB, `"1.1"` for EventBridge and most newer services.
    pub async fn json_request(
        &self,
        service: &str,
        target: &str,
        json_version: &str,
        body: &serde_json::Value,
    ) -> Result<AwsResponse, AwsError> {
        let endpoint = self.endpoint(service);
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), host_of(&endpoint));
        headers.insert(
            "content-type".to_string(),
            format!("application/x-amz-json-{json_version}"),
        );
        headers.insert("x-amz-target".to_string(), target.to_string());

        let payload = serde_json::to_vec(body).map_err(|e| {
            AwsError::new(service, "SerializationError", &e.to_string(), 0)
        })?;
        self.execute_with_retry(service, "POST", &format!("{endpoint}/"), headers, payload)
            .await
    }

    /// Executes a signed REST request against `service` at `path` (which may
    /// carry a query string). Used by S3 and the Lambda control plane.
    pub async fn rest_request(
        &self,
        service: &str,
        method: &str,
        path: &str,
        extra_headers: BTreeMap<String, String>,
        body: Vec<u8>,
    ) -> Result<AwsResponse, AwsError> {
        let endpoint = self.endpoint(service);
        let url = if path.starts_with('/') {
            format!("{endpoint}{path}")
        } else {
            format!("{endpoint}/{path}")
        };
        let mut headers = extra_headers;
        headers.insert("host".to_string(), host_of(&endpoint));
        self.execute_with_retry(service, method, &url, headers, body)
            .await
    }

    async fn execute_with_retry(
        &self,
        service: &str,
        method: &str,
        url: &str,
        headers: BTreeMap<String, String>,
        body: Vec<u8>,
    ) -> Result<AwsResponse, AwsError> {
        let mut last_err: Option<AwsError> = None;
        for attempt in 0..self.max_attempts {
            match self.execute_signed(service, method, url, &headers, &body).await {
                Ok(resp) if (200..300).contains(&resp.status) => return Ok(resp),
                Ok(resp) => {
                    let err = if resp.body.trim_start().starts_with('<') {
                        AwsError::parse_xml(service, resp.status, &resp.body)
                    } else {
                        AwsError::parse_json(service, resp.status, &resp.body)
                    };
                    if err.retryable && attempt + 1 < self.max_attempts {
                        let delay = backoff_with_jitter(attempt);
                        warn!(
                            service,
                            code = %err.code,
                            attempt,
                            "retryable AWS error, retrying after {:?}",
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(err) => {
                    if err.retryable && attempt + 1 < self.max_attempts {
                        let delay = backoff_with_jitter(attempt);
                        warn!(service, error = %err, attempt, "AWS transport error, retrying after {:?}", delay);
                        tokio::time::sleep(delay).await;
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            AwsError::new(service, "MaxRetriesExceeded", "request failed after retries", 0)
        }))
    }

    async fn execute_signed(
        &self,
        service: &str,
        method: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &[u8],
    ) -> Result<AwsResponse, AwsError> {
        let signer = SigV4Signer::new(self.credentials.clone(), &self.region, service);
        let signed_headers = signer.sign(method, url, headers, body, Utc::now());
        debug!(service, method, url, "AWS API request");

        let http_method: reqwest::Method = method
            .parse()
            .map_err(|_| AwsError::new(service, "InvalidMethod", method, 0))?;
        let mut req = self.http.request(http_method, url);
        for (key, value) in &signed_headers {
            req = req.header(key.as_str(), value.as_str());
        }
        if !body.is_empty() {
            req = req.body(body.to_vec());
        }

        let resp = req.send().await.map_err(|e| AwsError::transport(service, &e))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| AwsError::transport(service, &e))?;
        Ok(AwsResponse { status, body })
    }
}

/// Exponential backoff with full jitter: random in [0, 200ms·2^attempt].
fn backoff_with_jitter(attempt: u32) -> Duration {
    let cap = 200u64 * 2u64.pow(attempt.min(6));
    let ms = rand::thread_rng().gen_range(0..=cap);
    Duration::from_millis(ms)
}

fn host_of(endpoint: &str) -> String {
    url::Url::parse(endpoint)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| "amazonaws.com".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> AwsClient {
        AwsClient::new(
            Credentials {
                access_key_id: "AKID".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: None,
            },
            "ap-northeast-1",
        )
    }

    #[test]
    fn regional_endpoint() {
        let client = test_client();
        assert_eq!(
            client.endpoint("dynamodb"),
            "https://dynamodb.ap-northeast-1.amazonaws.com"
        );
        assert_eq!(
            client.endpoint("events"),
            "https://events.ap-northeast-1.amazonaws.com"
        );
    }

    #[test]
    fn endpoint_override_wins() {
        let client = test_client().with_endpoint("http://localhost:4566/");
        assert_eq!(client.endpoint("dynamodb"), "http://localhost:4566");
    }

    #[test]
    fn host_extraction() {
        assert_eq!(
            host_of("https://s3.us-east-1.amazonaws.com"),
            "s3.us-east-1.amazonaws.com"
        );
        assert_eq!(host_of("http://localhost:4566"), "localhost");
    }

    #[test]
    fn backoff_stays_within_cap() {
        for attempt in 0..8 {
            let d = backoff_with_jitter(attempt);
            assert!(d <= Duration::from_millis(200 * 2u64.pow(attempt.min(6))));
        }
    }
}
