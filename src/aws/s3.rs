//! Minimal S3 client: `PutObject` only, path-style addressing.

use std::collections::BTreeMap;

use super::client::AwsClient;
use super::error::AwsError;
use super::signing::uri_encode;

const SERVICE: &str = "s3";

/// Result of a successful object upload.
#[derive(Debug, Clone)]
pub struct PutObjectOutput {
    /// `s3://bucket/key` form of the stored object.
    pub s3_uri: String,
    pub size: i64,
}

/// S3 client bound to one base client.
#[derive(Debug, Clone)]
pub struct S3Client {
    client: AwsClient,
}

impl S3Client {
    pub fn new(client: AwsClient) -> Self {
        Self { client }
    }

    /// Uploads `body` to `bucket/key` with Content-Length and, when known,
    /// Content-Type.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<PutObjectOutput, AwsError> {
        let size = body.len() as i64;
        let mut headers = BTreeMap::new();
        headers.insert("content-length".to_string(), size.to_string());
        if let Some(ct) = content_type {
            if !ct.is_empty() {
                headers.insert("content-type".to_string(), ct.to_string());
            }
        }

        let path = format!("/{}/{}", bucket, encode_key(key));
        self.client
            .rest_request(SERVICE, "PUT", &path, headers, body)
            .await?;
        Ok(PutObjectOutput {
            s3_uri: format!("s3://{}/{}", bucket, key),
            size,
        })
    }
}

/// Percent-encodes an object key, preserving `/` separators.
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(uri_encode)
        .collect::<Vec<_>>()
        .join("/")
}
