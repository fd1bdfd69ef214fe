//! Minimal Lambda control-plane client: `GetFunctionUrlConfig` only.
//!
//! Used by webhook-address auto-detection when the process is hosted behind
//! a function URL and no forwarded headers reveal the public address.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::client::AwsClient;
use super::error::AwsError;

const SERVICE: &str = "lambda";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionUrlConfig {
    #[serde(default)]
    pub function_url: String,
}

/// Lambda client bound to one base client.
#[derive(Debug, Clone)]
pub struct LambdaClient {
    client: AwsClient,
}

impl LambdaClient {
    pub fn new(client: AwsClient) -> Self {
        Self { client }
    }

    /// Fetches the public URL configured for `function_name` (optionally a
    /// specific qualifier).
    pub async fn get_function_url_config(
        &self,
        function_name: &str,
        qualifier: Option<&str>,
    ) -> Result<FunctionUrlConfig, AwsError> {
        let mut path = format!("/2021-10-31/functions/{}/url", function_name);
        if let Some(q) = qualifier {
            path.push_str(&format!("?Qualifier={q}"));
        }
        let resp = self
            .client
            .rest_request(SERVICE, "GET", &path, BTreeMap::new(), Vec::new())
            .await?;
        serde_json::from_str(&resp.body)
            .map_err(|e| AwsError::new(SERVICE, "DeserializationError", &e.to_string(), 0))
    }
}
