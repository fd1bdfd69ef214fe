//! Webhook-address auto-detection.
//!
//! When no public URL is configured, the first inbound request reveals it:
//! `X-Forwarded-Proto` + `X-Forwarded-Host` when a proxy forwards them, the
//! absolute request URI when a client sends one, and as a last resort the
//! hosting platform's function-URL configuration. The address is set once
//! and read many times; the holder is mutex-guarded.

use axum::http::{HeaderMap, Uri};
use tracing::{debug, info, warn};

use crate::aws::lambda::LambdaClient;
use crate::manager::WebhookAddress;

/// Ensures the webhook address is populated, adopting it from the request
/// context when still empty.
pub async fn ensure_webhook_address(
    webhook: &WebhookAddress,
    headers: &HeaderMap,
    uri: &Uri,
    lambda: Option<&LambdaClient>,
) {
    if !webhook.is_empty() {
        return;
    }
    let forwarded_proto = header(headers, "x-forwarded-proto");
    let forwarded_host = header(headers, "x-forwarded-host");
    debug!(
        scheme = ?uri.scheme_str(),
        host = ?uri.host(),
        x_forwarded_proto = %forwarded_proto,
        x_forwarded_host = %forwarded_host,
        "checking webhook address"
    );

    if !forwarded_proto.is_empty() && !forwarded_host.is_empty() {
        let address = format!("{forwarded_proto}://{forwarded_host}");
        if webhook.set_if_empty(&address) {
            info!(address = %address, "auto-detected webhook address from forwarded headers");
        }
        return;
    }

    if let (Some(scheme), Some(host)) = (uri.scheme_str(), uri.host()) {
        let address = format!("{scheme}://{host}");
        if webhook.set_if_empty(&address) {
            info!(address = %address, "auto-detected webhook address from request URI");
        }
        return;
    }

    // Hosted behind a managed function URL: ask the platform.
    let Some(lambda) = lambda else {
        warn!("failed to detect webhook address");
        return;
    };
    let Ok(function_name) = std::env::var("AWS_LAMBDA_FUNCTION_NAME") else {
        warn!("failed to detect webhook address (no function name in environment)");
        return;
    };
    info!(function_name = %function_name, "querying function url config for webhook address");
    match lambda.get_function_url_config(&function_name, None).await {
        Ok(config) if !config.function_url.is_empty() => {
            if webhook.set_if_empty(&config.function_url) {
                info!(
                    address = %config.function_url,
                    "auto-detected webhook address from function url config"
                );
            }
        }
        Ok(_) => warn!("function url config carries no url"),
        Err(err) => warn!(error = %err, "failed to get function url config"),
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwarded_headers_win() {
        let webhook = WebhookAddress::default();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-proto", "https".parse().unwrap());
        headers.insert("x-forwarded-host", "hook.example.com".parse().unwrap());

        ensure_webhook_address(&webhook, &headers, &Uri::from_static("/"), None).await;
        assert_eq!(webhook.get(), "https://hook.example.com");
    }

    #[tokio::test]
    async fn absolute_uri_is_used_without_forwarded_headers() {
        let webhook = WebhookAddress::default();
        let headers = HeaderMap::new();
        let uri = Uri::from_static("https://direct.example.com/");

        ensure_webhook_address(&webhook, &headers, &uri, None).await;
        assert_eq!(webhook.get(), "https://direct.example.com");
    }

    #[tokio::test]
    async fn configured_address_is_never_overwritten() {
        let webhook = WebhookAddress::new("https://configured.example/");
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-proto", "https".parse().unwrap());
        headers.insert("x-forwarded-host", "other.example.com".parse().unwrap());

        ensure_webhook_address(&webhook, &headers, &Uri::from_static("/"), None).await;
        assert_eq!(webhook.get(), "https://configured.example/");
    }

    #[tokio::test]
    async fn undetectable_address_stays_empty() {
        let webhook = WebhookAddress::default();
        ensure_webhook_address(&webhook, &HeaderMap::new(), &Uri::from_static("/"), None).await;
        assert!(webhook.is_empty());
    }
}
