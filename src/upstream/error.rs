//! Upstream document-service error types.
//!
//! The only classification callers depend on is NotFound (a stopped channel
//! that is already gone is a success for delete) and transient-vs-not for
//! the client's internal retry loop.

use thiserror::Error;

/// An error from the upstream document service.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The referenced resource does not exist (HTTP 404).
    #[error("upstream resource not found: {0}")]
    NotFound(String),

    /// Any other non-success HTTP status.
    #[error("upstream API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure (connect, timeout, TLS).
    #[error("upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not match the expected shape.
    #[error("upstream response decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl UpstreamError {
    /// Builds an error from a non-success status and response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = extract_message(body).unwrap_or_else(|| truncate(body, 200));
        if status == 404 {
            UpstreamError::NotFound(message)
        } else {
            UpstreamError::Api { status, message }
        }
    }

    /// True for statuses worth retrying inside the client (429 and 5xx).
    pub fn is_retriable_status(status: u16) -> bool {
        status == 429 || (500..600).contains(&status)
    }

    /// True when a stopped subscription is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, UpstreamError::NotFound(_))
    }
}

/// Pulls `error.message` out of a Google API error body, if present.
fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(|s| s.to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_classification() {
        let err = UpstreamError::from_status(404, r#"{"error":{"message":"Channel not found"}}"#);
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Channel not found"));
    }

    #[test]
    fn api_error_with_plain_body() {
        let err = UpstreamError::from_status(500, "backend exploded");
        match err {
            UpstreamError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "backend exploded");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn retriable_statuses() {
        assert!(UpstreamError::is_retriable_status(429));
        assert!(UpstreamError::is_retriable_status(500));
        assert!(UpstreamError::is_retriable_status(503));
        assert!(!UpstreamError::is_retriable_status(404));
        assert!(!UpstreamError::is_retriable_status(400));
    }
}
