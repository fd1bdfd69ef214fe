//! AWS API error type with the error-code classification the storage and
//! emitter layers depend on.

use thiserror::Error;

/// An error from an AWS service call.
#[derive(Debug, Error)]
#[error("AWS {service} error ({code}): {message}")]
pub struct AwsError {
    /// Service short name, e.g. `dynamodb`.
    pub service: String,
    /// AWS error code, e.g. `ConditionalCheckFailedException`.
    pub code: String,
    pub message: String,
    /// HTTP status, 0 for transport-level failures.
    pub status: u16,
    /// Whether the base client may retry this error.
    pub retryable: bool,
}

impl AwsError {
    pub fn new(service: &str, code: &str, message: &str, status: u16) -> Self {
        let retryable = status == 429
            || (500..600).contains(&status)
            || matches!(
                code,
                "ThrottlingException"
                    | "ProvisionedThroughputExceededException"
                    | "RequestLimitExceeded"
                    | "ServiceUnavailable"
                    | "InternalServerError"
            );
        AwsError {
            service: service.to_string(),
            code: code.to_string(),
            message: message.to_string(),
            status,
            retryable,
        }
    }

    /// Builds an error from a JSON-protocol error body, e.g.
    /// `{"__type":"com.amazonaws...#ConditionalCheckFailedException","message":"..."}`.
    pub fn parse_json(service: &str, status: u16, body: &str) -> Self {
        let value: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
        let raw_type = value
            .get("__type")
            .and_then(|v| v.as_str())
            .unwrap_or("UnknownError");
        // Strip the "namespace#" prefix
        let code = raw_type.rsplit('#').next().unwrap_or(raw_type);
        let message = value
            .get("message")
            .or_else(|| value.get("Message"))
            .and_then(|v| v.as_str())
            .unwrap_or(body);
        AwsError::new(service, code, message, status)
    }

    /// Builds an error from a REST-XML error body (S3 style).
    pub fn parse_xml(service: &str, status: u16, body: &str) -> Self {
        let code = xml_text(body, "Code").unwrap_or_else(|| "UnknownError".to_string());
        let message = xml_text(body, "Message").unwrap_or_else(|| body.to_string());
        AwsError::new(service, &code, &message, status)
    }

    pub fn transport(service: &str, err: &reqwest::Error) -> Self {
        let mut e = AwsError::new(service, "TransportError", &err.to_string(), 0);
        e.retryable = err.is_timeout() || err.is_connect();
        e
    }

    /// True for DynamoDB conditional-write failures.
    pub fn is_conditional_check_failed(&self) -> bool {
        self.code == "ConditionalCheckFailedException"
    }

    /// True when the referenced resource (table, function, …) is absent.
    pub fn is_resource_not_found(&self) -> bool {
        self.code == "ResourceNotFoundException" || self.status == 404
    }

    /// True when a create collided with an existing resource.
    pub fn is_resource_in_use(&self) -> bool {
        self.code == "ResourceInUseException"
    }
}

/// Minimal XML text extraction for S3 error bodies.
fn xml_text(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)?;
    Some(xml[start..start + end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_error_strips_namespace() {
        let body = r#"{"__type":"com.amazonaws.dynamodb.v20120810#ConditionalCheckFailedException","message":"The conditional request failed"}"#;
        let err = AwsError::parse_json("dynamodb", 400, body);
        assert_eq!(err.code, "ConditionalCheckFailedException");
        assert!(err.is_conditional_check_failed());
        assert!(!err.retryable);
    }

    #[test]
    fn throttling_is_retryable() {
        let body = r#"{"__type":"ThrottlingException","message":"slow down"}"#;
        let err = AwsError::parse_json("eventbridge", 400, body);
        assert!(err.retryable);
    }

    #[test]
    fn xml_error_parses_code_and_message() {
        let body = r#"<?xml version="1.0"?><Error><Code>NoSuchBucket</Code><Message>The bucket does not exist</Message></Error>"#;
        let err = AwsError::parse_xml("s3", 404, body);
        assert_eq!(err.code, "NoSuchBucket");
        assert!(err.message.contains("does not exist"));
        assert!(err.is_resource_not_found());
    }

    #[test]
    fn five_hundreds_are_retryable() {
        let err = AwsError::new("s3", "InternalError", "oops", 500);
        assert!(err.retryable);
    }
}
