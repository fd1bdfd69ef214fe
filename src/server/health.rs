//! Liveness probe.

use axum::http::StatusCode;

/// `GET /health` - always 200 while the process is serving.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "200 OK")
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::server::test_support::harness;
    use crate::server::build_router;

    #[tokio::test]
    async fn health_returns_200() {
        let harness = harness("http://127.0.0.1:1");
        let app = build_router(harness.state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"200 OK");
    }
}
