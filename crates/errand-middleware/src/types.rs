//! Common types used throughout the middleware pipeline.
//!
//! This module defines the HTTP request and response types used by
//! middleware, plus the single function that renders an [`ErrandError`].

use bytes::Bytes;
use errand_core::ErrandError;
use http::{header, HeaderValue, StatusCode};
use http_body_util::{BodyExt, Full};
use serde::Serialize;

/// The HTTP request type used in the middleware pipeline.
///
/// This is a standard `http::Request` with a `Full<Bytes>` body.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type used in the middleware pipeline.
///
/// This is a standard `http::Response` with a `Full<Bytes>` body.
pub type Response = http::Response<Full<Bytes>>;

/// `WWW-Authenticate` challenge sent with every 401.
pub const BASIC_CHALLENGE: &str = r#"Basic realm="Authentication Required""#;

/// Extension trait for building responses.
pub trait ResponseExt {
    /// Renders an error as `{"error": "<message>"}` with its fixed status.
    ///
    /// 401 responses carry a Basic challenge and 429 responses carry
    /// `Retry-After` when the error knows it.
    fn error(error: &ErrandError) -> Response;

    /// Creates a JSON error response with an explicit status.
    fn json_error(status: StatusCode, message: &str) -> Response;

    /// Creates a JSON response.
    fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response;

    /// Creates a response with no body.
    fn empty(status: StatusCode) -> Response;
}

impl ResponseExt for Response {
    fn error(error: &ErrandError) -> Response {
        let mut response = Self::json(error.status_code(), &error.to_body());
        let headers = response.headers_mut();

        match error {
            ErrandError::Unauthorized { .. } => {
                headers.insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static(BASIC_CHALLENGE),
                );
            }
            ErrandError::RateLimitExceeded {
                retry_after_seconds: Some(seconds),
                ..
            } => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from(*seconds));
            }
            _ => {}
        }

        response
    }

    fn json_error(status: StatusCode, message: &str) -> Response {
        Self::json(status, &serde_json::json!({ "error": message }))
    }

    fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response {
        let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());

        http::Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .expect("failed to build JSON response")
    }

    fn empty(status: StatusCode) -> Response {
        http::Response::builder()
            .status(status)
            .body(Full::new(Bytes::new()))
            .expect("failed to build empty response")
    }
}

/// Collects a buffered body into bytes.
pub async fn body_bytes(body: Full<Bytes>) -> Bytes {
    match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(never) => match never {},
    }
}

/// Splits a response into its parts and collected body bytes.
pub async fn into_parts_bytes(response: Response) -> (http::response::Parts, Bytes) {
    let (parts, body) = response.into_parts();
    (parts, body_bytes(body).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let (_, bytes) = into_parts_bytes(response).await;
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = Response::error(&ErrandError::validation("Invalid todo: missing task"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": "Invalid todo: missing task"})
        );
    }

    #[test]
    fn test_unauthorized_has_challenge() {
        let response = Response::error(&ErrandError::unauthorized("unauthorized"));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            BASIC_CHALLENGE
        );
    }

    #[test]
    fn test_rate_limited_has_retry_after() {
        let response = Response::error(&ErrandError::rate_limited("too many requests", Some(7)));
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "7");
    }

    #[tokio::test]
    async fn test_store_unavailable_is_generic() {
        let response = Response::error(&ErrandError::store_unavailable("redis at 10.0.0.3 down"));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert!(!body["error"].as_str().unwrap().contains("10.0.0.3"));
    }

    #[tokio::test]
    async fn test_empty_response() {
        let response = Response::empty(StatusCode::NOT_MODIFIED);
        let (_, bytes) = into_parts_bytes(response).await;
        assert!(bytes.is_empty());
    }
}
