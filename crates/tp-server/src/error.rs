//! Error-to-HTTP response conversion.
//!
//! Wraps [`tp_core::Error`] so route handlers can return
//! `Result<T, AppError>` and get a `{"error": ...}` body with the right
//! status code.

use std::any::Any;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Message shown to clients for every server-side failure.
pub const GENERIC_ERROR: &str = "An unexpected error occurred. Please try again.";

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: tp_core::Error,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: tp_core::Error) -> Self {
        Self {
            inner,
            request_id: None,
        }
    }

    #[must_use]
    pub fn with_request_id(mut self, id: Option<String>) -> Self {
        self.request_id = id;
        self
    }

    pub fn inner(&self) -> &tp_core::Error {
        &self.inner
    }
}

impl From<tp_core::Error> for AppError {
    fn from(e: tp_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() && !self.inner.is_client_facing() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                request_id = self.request_id.as_deref().unwrap_or("-"),
                "Server error in download handler"
            );
        }

        let message = if self.inner.is_client_facing() {
            self.inner.to_string()
        } else {
            GENERIC_ERROR.to_string()
        };

        let body = match self.request_id {
            Some(id) => json!({ "error": message, "request_id": id }),
            None => json!({ "error": message }),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Response for a handler that panicked: the generic 500 body, with the
/// panic message kept in the log.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    tracing::error!(panic = %message, "Request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(json!({ "error": GENERIC_ERROR })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_produces_400_with_message() {
        let response = AppError::new(tp_core::Error::Validation("bad url".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "bad url");
    }

    #[tokio::test]
    async fn timeout_produces_504() {
        let response = AppError::new(tp_core::Error::Timeout("too slow".into())).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body_json(response).await["error"], "too slow");
    }

    #[tokio::test]
    async fn internal_text_is_never_leaked() {
        let response = AppError::new(tp_core::Error::tool("yt-dlp", "/secret/path exploded"))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], GENERIC_ERROR);
        assert!(!body.to_string().contains("/secret/path"));
    }

    #[tokio::test]
    async fn with_request_id() {
        let response = AppError::new(tp_core::Error::MissingClientIp)
            .with_request_id(Some("req-123".into()))
            .into_response();
        let body = body_json(response).await;
        assert_eq!(body["error"], "Missing IP address.");
        assert_eq!(body["request_id"], "req-123");
    }

    #[tokio::test]
    async fn panic_payload_stays_out_of_the_body() {
        let response = panic_response(Box::new(String::from("index out of bounds in /srv/app")));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], GENERIC_ERROR);
        assert!(!body.to_string().contains("/srv/app"));
    }
}
