//! Relay error to HTTP response conversion.

use axum::extract::rejection::PathRejection;
use axum::response::{IntoResponse, Response};
use ferry_core::RelayError;
use serde_json::json;

/// Error returned by route handlers, rendered as `{ "error", "code" }` JSON.
#[derive(Debug)]
pub struct ApiError(RelayError);

impl ApiError {
    /// The relay error being reported.
    pub fn inner(&self) -> &RelayError {
        &self.0
    }
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self(e)
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(RelayError::BadRequest {
            reason: format!("Invalid media identifiers: {}", rejection.body_text()),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.0, "Relay request failed");
        } else {
            tracing::debug!(status = %status, error = %self.0, "Relay request rejected");
        }

        let body = json!({
            "error": self.0.to_string(),
            "code": self.0.code(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use ferry_core::MediaReference;

    use super::*;

    #[test]
    fn not_found_produces_404() {
        let err = ApiError::from(RelayError::NotFound {
            reference: MediaReference::new(1, 2),
        });
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unavailable_upstream_produces_502() {
        let err = ApiError::from(RelayError::UpstreamUnavailable {
            reason: "connection refused".into(),
        });
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn body_carries_message_and_code() {
        let response = ApiError::from(RelayError::Upstream {
            reason: "session expired".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Error fetching message: session expired");
        assert_eq!(body["code"], "upstream_error");
    }
}
