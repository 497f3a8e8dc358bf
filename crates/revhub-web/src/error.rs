use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use revhub_core::CoreError;
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub struct ApiError(pub CoreError);

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(CoreError::validation(message))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::Upstream(_) => StatusCode::BAD_GATEWAY,
            CoreError::IntegrityConflict(_) | CoreError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "request failed");
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(json!({ "ok": false, "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_classes_map_to_statuses() {
        let cases = [
            (CoreError::validation("page must be a number"), StatusCode::BAD_REQUEST),
            (CoreError::Unauthorized, StatusCode::UNAUTHORIZED),
            (CoreError::not_found("review", "hostaway:1"), StatusCode::NOT_FOUND),
            (CoreError::Upstream("timeout".into()), StatusCode::BAD_GATEWAY),
            (CoreError::Internal("pool closed".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }
}
