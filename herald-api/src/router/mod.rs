pub mod admin;
pub mod status;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use herald_core::CoordinatorError;
use serde_json::json;

/// 把协调器错误映射为统一的HTTP错误响应
pub fn coordinator_error_response(error: CoordinatorError) -> Response {
    let (status, kind) = match &error {
        CoordinatorError::NotRunning => (StatusCode::CONFLICT, "not_running"),
        CoordinatorError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        CoordinatorError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration"),
    };

    (
        status,
        Json(json!({
            "error": {
                "type": kind,
                "message": error.to_string(),
                "code": status.as_u16()
            }
        })),
    )
        .into_response()
}
