use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use scribeflow_services::ServiceError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "BAD_INPUT",
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "INTERNAL",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            status: "error",
            error: self.kind,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::BadInput(_) | ServiceError::UnsupportedFormat(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::DurationExceeded { .. } | ServiceError::ContextLength(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ServiceError::UpstreamAuth(_) => StatusCode::BAD_GATEWAY,
            ServiceError::VectorDimMismatch { .. } => StatusCode::CONFLICT,
            ServiceError::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            ServiceError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
