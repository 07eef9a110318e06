use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::application::error::AppError;
use crate::application::render::RenderError;
use crate::domain::error::DomainError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const INVALID_ARGUMENT: &str = "invalid_argument";
    pub const NOT_FOUND: &str = "not_found";
    pub const DEADLINE_EXCEEDED: &str = "deadline_exceeded";
    pub const INTERNAL: &str = "internal";
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
        }
    }

    pub fn invalid_argument(message: &'static str, hint: Option<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_ARGUMENT,
            message,
            hint,
        )
    }

    pub fn not_found(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, hint)
    }

    pub fn deadline_exceeded(hint: Option<String>) -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            codes::DEADLINE_EXCEEDED,
            "Diagram render timed out",
            hint,
        )
    }

    pub fn internal(hint: Option<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL,
            "Internal server error",
            hint,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        map_app_error(&error)
    }
}

fn map_app_error(error: &AppError) -> ApiError {
    match error {
        AppError::Shared(inner) => map_app_error(inner),
        AppError::Domain(DomainError::Validation { .. })
        | AppError::Render(RenderError::Invalid(_))
        | AppError::Validation(_) => {
            ApiError::invalid_argument("Request could not be processed", Some(error.to_string()))
        }
        AppError::Domain(DomainError::MetadataNotFound { .. }) | AppError::NotFound(_) => {
            ApiError::not_found("Resource not found", Some(error.to_string()))
        }
        AppError::Render(RenderError::Timeout { .. }) => {
            ApiError::deadline_exceeded(Some(error.to_string()))
        }
        AppError::Domain(DomainError::Invariant { .. })
        | AppError::Render(_)
        | AppError::Infra(_)
        | AppError::Unexpected(_) => ApiError::internal(Some(error.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        let err = AppError::validation("must give a valid format");
        assert_eq!(ApiError::from(err).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn timeouts_map_to_gateway_timeout() {
        let err = AppError::Render(RenderError::Timeout {
            timeout: std::time::Duration::from_secs(10),
        });
        assert_eq!(ApiError::from(err).status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn shared_fill_errors_keep_their_inner_status() {
        let inner = AppError::validation("unable to decode diagram");
        let err = AppError::Shared(std::sync::Arc::new(inner));
        assert_eq!(ApiError::from(err).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn metadata_not_found_maps_to_404() {
        let err = AppError::NotFound("couldn't extract metadata from either PNG or SVG parsers");
        assert_eq!(ApiError::from(err).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invariant_violations_map_to_500() {
        let err = AppError::Domain(DomainError::invariant(
            "cache fill requested but the cache is not enabled",
        ));
        assert_eq!(
            ApiError::from(err).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
