//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use opsplatform_rbac::{ErrorKind, RbacError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError(pub RbacError);

/// JSON body of every error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Stable error kind (`not_found`, `conflict`, ...)
    pub error: String,

    /// Human-readable message; never carries data-layer detail
    pub message: String,

    /// Offending field, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::DuplicateName
        | ErrorKind::DuplicateAssignment
        | ErrorKind::ReferentialConflict
        | ErrorKind::InvariantViolation
        | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::ScopeMismatch => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Forbidden | ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let kind = err.kind();
        let status = status_for(kind);

        if status.is_server_error() {
            tracing::error!("Request failed: {}", err);
        }

        let body = Json(ErrorResponse {
            error: kind.as_str().to_string(),
            message: err.public_message(),
            field: err.field().map(String::from),
        });

        (status, body).into_response()
    }
}

impl From<RbacError> for ApiError {
    fn from(err: RbacError) -> Self {
        ApiError(err)
    }
}
