//! Request extractors

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use opsplatform_rbac::{RbacError, Scope, UserId};

use crate::error::ApiError;

/// Header carrying the caller id, set by the upstream authentication gateway
pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated caller. Requests without a usable `x-user-id` are rejected with 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub UserId);

impl Caller {
    pub fn id(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| Caller(id.to_string()))
            .ok_or(ApiError(RbacError::Unauthenticated))
    }
}

/// Parse an optional `kind:id` scope; absent, empty and `global` mean no scope.
pub fn parse_scope(raw: Option<&str>) -> Result<Option<Scope>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") | Some("global") => Ok(None),
        Some(s) => Ok(Some(s.parse::<Scope>()?)),
    }
}
