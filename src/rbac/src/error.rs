//! Error types for the RBAC engine

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable error taxonomy surfaced to callers of the management surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    DuplicateName,
    DuplicateAssignment,
    ScopeMismatch,
    ReferentialConflict,
    InvariantViolation,
    Conflict,
    Forbidden,
    Unauthorized,
    Unauthenticated,
    InvalidInput,
    StoreUnavailable,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::DuplicateName => "duplicate_name",
            Self::DuplicateAssignment => "duplicate_assignment",
            Self::ScopeMismatch => "scope_mismatch",
            Self::ReferentialConflict => "referential_conflict",
            Self::InvariantViolation => "invariant_violation",
            Self::Conflict => "conflict",
            Self::Forbidden => "forbidden",
            Self::Unauthorized => "unauthorized",
            Self::Unauthenticated => "unauthenticated",
            Self::InvalidInput => "invalid_input",
            Self::StoreUnavailable => "store_unavailable",
            Self::Internal => "internal",
        }
    }

    /// Whether the caller can recover by re-reading and retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict | Self::StoreUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RBAC engine errors
#[derive(Debug, Error)]
pub enum RbacError {
    /// Unknown role, permission, assignment or user
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A role or permission with this name already exists
    #[error("{entity} name already in use: {name}")]
    DuplicateName { entity: &'static str, name: String },

    /// The (user, role, scope) binding already exists
    #[error("user {user_id} already holds role {role} in scope {scope}")]
    DuplicateAssignment {
        user_id: String,
        role: String,
        scope: String,
    },

    /// Assignment scope does not fit the role's scope class
    #[error("scope {scope} is not valid for {scope_class} role {role}")]
    ScopeMismatch {
        role: String,
        scope_class: String,
        scope: String,
    },

    /// Delete blocked by live references
    #[error("{entity} {id} is still referenced by {references} {referrer}(s)")]
    ReferentialConflict {
        entity: &'static str,
        id: String,
        referrer: &'static str,
        references: usize,
    },

    /// Safety invariant would be broken (last administrator)
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Optimistic version mismatch
    #[error("version conflict on {entity} {id}: expected {expected}, found {actual}")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: u64,
        actual: u64,
    },

    /// Attempt to change an immutable attribute of a base role
    #[error("base role {role} is immutable: cannot change {field}")]
    Immutable { role: String, field: &'static str },

    /// Operation is never permitted (audit deletion, base role deletion)
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Caller lacks the management permission required for the call
    #[error("user {user_id} lacks permission {permission}")]
    Unauthorized { user_id: String, permission: String },

    /// No caller identity was supplied
    #[error("caller is not authenticated")]
    Unauthenticated,

    /// Invalid input
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    /// Backing store could not complete the request
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl RbacError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// Stable kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::DuplicateName { .. } => ErrorKind::DuplicateName,
            Self::DuplicateAssignment { .. } => ErrorKind::DuplicateAssignment,
            Self::ScopeMismatch { .. } => ErrorKind::ScopeMismatch,
            Self::ReferentialConflict { .. } => ErrorKind::ReferentialConflict,
            Self::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Immutable { .. } | Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Offending field, when the error points at one
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::DuplicateName { .. } => Some("name"),
            Self::DuplicateAssignment { .. } => Some("user_id"),
            Self::ScopeMismatch { .. } => Some("scope"),
            Self::Conflict { .. } => Some("version"),
            Self::Immutable { field, .. } => Some(*field),
            Self::InvalidInput { field, .. } => Some(*field),
            Self::NotFound { entity, .. } => Some(*entity),
            _ => None,
        }
    }

    /// Message safe to show to an end user. Data-layer details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::StoreUnavailable(_) => "authorization store is temporarily unavailable".to_string(),
            Self::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for RbacError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("40001") => {
                Self::Conflict {
                    entity: "transaction",
                    id: "serialization".to_string(),
                    expected: 0,
                    actual: 0,
                }
            }
            _ => Self::StoreUnavailable(err.to_string()),
        }
    }
}

/// Result type for RBAC operations
pub type Result<T> = std::result::Result<T, RbacError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immutable_maps_to_forbidden() {
        let err = RbacError::Immutable {
            role: "administrator".to_string(),
            field: "name",
        };
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.field(), Some("name"));
    }

    #[test]
    fn test_store_errors_are_not_surfaced_verbatim() {
        let err = RbacError::StoreUnavailable("connection refused at 10.0.0.4:5432".to_string());
        assert!(!err.public_message().contains("10.0.0.4"));
        assert!(err.kind().is_retryable());
    }
}
