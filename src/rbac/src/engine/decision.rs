//! Authorization decision types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::types::{PermissionId, Scope, UserId};

/// Outcome of a single has-permission query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum DecisionState {
    Resolved(bool),
    /// The query could not complete; always treated as denied
    Failed(ErrorKind),
}

/// Why a decision came out the way it did.
///
/// Kept for logs and operators. Callers only see `allowed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecisionReason {
    /// A qualifying assignment grants the permission
    Granted,

    /// No qualifying assignment grants the permission
    NotGranted,

    /// The catalog does not know the permission
    UnknownPermission,

    /// Resolution failed
    Error { kind: ErrorKind, message: String },
}

/// Authorization decision with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub user_id: UserId,

    pub permission: PermissionId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,

    pub state: DecisionState,

    pub reason: DecisionReason,

    /// Whether the decision was recorded in the audit log
    pub audited: bool,

    pub decided_at: DateTime<Utc>,
}

impl Decision {
    fn new(
        user_id: &str,
        permission: &str,
        scope: Option<&Scope>,
        state: DecisionState,
        reason: DecisionReason,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            permission: permission.to_string(),
            scope: scope.cloned(),
            state,
            reason,
            audited: false,
            decided_at: Utc::now(),
        }
    }

    pub fn allow(user_id: &str, permission: &str, scope: Option<&Scope>) -> Self {
        Self::new(
            user_id,
            permission,
            scope,
            DecisionState::Resolved(true),
            DecisionReason::Granted,
        )
    }

    pub fn deny(
        user_id: &str,
        permission: &str,
        scope: Option<&Scope>,
        reason: DecisionReason,
    ) -> Self {
        Self::new(user_id, permission, scope, DecisionState::Resolved(false), reason)
    }

    pub fn failed(
        user_id: &str,
        permission: &str,
        scope: Option<&Scope>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            user_id,
            permission,
            scope,
            DecisionState::Failed(kind),
            DecisionReason::Error {
                kind,
                message: message.into(),
            },
        )
    }

    /// Effective answer at the caller boundary; failures are denials
    pub fn allowed(&self) -> bool {
        matches!(self.state, DecisionState::Resolved(true))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, DecisionState::Failed(_))
    }

    /// Short text for audit entries
    pub fn reason_text(&self) -> String {
        match &self.reason {
            DecisionReason::Granted => "granted".to_string(),
            DecisionReason::NotGranted => format!("no assignment grants {}", self.permission),
            DecisionReason::UnknownPermission => {
                format!("{} is not in the permission catalog", self.permission)
            }
            DecisionReason::Error { kind, .. } => format!("decision failed: {}", kind),
        }
    }
}
