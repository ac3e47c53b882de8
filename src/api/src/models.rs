//! API request and response models

use chrono::{DateTime, Utc};
use opsplatform_rbac::{
    Assignment, AuditEntry, AuditPage, AuditTarget, BulkAssignmentReport, BulkFailure,
    ChainVerification, EffectivePermissionSet, Permission, Role,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

// ============================================================================
// Health Model
// ============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,

    /// API version
    pub version: String,

    /// Whether the authorization store answered
    pub store_available: bool,

    pub uptime_seconds: u64,
}

// ============================================================================
// Query Models
// ============================================================================

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScopeQuery {
    /// `hospital:<id>` or `project:<id>`; omitted for global
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EffectivePermissionsResponse {
    pub user_id: String,

    pub scope: Option<String>,

    /// Sorted permission identifiers
    pub permissions: Vec<String>,
}

impl From<&EffectivePermissionSet> for EffectivePermissionsResponse {
    fn from(set: &EffectivePermissionSet) -> Self {
        Self {
            user_id: set.user_id.clone(),
            scope: set.scope.as_ref().map(|s| s.to_string()),
            permissions: set.permissions.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HasPermissionResponse {
    pub user_id: String,
    pub permission: String,
    pub scope: Option<String>,
    pub has_permission: bool,
}

// ============================================================================
// Catalog Models
// ============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PermissionResponse {
    /// Stable identifier, `domain.action`
    pub id: String,
    pub name: String,
    pub domain: String,
    pub description: String,
}

impl From<Permission> for PermissionResponse {
    fn from(p: Permission) -> Self {
        Self {
            id: p.id,
            name: p.name,
            domain: p.domain,
            description: p.description,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePermissionRequest {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

// ============================================================================
// Role Models
// ============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub description: String,
    /// `base` or `custom`
    pub kind: String,
    /// `global`, `hospital` or `project`
    pub scope_class: String,
    pub permissions: Vec<String>,
    /// Pass back on update and delete
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Role> for RoleResponse {
    fn from(role: Role) -> Self {
        Self {
            id: role.id,
            name: role.name,
            display_name: role.display_name,
            description: role.description,
            kind: role.kind.as_str().to_string(),
            scope_class: role.scope_class.as_str().to_string(),
            permissions: role.permissions.into_iter().collect(),
            version: role.version,
            created_at: role.created_at,
            updated_at: role.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to `global`
    #[serde(default)]
    pub scope_class: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    /// Version the caller last read
    pub version: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetPermissionsRequest {
    pub version: u64,
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VersionQuery {
    /// Version the caller last read
    pub version: u64,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RoleListQuery {
    /// Comma-separated role ids or names; all roles when omitted
    pub keys: Option<String>,
}

// ============================================================================
// Assignment Models
// ============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentResponse {
    pub id: Uuid,
    pub user_id: String,
    pub role_id: Uuid,
    pub scope: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl From<Assignment> for AssignmentResponse {
    fn from(a: Assignment) -> Self {
        Self {
            id: a.id,
            user_id: a.user_id,
            role_id: a.role_id,
            scope: a.scope.map(|s| s.to_string()),
            created_at: a.created_at,
            created_by: a.created_by,
        }
    }
}

/// Body of both assign and unassign
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRequest {
    pub user_id: String,
    pub role_id: Uuid,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkAssignmentRequest {
    pub user_ids: Vec<String>,
    pub role_id: Uuid,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkFailureResponse {
    pub user_id: String,
    pub error: String,
    pub message: String,
}

impl From<BulkFailure> for BulkFailureResponse {
    fn from(f: BulkFailure) -> Self {
        Self {
            user_id: f.user_id,
            error: f.kind.as_str().to_string(),
            message: f.message,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkAssignmentResponse {
    pub succeeded: Vec<AssignmentResponse>,
    pub failed: Vec<BulkFailureResponse>,
}

impl From<BulkAssignmentReport> for BulkAssignmentResponse {
    fn from(report: BulkAssignmentReport) -> Self {
        Self {
            succeeded: report.succeeded.into_iter().map(Into::into).collect(),
            failed: report.failed.into_iter().map(Into::into).collect(),
        }
    }
}

// ============================================================================
// Audit Models
// ============================================================================

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct AuditQuery {
    /// Entries where the user is actor or target
    pub user_id: Option<String>,
    /// e.g. `role.updated`, `access.denied`
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// `nextCursor` of the previous page
    pub cursor: Option<u64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditTargetResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl From<AuditTarget> for AuditTargetResponse {
    fn from(t: AuditTarget) -> Self {
        Self {
            role_id: t.role_id,
            user_id: t.user_id,
            assignment_id: t.assignment_id,
            permission_id: t.permission_id,
            scope: t.scope.map(|s| s.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntryResponse {
    pub seq: u64,
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    pub target: AuditTargetResponse,
    #[schema(value_type = Option<Object>)]
    pub before: Option<Value>,
    #[schema(value_type = Option<Object>)]
    pub after: Option<Value>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub prev_hash: String,
    pub hash: String,
}

impl From<AuditEntry> for AuditEntryResponse {
    fn from(e: AuditEntry) -> Self {
        Self {
            seq: e.seq,
            id: e.id,
            actor: e.actor,
            action: e.action.as_str().to_string(),
            target: e.target.into(),
            before: e.before,
            after: e.after,
            reason: e.reason,
            timestamp: e.timestamp,
            prev_hash: e.prev_hash,
            hash: e.hash,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditPageResponse {
    pub entries: Vec<AuditEntryResponse>,
    pub next_cursor: Option<u64>,
}

impl From<AuditPage> for AuditPageResponse {
    fn from(page: AuditPage) -> Self {
        Self {
            entries: page.entries.into_iter().map(Into::into).collect(),
            next_cursor: page.next_cursor,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerificationResponse {
    pub intact: bool,
    pub verified_entries: u64,
    pub first_broken_seq: Option<u64>,
}

impl From<ChainVerification> for ChainVerificationResponse {
    fn from(v: ChainVerification) -> Self {
        Self {
            intact: v.is_intact(),
            verified_entries: v.verified_entries,
            first_broken_seq: v.first_broken_seq,
        }
    }
}
