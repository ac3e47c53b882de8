//! Admin mutation service
//!
//! Every management call is authorized through the engine's own decision
//! point: `roles.manage` for roles and assignments, `permissions.manage` for
//! the catalog, `audit.read` for the audit log. Safety guards run inside the
//! store's unit of work and the engine's store handle invalidates the cache on
//! commit; this layer adds caller checks and audit entries for rejected calls.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit::{AuditDraft, AuditFilter, AuditPage, AuditTarget, ChainVerification, PageRequest};
use crate::catalog::{AUDIT_READ, PERMISSIONS_MANAGE, ROLES_MANAGE, ROLES_READ, USERS_READ};
use crate::engine::{DecisionState, RbacEngine};
use crate::error::{ErrorKind, RbacError, Result};
use crate::types::{
    Assignment, NewRole, Permission, PermissionId, Role, RoleId, RoleKind, RoleUpdate, Scope,
    UserId,
};

/// Request to append a permission to the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPermission {
    pub id: PermissionId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
}

/// Grant one role to many users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkAssignment {
    pub user_ids: Vec<UserId>,
    pub role_id: RoleId,
    #[serde(default)]
    pub scope: Option<Scope>,
}

/// Per-user failure in a bulk assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailure {
    pub user_id: UserId,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of a bulk assignment; each user is an independent unit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkAssignmentReport {
    pub succeeded: Vec<Assignment>,
    pub failed: Vec<BulkFailure>,
}

impl BulkAssignmentReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Authorized mutations over roles, assignments, the catalog and the audit log
pub struct AdminService {
    engine: Arc<RbacEngine>,
}

impl AdminService {
    pub fn new(engine: Arc<RbacEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<RbacEngine> {
        &self.engine
    }

    /// Check `caller` holds `permission` globally
    pub async fn authorize(&self, caller: &str, permission: &str, operation: &str) -> Result<()> {
        if caller.trim().is_empty() {
            return Err(RbacError::Unauthenticated);
        }

        let decision = self.engine.evaluate(caller, permission, None).await;
        if decision.allowed() {
            return Ok(());
        }

        if let DecisionState::Failed(kind) = decision.state {
            let message = format!("cannot authorize {} for {}", operation, caller);
            return Err(match kind {
                ErrorKind::StoreUnavailable => RbacError::StoreUnavailable(message),
                _ => RbacError::Internal(message),
            });
        }

        // Sensitive permissions were already audited by the decision point.
        if !decision.audited {
            let draft = AuditDraft::access_denied(
                caller,
                caller,
                permission,
                None,
                format!("{} requires {}", operation, permission),
            );
            if let Err(err) = self.engine.audit().record(draft).await {
                warn!("Failed to audit rejected {} by {}: {}", operation, caller, err);
            }
        }
        if let Some(metrics) = self.engine.metrics() {
            metrics.record_rejection().await;
        }

        warn!("{} denied {}: missing {}", caller, operation, permission);
        Err(RbacError::Unauthorized {
            user_id: caller.to_string(),
            permission: permission.to_string(),
        })
    }

    /// Users may always inspect themselves; anyone else needs `users.read`.
    pub async fn authorize_user_view(&self, caller: &str, user_id: &str) -> Result<()> {
        if caller.trim().is_empty() {
            return Err(RbacError::Unauthenticated);
        }
        if caller == user_id {
            return Ok(());
        }
        self.authorize(caller, USERS_READ, "inspect user").await
    }

    /// Role listings need `roles.read`
    pub async fn authorize_role_view(&self, caller: &str) -> Result<()> {
        self.authorize(caller, ROLES_READ, "view roles").await
    }

    /// Count the outcome; invariant violations also leave an audit trail.
    async fn settle<T>(&self, caller: &str, target: AuditTarget, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                if let Some(metrics) = self.engine.metrics() {
                    metrics.record_mutation().await;
                }
                Ok(value)
            }
            Err(err) => {
                if err.kind() == ErrorKind::InvariantViolation {
                    let draft = AuditDraft::rejected(caller, target, err.to_string());
                    if let Err(audit_err) = self.engine.audit().record(draft).await {
                        warn!("Failed to audit rejected mutation by {}: {}", caller, audit_err);
                    }
                    if let Some(metrics) = self.engine.metrics() {
                        metrics.record_rejection().await;
                    }
                }
                Err(err)
            }
        }
    }

    async fn ensure_user(&self, user_id: &str) -> Result<()> {
        if user_id.trim().is_empty() {
            return Err(RbacError::invalid("user_id", "user id cannot be empty"));
        }
        if !self.engine.directory().user_exists(user_id).await? {
            return Err(RbacError::not_found("user", user_id));
        }
        Ok(())
    }

    // ---- catalog ----

    pub async fn add_permission(&self, caller: &str, request: NewPermission) -> Result<Permission> {
        self.authorize(caller, PERMISSIONS_MANAGE, "add permission").await?;

        let name = request
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| request.id.clone());
        let permission = Permission::new(request.id, name, request.description);

        let target = AuditTarget {
            permission_id: Some(permission.id.clone()),
            ..Default::default()
        };
        let result = self.engine.store().add_permission(permission, caller).await;
        let permission = self.settle(caller, target, result).await?;

        info!("Permission {} added by {}", permission.id, caller);
        Ok(permission)
    }

    pub async fn remove_permission(&self, caller: &str, id: &str) -> Result<Permission> {
        self.authorize(caller, PERMISSIONS_MANAGE, "remove permission").await?;

        let target = AuditTarget {
            permission_id: Some(id.to_string()),
            ..Default::default()
        };
        let result = self.engine.store().remove_permission(id, caller).await;
        let permission = self.settle(caller, target, result).await?;

        info!("Permission {} removed by {}", permission.id, caller);
        Ok(permission)
    }

    // ---- roles ----

    /// Create a custom role
    pub async fn create_role(&self, caller: &str, mut new: NewRole) -> Result<Role> {
        self.authorize(caller, ROLES_MANAGE, "create role").await?;

        new.name = new.name.trim().to_string();
        if new.name.is_empty() {
            return Err(RbacError::invalid("name", "role name cannot be empty"));
        }
        if new.display_name.trim().is_empty() {
            new.display_name = new.name.clone();
        }

        let result = self
            .engine
            .store()
            .create_role(new, RoleKind::Custom, caller)
            .await;
        let role = self.settle(caller, AuditTarget::default(), result).await?;

        info!("Role {} created by {}", role.name, caller);
        Ok(role)
    }

    pub async fn update_role(
        &self,
        caller: &str,
        role_id: &RoleId,
        expected_version: u64,
        mut update: RoleUpdate,
    ) -> Result<Role> {
        self.authorize(caller, ROLES_MANAGE, "update role").await?;

        if update.is_empty() {
            return Err(RbacError::invalid("update", "no fields to update"));
        }
        if let Some(name) = update.name.as_mut() {
            *name = name.trim().to_string();
            if name.is_empty() {
                return Err(RbacError::invalid("name", "role name cannot be empty"));
            }
        }

        let result = self
            .engine
            .store()
            .update_role(role_id, expected_version, update, caller)
            .await;
        let role = self.settle(caller, role_target(role_id), result).await?;

        info!("Role {} updated by {} (version {})", role.name, caller, role.version);
        Ok(role)
    }

    /// Replace the full permission set of a role
    pub async fn set_role_permissions(
        &self,
        caller: &str,
        role_id: &RoleId,
        expected_version: u64,
        permissions: Vec<PermissionId>,
    ) -> Result<Role> {
        self.authorize(caller, ROLES_MANAGE, "set role permissions").await?;

        let result = self
            .engine
            .store()
            .set_permissions(role_id, expected_version, permissions, caller)
            .await;
        let role = self.settle(caller, role_target(role_id), result).await?;

        info!(
            "Role {} now grants {} permissions (set by {})",
            role.name,
            role.permissions.len(),
            caller
        );
        Ok(role)
    }

    pub async fn delete_role(
        &self,
        caller: &str,
        role_id: &RoleId,
        expected_version: u64,
    ) -> Result<Role> {
        self.authorize(caller, ROLES_MANAGE, "delete role").await?;

        let result = self
            .engine
            .store()
            .delete_role(role_id, expected_version, caller)
            .await;
        let role = self.settle(caller, role_target(role_id), result).await?;

        info!("Role {} deleted by {}", role.name, caller);
        Ok(role)
    }

    // ---- assignments ----

    pub async fn assign(
        &self,
        caller: &str,
        user_id: &str,
        role_id: &RoleId,
        scope: Option<Scope>,
    ) -> Result<Assignment> {
        self.authorize(caller, ROLES_MANAGE, "assign role").await?;
        self.assign_authorized(caller, user_id, role_id, scope).await
    }

    async fn assign_authorized(
        &self,
        caller: &str,
        user_id: &str,
        role_id: &RoleId,
        scope: Option<Scope>,
    ) -> Result<Assignment> {
        self.ensure_user(user_id).await?;

        let target = assignment_target(user_id, role_id, scope.as_ref());
        let result = self
            .engine
            .store()
            .assign(user_id, role_id, scope, caller)
            .await;
        let assignment = self.settle(caller, target, result).await?;

        info!(
            "Role {} assigned to {} by {}",
            assignment.role_id, assignment.user_id, caller
        );
        Ok(assignment)
    }

    /// Remove a binding. Removing an absent binding fails with `NotFound`.
    pub async fn unassign(
        &self,
        caller: &str,
        user_id: &str,
        role_id: &RoleId,
        scope: Option<&Scope>,
    ) -> Result<Assignment> {
        self.authorize(caller, ROLES_MANAGE, "unassign role").await?;

        let result = self
            .engine
            .store()
            .unassign(user_id, role_id, scope, caller)
            .await;
        let assignment = self
            .settle(caller, assignment_target(user_id, role_id, scope), result)
            .await?;

        info!("Role {} removed from {} by {}", role_id, user_id, caller);
        Ok(assignment)
    }

    /// Assign one role to many users; one user's failure does not affect the others.
    pub async fn bulk_assign(
        &self,
        caller: &str,
        request: BulkAssignment,
    ) -> Result<BulkAssignmentReport> {
        self.authorize(caller, ROLES_MANAGE, "bulk assign").await?;

        if request.user_ids.is_empty() {
            return Err(RbacError::invalid("user_ids", "at least one user is required"));
        }

        let mut report = BulkAssignmentReport::default();
        for user_id in &request.user_ids {
            match self
                .assign_authorized(caller, user_id, &request.role_id, request.scope.clone())
                .await
            {
                Ok(assignment) => report.succeeded.push(assignment),
                Err(err) => report.failed.push(BulkFailure {
                    user_id: user_id.clone(),
                    kind: err.kind(),
                    message: err.public_message(),
                }),
            }
        }

        info!(
            "Bulk assignment of {} by {}: {} succeeded, {} failed",
            request.role_id,
            caller,
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    // ---- audit ----

    pub async fn query_audit(
        &self,
        caller: &str,
        filter: &AuditFilter,
        page: PageRequest,
    ) -> Result<AuditPage> {
        self.authorize(caller, AUDIT_READ, "query audit log").await?;
        self.engine.audit().query(filter, page).await
    }

    pub async fn verify_audit_chain(&self, caller: &str) -> Result<ChainVerification> {
        self.authorize(caller, AUDIT_READ, "verify audit log").await?;
        self.engine.audit().verify().await
    }

    /// Audit entries are immutable; this always fails with `Forbidden`.
    pub async fn delete_audit_entry(&self, caller: &str, seq: u64) -> Result<()> {
        if caller.trim().is_empty() {
            return Err(RbacError::Unauthenticated);
        }
        self.engine.audit().delete(seq).await
    }
}

fn role_target(role_id: &RoleId) -> AuditTarget {
    AuditTarget {
        role_id: Some(*role_id),
        ..Default::default()
    }
}

fn assignment_target(user_id: &str, role_id: &RoleId, scope: Option<&Scope>) -> AuditTarget {
    AuditTarget {
        role_id: Some(*role_id),
        user_id: Some(user_id.to_string()),
        scope: scope.cloned(),
        ..Default::default()
    }
}
