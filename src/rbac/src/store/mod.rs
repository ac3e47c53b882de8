//! Persistence for the permission catalog, roles, assignments and audit entries
//!
//! Each mutation validates its own guards (uniqueness, referential integrity,
//! optimistic version, last administrator) and appends its audit entry in the
//! same unit of work, so a mutation is never committed without its audit
//! record and never audited without being committed.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::audit::{AuditDraft, AuditEntry, AuditFilter, AuditPage, PageRequest};
use crate::catalog::{ADMIN_ROLE, ROLES_MANAGE};
use crate::error::{RbacError, Result};
use crate::types::{
    normalize_name, Assignment, NewRole, Permission, PermissionId, Role, RoleId, RoleKind,
    RoleUpdate, Scope,
};

/// Permission catalog persistence
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All permissions, ordered by (domain, name, id)
    async fn list_permissions(&self) -> Result<Vec<Permission>>;

    async fn get_permission(&self, id: &str) -> Result<Option<Permission>>;

    /// Append a permission. Re-adding an identical entry is a no-op; re-adding
    /// an id under a different name fails with `DuplicateName`.
    async fn add_permission(&self, permission: Permission, actor: &str) -> Result<Permission>;

    /// Remove a permission no role references
    async fn remove_permission(&self, id: &str, actor: &str) -> Result<Permission>;
}

/// Role persistence with optimistic versioning
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn get_role(&self, id: &RoleId) -> Result<Option<Role>>;

    /// Case-insensitive lookup by internal name
    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>>;

    /// All roles ordered by internal name
    async fn list_roles(&self) -> Result<Vec<Role>>;

    /// Roles matching any of `keys`, each a role id or a name. Unknown keys are skipped.
    async fn list_by_ids_or_names(&self, keys: &[String]) -> Result<Vec<Role>> {
        let mut roles = Vec::new();
        let mut seen = HashSet::new();

        for key in keys {
            let role = match key.parse::<RoleId>() {
                Ok(id) => self.get_role(&id).await?,
                Err(_) => self.get_role_by_name(key).await?,
            };
            if let Some(role) = role {
                if seen.insert(role.id) {
                    roles.push(role);
                }
            }
        }
        Ok(roles)
    }

    async fn create_role(&self, new: NewRole, kind: RoleKind, actor: &str) -> Result<Role>;

    async fn update_role(
        &self,
        id: &RoleId,
        expected_version: u64,
        update: RoleUpdate,
        actor: &str,
    ) -> Result<Role>;

    /// Replace the full permission set
    async fn set_permissions(
        &self,
        id: &RoleId,
        expected_version: u64,
        permissions: Vec<PermissionId>,
        actor: &str,
    ) -> Result<Role>;

    /// Delete a custom role; returns the deleted role
    async fn delete_role(&self, id: &RoleId, expected_version: u64, actor: &str) -> Result<Role>;
}

/// Assignment persistence
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn assign(
        &self,
        user_id: &str,
        role_id: &RoleId,
        scope: Option<Scope>,
        actor: &str,
    ) -> Result<Assignment>;

    /// Remove a binding; returns the removed assignment
    async fn unassign(
        &self,
        user_id: &str,
        role_id: &RoleId,
        scope: Option<&Scope>,
        actor: &str,
    ) -> Result<Assignment>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Assignment>>;

    async fn list_for_role(&self, role_id: &RoleId) -> Result<Vec<Assignment>>;

    /// Distinct users holding an administrator-capable role
    async fn count_admin_holders(&self) -> Result<usize>;
}

/// Append-only audit persistence
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Seal the draft into the chain and persist it
    async fn append(&self, draft: AuditDraft) -> Result<AuditEntry>;

    /// Filtered entries ordered by `seq`, `seq > page.cursor`
    async fn query(&self, filter: &AuditFilter, page: &PageRequest) -> Result<AuditPage>;
}

/// Everything the engine needs from a backend
pub trait RbacStore: CatalogStore + RoleStore + AssignmentStore + AuditStore {}

impl<T> RbacStore for T where T: CatalogStore + RoleStore + AssignmentStore + AuditStore {}

/// Whether holding `role` makes a user an administrator
pub fn is_admin_capable(role: &Role) -> bool {
    role.is_base() && role.name_key() == normalize_name(ADMIN_ROLE)
}

/// Optimistic concurrency check against the stored version
pub(crate) fn check_version(role: &Role, expected: u64) -> Result<()> {
    if role.version != expected {
        return Err(RbacError::Conflict {
            entity: "role",
            id: role.id.to_string(),
            expected,
            actual: role.version,
        });
    }
    Ok(())
}

/// Apply a partial update to a role, bumping its version.
///
/// Name uniqueness and permission existence are checked by the backend. The
/// administrator base role cannot lose `roles.manage`.
pub(crate) fn apply_update(before: &Role, update: RoleUpdate) -> Result<Role> {
    let mut after = before.clone();

    if let Some(name) = update.name {
        if name != before.name {
            if before.is_base() {
                return Err(RbacError::Immutable {
                    role: before.name.clone(),
                    field: "name",
                });
            }
            after.name = name;
        }
    }
    if let Some(display_name) = update.display_name {
        after.display_name = display_name;
    }
    if let Some(description) = update.description {
        after.description = description;
    }
    if let Some(permissions) = update.permissions {
        after.permissions = permissions.into_iter().collect();
    }
    if is_admin_capable(before) && before.grants(ROLES_MANAGE) && !after.grants(ROLES_MANAGE) {
        return Err(RbacError::InvariantViolation(format!(
            "{} must keep {}",
            before.name, ROLES_MANAGE
        )));
    }

    after.version += 1;
    after.updated_at = chrono::Utc::now();
    Ok(after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewRole;

    #[test]
    fn test_admin_capable_requires_base_kind() {
        let base = Role::from_new(NewRole::new("Administrator"), RoleKind::Base);
        let custom = Role::from_new(NewRole::new("administrator"), RoleKind::Custom);
        assert!(is_admin_capable(&base));
        assert!(!is_admin_capable(&custom));
    }

    #[test]
    fn test_apply_update_rejects_base_rename() {
        let base = Role::from_new(NewRole::new("member"), RoleKind::Base);
        let err = apply_update(
            &base,
            RoleUpdate {
                name: Some("members".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, RbacError::Immutable { .. }));

        let updated = apply_update(
            &base,
            RoleUpdate {
                name: Some("member".to_string()),
                description: Some("Everyone".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.description, "Everyone");
        assert_eq!(updated.version, base.version + 1);
    }

    #[test]
    fn test_administrator_keeps_role_management() {
        let admin = Role::from_new(
            NewRole::new(ADMIN_ROLE).with_permissions([ROLES_MANAGE, "audit.read"]),
            RoleKind::Base,
        );

        let err = apply_update(
            &admin,
            RoleUpdate {
                permissions: Some(vec!["audit.read".to_string()]),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, RbacError::InvariantViolation(_)));

        let trimmed = apply_update(
            &admin,
            RoleUpdate {
                permissions: Some(vec![ROLES_MANAGE.to_string()]),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(trimmed.grants(ROLES_MANAGE));

        // Custom roles may drop it freely
        let custom = Role::from_new(
            NewRole::new("delegate").with_permissions([ROLES_MANAGE]),
            RoleKind::Custom,
        );
        let updated = apply_update(
            &custom,
            RoleUpdate {
                permissions: Some(vec![]),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(updated.permissions.is_empty());
    }
}
