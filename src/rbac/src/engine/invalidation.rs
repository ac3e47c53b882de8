//! Cache-coherent store handle
//!
//! [`InvalidatingStore`] is the only mutable store handle the engine hands
//! out. It forwards every call to the backend and, once a mutation has
//! committed, bumps the cache generations it affects. Mutations that fail
//! leave the cache untouched.

use async_trait::async_trait;
use std::sync::Arc;

use super::resolver::PermissionResolver;
use crate::audit::{AuditDraft, AuditEntry, AuditFilter, AuditPage, PageRequest};
use crate::error::Result;
use crate::store::{AssignmentStore, AuditStore, CatalogStore, RbacStore, RoleStore};
use crate::types::{
    Assignment, NewRole, Permission, PermissionId, Role, RoleId, RoleKind, RoleUpdate, Scope,
};

pub struct InvalidatingStore {
    inner: Arc<dyn RbacStore>,
    resolver: Arc<PermissionResolver>,
}

impl InvalidatingStore {
    pub fn new(inner: Arc<dyn RbacStore>, resolver: Arc<PermissionResolver>) -> Self {
        Self { inner, resolver }
    }

    fn role_changed(&self, result: Result<Role>) -> Result<Role> {
        if let Ok(role) = &result {
            self.resolver.invalidate_role(&role.id);
        }
        result
    }

    fn assignment_changed(&self, result: Result<Assignment>) -> Result<Assignment> {
        if let Ok(assignment) = &result {
            self.resolver.invalidate_user(&assignment.user_id);
        }
        result
    }
}

// A catalog permission can only be removed once no role grants it, so catalog
// writes never change an effective set.
#[async_trait]
impl CatalogStore for InvalidatingStore {
    async fn list_permissions(&self) -> Result<Vec<Permission>> {
        self.inner.list_permissions().await
    }

    async fn get_permission(&self, id: &str) -> Result<Option<Permission>> {
        self.inner.get_permission(id).await
    }

    async fn add_permission(&self, permission: Permission, actor: &str) -> Result<Permission> {
        self.inner.add_permission(permission, actor).await
    }

    async fn remove_permission(&self, id: &str, actor: &str) -> Result<Permission> {
        self.inner.remove_permission(id, actor).await
    }
}

#[async_trait]
impl RoleStore for InvalidatingStore {
    async fn get_role(&self, id: &RoleId) -> Result<Option<Role>> {
        self.inner.get_role(id).await
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        self.inner.get_role_by_name(name).await
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        self.inner.list_roles().await
    }

    async fn list_by_ids_or_names(&self, keys: &[String]) -> Result<Vec<Role>> {
        self.inner.list_by_ids_or_names(keys).await
    }

    async fn create_role(&self, new: NewRole, kind: RoleKind, actor: &str) -> Result<Role> {
        self.inner.create_role(new, kind, actor).await
    }

    async fn update_role(
        &self,
        id: &RoleId,
        expected_version: u64,
        update: RoleUpdate,
        actor: &str,
    ) -> Result<Role> {
        let result = self
            .inner
            .update_role(id, expected_version, update, actor)
            .await;
        self.role_changed(result)
    }

    async fn set_permissions(
        &self,
        id: &RoleId,
        expected_version: u64,
        permissions: Vec<PermissionId>,
        actor: &str,
    ) -> Result<Role> {
        let result = self
            .inner
            .set_permissions(id, expected_version, permissions, actor)
            .await;
        self.role_changed(result)
    }

    async fn delete_role(&self, id: &RoleId, expected_version: u64, actor: &str) -> Result<Role> {
        let role = self.inner.delete_role(id, expected_version, actor).await?;
        self.resolver.forget_role(&role.id);
        Ok(role)
    }
}

#[async_trait]
impl AssignmentStore for InvalidatingStore {
    async fn assign(
        &self,
        user_id: &str,
        role_id: &RoleId,
        scope: Option<Scope>,
        actor: &str,
    ) -> Result<Assignment> {
        let result = self.inner.assign(user_id, role_id, scope, actor).await;
        self.assignment_changed(result)
    }

    async fn unassign(
        &self,
        user_id: &str,
        role_id: &RoleId,
        scope: Option<&Scope>,
        actor: &str,
    ) -> Result<Assignment> {
        let result = self.inner.unassign(user_id, role_id, scope, actor).await;
        self.assignment_changed(result)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Assignment>> {
        self.inner.list_for_user(user_id).await
    }

    async fn list_for_role(&self, role_id: &RoleId) -> Result<Vec<Assignment>> {
        self.inner.list_for_role(role_id).await
    }

    async fn count_admin_holders(&self) -> Result<usize> {
        self.inner.count_admin_holders().await
    }
}

#[async_trait]
impl AuditStore for InvalidatingStore {
    async fn append(&self, draft: AuditDraft) -> Result<AuditEntry> {
        self.inner.append(draft).await
    }

    async fn query(&self, filter: &AuditFilter, page: &PageRequest) -> Result<AuditPage> {
        self.inner.query(filter, page).await
    }
}
