//! In-memory store implementation
//!
//! All tables live behind one `RwLock`, so every mutation (guards, write and
//! audit append) happens in a single critical section.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    apply_update, check_version, is_admin_capable, AssignmentStore, AuditStore, CatalogStore,
    RoleStore,
};
use crate::audit::{AuditDraft, AuditEntry, AuditFilter, AuditPage, PageRequest, GENESIS_HASH};
use crate::catalog::{sort_permissions, validate_permission_id};
use crate::error::{RbacError, Result};
use crate::types::{
    normalize_name, scope_label, Assignment, AssignmentId, NewRole, Permission, PermissionId,
    Role, RoleId, RoleKind, RoleUpdate, Scope,
};

#[derive(Default)]
struct State {
    permissions: HashMap<PermissionId, Permission>,
    roles: HashMap<RoleId, Role>,
    /// normalized name -> role id
    role_names: HashMap<String, RoleId>,
    assignments: HashMap<AssignmentId, Assignment>,
    audit: Vec<AuditEntry>,
}

impl State {
    fn seal(&self, draft: AuditDraft) -> Result<AuditEntry> {
        let seq = self.audit.len() as u64 + 1;
        let prev_hash = self
            .audit
            .last()
            .map(|e| e.hash.as_str())
            .unwrap_or(GENESIS_HASH);
        draft.seal(seq, prev_hash)
    }

    fn role(&self, id: &RoleId) -> Result<&Role> {
        self.roles
            .get(id)
            .ok_or_else(|| RbacError::not_found("role", id))
    }

    fn ensure_permissions_exist<'a, I>(&self, permissions: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a PermissionId>,
    {
        for id in permissions {
            if !self.permissions.contains_key(id) {
                return Err(RbacError::not_found("permission", id));
            }
        }
        Ok(())
    }

    fn ensure_name_free(&self, name: &str, except: Option<&RoleId>) -> Result<()> {
        match self.role_names.get(&normalize_name(name)) {
            Some(existing) if Some(existing) != except => Err(RbacError::DuplicateName {
                entity: "role",
                name: name.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Distinct administrator users left once `excluded` assignments are gone
    fn admin_holders_excluding<F>(&self, excluded: F) -> usize
    where
        F: Fn(&Assignment) -> bool,
    {
        self.assignments
            .values()
            .filter(|a| !excluded(a))
            .filter(|a| self.roles.get(&a.role_id).map(is_admin_capable).unwrap_or(false))
            .map(|a| a.user_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    fn sorted_assignments<F>(&self, predicate: F) -> Vec<Assignment>
    where
        F: Fn(&Assignment) -> bool,
    {
        let mut assignments: Vec<Assignment> = self
            .assignments
            .values()
            .filter(|a| predicate(a))
            .cloned()
            .collect();
        assignments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        assignments
    }
}

/// Thread-safe in-memory store, the default backend
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    available: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate an outage: while unavailable every call fails with `StoreUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RbacError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ))
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn list_permissions(&self) -> Result<Vec<Permission>> {
        self.ensure_available()?;
        let state = self.state.read().await;
        let mut permissions: Vec<Permission> = state.permissions.values().cloned().collect();
        sort_permissions(&mut permissions);
        Ok(permissions)
    }

    async fn get_permission(&self, id: &str) -> Result<Option<Permission>> {
        self.ensure_available()?;
        let state = self.state.read().await;
        Ok(state.permissions.get(id).cloned())
    }

    async fn add_permission(&self, permission: Permission, actor: &str) -> Result<Permission> {
        self.ensure_available()?;
        validate_permission_id(&permission.id)?;

        let mut state = self.state.write().await;
        if let Some(existing) = state.permissions.get(&permission.id) {
            if existing.name == permission.name && existing.domain == permission.domain {
                return Ok(existing.clone());
            }
            return Err(RbacError::DuplicateName {
                entity: "permission",
                name: permission.id,
            });
        }

        let entry = state.seal(AuditDraft::permission_created(actor, &permission))?;
        state.audit.push(entry);
        state
            .permissions
            .insert(permission.id.clone(), permission.clone());

        debug!("Permission added to catalog: {}", permission.id);
        Ok(permission)
    }

    async fn remove_permission(&self, id: &str, actor: &str) -> Result<Permission> {
        self.ensure_available()?;
        let mut state = self.state.write().await;

        let permission = state
            .permissions
            .get(id)
            .cloned()
            .ok_or_else(|| RbacError::not_found("permission", id))?;

        let references = state.roles.values().filter(|r| r.grants(id)).count();
        if references > 0 {
            return Err(RbacError::ReferentialConflict {
                entity: "permission",
                id: id.to_string(),
                referrer: "role",
                references,
            });
        }

        let entry = state.seal(AuditDraft::permission_removed(actor, &permission))?;
        state.audit.push(entry);
        state.permissions.remove(id);
        Ok(permission)
    }
}

#[async_trait]
impl RoleStore for InMemoryStore {
    async fn get_role(&self, id: &RoleId) -> Result<Option<Role>> {
        self.ensure_available()?;
        let state = self.state.read().await;
        Ok(state.roles.get(id).cloned())
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        self.ensure_available()?;
        let state = self.state.read().await;
        Ok(state
            .role_names
            .get(&normalize_name(name))
            .and_then(|id| state.roles.get(id))
            .cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        self.ensure_available()?;
        let state = self.state.read().await;
        let mut roles: Vec<Role> = state.roles.values().cloned().collect();
        roles.sort_by_key(|r| r.name_key());
        Ok(roles)
    }

    async fn create_role(&self, new: NewRole, kind: RoleKind, actor: &str) -> Result<Role> {
        self.ensure_available()?;
        let mut state = self.state.write().await;

        state.ensure_name_free(&new.name, None)?;
        state.ensure_permissions_exist(&new.permissions)?;

        let role = Role::from_new(new, kind);
        let entry = state.seal(AuditDraft::role_created(actor, &role))?;

        state.audit.push(entry);
        state.role_names.insert(role.name_key(), role.id);
        state.roles.insert(role.id, role.clone());

        debug!("Role created: {} ({})", role.name, role.id);
        Ok(role)
    }

    async fn update_role(
        &self,
        id: &RoleId,
        expected_version: u64,
        update: RoleUpdate,
        actor: &str,
    ) -> Result<Role> {
        self.ensure_available()?;
        let mut state = self.state.write().await;

        let before = state.role(id)?.clone();
        check_version(&before, expected_version)?;

        let after = apply_update(&before, update)?;
        if after.name_key() != before.name_key() {
            state.ensure_name_free(&after.name, Some(id))?;
        }
        state.ensure_permissions_exist(&after.permissions)?;

        let entry = state.seal(AuditDraft::role_updated(actor, &before, &after))?;
        state.audit.push(entry);
        if after.name_key() != before.name_key() {
            state.role_names.remove(&before.name_key());
            state.role_names.insert(after.name_key(), after.id);
        }
        state.roles.insert(after.id, after.clone());

        Ok(after)
    }

    async fn set_permissions(
        &self,
        id: &RoleId,
        expected_version: u64,
        permissions: Vec<PermissionId>,
        actor: &str,
    ) -> Result<Role> {
        self.ensure_available()?;
        let mut state = self.state.write().await;

        let before = state.role(id)?.clone();
        check_version(&before, expected_version)?;
        state.ensure_permissions_exist(&permissions)?;

        let after = apply_update(
            &before,
            RoleUpdate {
                permissions: Some(permissions),
                ..Default::default()
            },
        )?;

        let entry = state.seal(AuditDraft::role_updated(actor, &before, &after))?;
        state.audit.push(entry);
        state.roles.insert(after.id, after.clone());

        Ok(after)
    }

    async fn delete_role(&self, id: &RoleId, expected_version: u64, actor: &str) -> Result<Role> {
        self.ensure_available()?;
        let mut state = self.state.write().await;

        let role = state.role(id)?.clone();
        check_version(&role, expected_version)?;

        if role.is_base() {
            return Err(RbacError::Forbidden(format!(
                "base role {} cannot be deleted",
                role.name
            )));
        }

        let references = state
            .assignments
            .values()
            .filter(|a| &a.role_id == id)
            .count();
        if references > 0 {
            return Err(RbacError::ReferentialConflict {
                entity: "role",
                id: role.name.clone(),
                referrer: "assignment",
                references,
            });
        }

        if is_admin_capable(&role) && state.admin_holders_excluding(|a| &a.role_id == id) == 0 {
            return Err(RbacError::InvariantViolation(
                "cannot remove the last administrator".to_string(),
            ));
        }

        let entry = state.seal(AuditDraft::role_deleted(actor, &role))?;
        state.audit.push(entry);
        state.role_names.remove(&role.name_key());
        state.roles.remove(id);

        debug!("Role deleted: {} ({})", role.name, role.id);
        Ok(role)
    }
}

#[async_trait]
impl AssignmentStore for InMemoryStore {
    async fn assign(
        &self,
        user_id: &str,
        role_id: &RoleId,
        scope: Option<Scope>,
        actor: &str,
    ) -> Result<Assignment> {
        self.ensure_available()?;
        let mut state = self.state.write().await;

        let role = state.role(role_id)?;
        if !role.scope_class.accepts(scope.as_ref()) {
            return Err(RbacError::ScopeMismatch {
                role: role.name.clone(),
                scope_class: role.scope_class.to_string(),
                scope: scope_label(scope.as_ref()),
            });
        }

        if state
            .assignments
            .values()
            .any(|a| a.binds(user_id, role_id, scope.as_ref()))
        {
            return Err(RbacError::DuplicateAssignment {
                user_id: user_id.to_string(),
                role: role.name.clone(),
                scope: scope_label(scope.as_ref()),
            });
        }

        let assignment = Assignment::new(user_id, *role_id, scope, actor);
        let entry = state.seal(AuditDraft::assignment_created(actor, &assignment))?;
        state.audit.push(entry);
        state.assignments.insert(assignment.id, assignment.clone());

        Ok(assignment)
    }

    async fn unassign(
        &self,
        user_id: &str,
        role_id: &RoleId,
        scope: Option<&Scope>,
        actor: &str,
    ) -> Result<Assignment> {
        self.ensure_available()?;
        let mut state = self.state.write().await;

        let assignment = state
            .assignments
            .values()
            .find(|a| a.binds(user_id, role_id, scope))
            .cloned()
            .ok_or_else(|| {
                RbacError::not_found(
                    "assignment",
                    format!("{}/{}/{}", user_id, role_id, scope_label(scope)),
                )
            })?;

        let role = state.role(role_id)?;
        if is_admin_capable(role)
            && state.admin_holders_excluding(|a| a.id == assignment.id) == 0
        {
            return Err(RbacError::InvariantViolation(
                "cannot remove the last administrator".to_string(),
            ));
        }

        let entry = state.seal(AuditDraft::assignment_removed(actor, &assignment))?;
        state.audit.push(entry);
        state.assignments.remove(&assignment.id);

        Ok(assignment)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Assignment>> {
        self.ensure_available()?;
        let state = self.state.read().await;
        Ok(state.sorted_assignments(|a| a.user_id == user_id))
    }

    async fn list_for_role(&self, role_id: &RoleId) -> Result<Vec<Assignment>> {
        self.ensure_available()?;
        let state = self.state.read().await;
        Ok(state.sorted_assignments(|a| &a.role_id == role_id))
    }

    async fn count_admin_holders(&self) -> Result<usize> {
        self.ensure_available()?;
        let state = self.state.read().await;
        Ok(state.admin_holders_excluding(|_| false))
    }
}

#[async_trait]
impl AuditStore for InMemoryStore {
    async fn append(&self, draft: AuditDraft) -> Result<AuditEntry> {
        self.ensure_available()?;
        let mut state = self.state.write().await;
        let entry = state.seal(draft)?;
        state.audit.push(entry.clone());
        Ok(entry)
    }

    async fn query(&self, filter: &AuditFilter, page: &PageRequest) -> Result<AuditPage> {
        self.ensure_available()?;
        let limit = page.effective_limit();
        let cursor = page.cursor.unwrap_or(0);

        let state = self.state.read().await;
        let entries: Vec<AuditEntry> = state
            .audit
            .iter()
            .filter(|e| e.seq > cursor && filter.matches(e))
            .take(limit + 1)
            .cloned()
            .collect();

        Ok(AuditPage::from_ordered(entries, limit))
    }
}
