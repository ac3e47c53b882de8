//! Effective permission resolution
//!
//! A user's effective permissions for a scope are the union of the permissions
//! of every assignment that applies there: global assignments always, scoped
//! assignments only for their exact scope. There is no role hierarchy and no
//! negative permission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

use super::cache::{CacheConfig, CacheStats, PermissionCache, ResolutionTags};
use super::metrics::MetricsCollector;
use crate::error::Result;
use crate::store::RbacStore;
use crate::types::{PermissionId, RoleId, Scope, UserId};

/// Immutable snapshot of what a user may do in one scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermissionSet {
    pub user_id: UserId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,

    pub permissions: BTreeSet<PermissionId>,

    /// Version of every role that contributed
    pub role_versions: BTreeMap<RoleId, u64>,

    /// Assignment generation of the user when the snapshot was taken
    pub assignment_generation: u64,

    pub resolved_at: DateTime<Utc>,
}

impl EffectivePermissionSet {
    pub fn contains(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}

/// Reads assignments and roles through the store, with an optional cache
pub struct PermissionResolver {
    store: Arc<dyn RbacStore>,
    cache: Option<PermissionCache>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl PermissionResolver {
    pub fn new(
        store: Arc<dyn RbacStore>,
        cache_config: Option<CacheConfig>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            store,
            cache: cache_config.map(PermissionCache::new),
            metrics,
        }
    }

    /// Resolve the effective permissions of `user_id` in `scope`.
    ///
    /// The cache is only written once the store reads have completed, so a
    /// cancelled resolution leaves no trace.
    pub async fn resolve(
        &self,
        user_id: &str,
        scope: Option<&Scope>,
    ) -> Result<Arc<EffectivePermissionSet>> {
        if let Some(cache) = &self.cache {
            if let Some(set) = cache.get(user_id, scope) {
                if let Some(metrics) = &self.metrics {
                    metrics.record_cache_hit().await;
                }
                return Ok(set);
            }
            if let Some(metrics) = &self.metrics {
                metrics.record_cache_miss().await;
            }
        }

        let mut tags = ResolutionTags {
            user_generation: self
                .cache
                .as_ref()
                .map(|c| c.user_generation(user_id))
                .unwrap_or(0),
            role_generations: Vec::new(),
        };

        let assignments = self.store.list_for_user(user_id).await?;

        let mut permissions = BTreeSet::new();
        let mut role_versions = BTreeMap::new();

        for assignment in assignments.iter().filter(|a| a.applies_to(scope)) {
            if let Some(cache) = &self.cache {
                tags.role_generations
                    .push((assignment.role_id, cache.role_generation(&assignment.role_id)));
            }

            match self.store.get_role(&assignment.role_id).await? {
                Some(role) => {
                    role_versions.insert(role.id, role.version);
                    permissions.extend(role.permissions.iter().cloned());
                }
                None => {
                    warn!(
                        "Assignment {} references missing role {}",
                        assignment.id, assignment.role_id
                    );
                }
            }
        }

        let set = Arc::new(EffectivePermissionSet {
            user_id: user_id.to_string(),
            scope: scope.cloned(),
            permissions,
            role_versions,
            assignment_generation: tags.user_generation,
            resolved_at: Utc::now(),
        });

        debug!(
            "Resolved {} permissions for {} in {}",
            set.permissions.len(),
            user_id,
            crate::types::scope_label(scope)
        );

        if let Some(cache) = &self.cache {
            cache.insert(set.clone(), tags);
        }

        Ok(set)
    }

    /// Called after an assignment of `user_id` changed
    pub fn invalidate_user(&self, user_id: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate_user(user_id);
        }
    }

    /// Called after the permissions of `role_id` changed or the role was deleted
    pub fn invalidate_role(&self, role_id: &RoleId) {
        if let Some(cache) = &self.cache {
            cache.invalidate_role(role_id);
        }
    }

    /// Called after `role_id` was deleted
    pub fn forget_role(&self, role_id: &RoleId) {
        if let Some(cache) = &self.cache {
            cache.forget_role(role_id);
        }
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AssignmentStore, CatalogStore, InMemoryStore, RoleStore};
    use crate::types::{NewRole, Permission, RoleKind, ScopeClass};

    async fn seeded() -> (Arc<InMemoryStore>, PermissionResolver) {
        let store = Arc::new(InMemoryStore::new());
        for id in ["profile.read", "profile.write", "projects.read"] {
            store
                .add_permission(Permission::new(id, id, ""), "system")
                .await
                .unwrap();
        }
        let resolver = PermissionResolver::new(store.clone(), Some(CacheConfig::default()), None);
        (store, resolver)
    }

    #[tokio::test]
    async fn test_scoped_assignments_do_not_leak() {
        let (store, resolver) = seeded().await;

        let consultant = store
            .create_role(
                NewRole::new("consultant")
                    .with_scope_class(ScopeClass::Hospital)
                    .with_permissions(["profile.read", "profile.write"]),
                RoleKind::Custom,
                "admin",
            )
            .await
            .unwrap();
        let viewer = store
            .create_role(
                NewRole::new("viewer").with_permissions(["projects.read"]),
                RoleKind::Custom,
                "admin",
            )
            .await
            .unwrap();

        store
            .assign("u2", &consultant.id, Some(Scope::hospital("H1")), "admin")
            .await
            .unwrap();
        store.assign("u2", &viewer.id, None, "admin").await.unwrap();

        let h1 = resolver.resolve("u2", Some(&Scope::hospital("H1"))).await.unwrap();
        assert_eq!(
            h1.permissions.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["profile.read", "profile.write", "projects.read"]
        );
        assert_eq!(h1.role_versions.len(), 2);

        let h2 = resolver.resolve("u2", Some(&Scope::hospital("H2"))).await.unwrap();
        assert_eq!(
            h2.permissions.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["projects.read"]
        );
    }

    #[tokio::test]
    async fn test_invalidation_reflects_new_state() {
        let (store, resolver) = seeded().await;

        let role = store
            .create_role(
                NewRole::new("auditor").with_permissions(["profile.read"]),
                RoleKind::Custom,
                "admin",
            )
            .await
            .unwrap();
        store.assign("u1", &role.id, None, "admin").await.unwrap();

        assert!(resolver.resolve("u1", None).await.unwrap().contains("profile.read"));

        let updated = store
            .set_permissions(&role.id, role.version, vec!["projects.read".to_string()], "admin")
            .await
            .unwrap();
        resolver.invalidate_role(&updated.id);

        let set = resolver.resolve("u1", None).await.unwrap();
        assert!(!set.contains("profile.read"));
        assert!(set.contains("projects.read"));
        assert_eq!(set.role_versions.get(&role.id), Some(&2));

        store.unassign("u1", &role.id, None, "admin").await.unwrap();
        resolver.invalidate_user("u1");
        assert!(resolver.resolve("u1", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_read_is_served_from_cache() {
        let (store, resolver) = seeded().await;
        let role = store
            .create_role(
                NewRole::new("viewer").with_permissions(["projects.read"]),
                RoleKind::Custom,
                "admin",
            )
            .await
            .unwrap();
        store.assign("u1", &role.id, None, "admin").await.unwrap();

        resolver.resolve("u1", None).await.unwrap();
        store.set_available(false);

        // Cached and still current
        assert!(resolver.resolve("u1", None).await.unwrap().contains("projects.read"));

        // An invalidated entry must go back to the store
        resolver.invalidate_user("u1");
        assert!(resolver.resolve("u1", None).await.is_err());
    }
}
