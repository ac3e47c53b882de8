//! Authorization decision point
//!
//! Orchestrates effective permission resolution, the version-tagged cache,
//! sensitive-decision auditing and metrics. Every has-permission answer in the
//! platform (UI hints and server-side enforcement alike) comes from
//! [`RbacEngine::evaluate`].

pub mod cache;
pub mod decision;
pub mod invalidation;
pub mod metrics;
pub mod resolver;

pub use cache::{CacheConfig, CacheStats, PermissionCache};
pub use decision::{Decision, DecisionReason, DecisionState};
pub use invalidation::InvalidatingStore;
pub use metrics::{EngineMetrics, MetricsCollector};
pub use resolver::{EffectivePermissionSet, PermissionResolver};

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditDraft, AuditLog};
use crate::catalog::{
    base_roles, default_permissions, ADMIN_ROLE, PERMISSIONS_MANAGE, ROLES_MANAGE,
};
use crate::error::{RbacError, Result};
use crate::identity::{OpenDirectory, UserDirectory};
use crate::store::RbacStore;
use crate::types::{
    Assignment, Permission, PermissionId, Role, RoleId, RoleKind, Scope, UserId,
};

/// Actor recorded for mutations the engine performs on its own behalf
pub const SYSTEM_ACTOR: &str = "system";

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cache effective permission sets
    pub enable_cache: bool,

    pub cache_config: CacheConfig,

    pub enable_metrics: bool,

    /// Permissions whose decisions are always audited
    pub sensitive_permissions: BTreeSet<PermissionId>,

    /// Seed the default catalog and base roles on startup
    pub seed_defaults: bool,

    /// User granted the administrator role when none exists yet
    pub bootstrap_admin: Option<UserId>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache_config: CacheConfig::default(),
            enable_metrics: true,
            sensitive_permissions: default_sensitive_permissions(),
            seed_defaults: true,
            bootstrap_admin: None,
        }
    }
}

fn default_sensitive_permissions() -> BTreeSet<PermissionId> {
    [
        ROLES_MANAGE,
        PERMISSIONS_MANAGE,
        "users.manage",
        "hospitals.delete",
        "projects.delete",
        "compliance.manage",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl EngineConfig {
    /// Defaults overridden by `RBAC_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let enable_cache = std::env::var("RBAC_CACHE_ENABLED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.enable_cache);

        let capacity = std::env::var("RBAC_CACHE_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cache_config.capacity);

        let sensitive_permissions = std::env::var("RBAC_SENSITIVE_PERMISSIONS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or(defaults.sensitive_permissions);

        let bootstrap_admin = std::env::var("RBAC_BOOTSTRAP_ADMIN")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Self {
            enable_cache,
            cache_config: CacheConfig { capacity },
            sensitive_permissions,
            bootstrap_admin,
            ..defaults
        }
    }
}

/// RBAC engine: read model plus the single decision implementation
///
/// # Architecture
///
/// ```text
/// evaluate → PermissionResolver → [PermissionCache] → RbacStore
///    ↓                                   ↑                 ↑
/// [Audit Log] (sensitive permissions)  InvalidatingStore ──┘
///    ↓                                   ↑
/// [Metrics]                         AdminService mutations
/// ```
pub struct RbacEngine {
    /// Backend wrapped so that committed mutations invalidate the cache
    store: Arc<dyn RbacStore>,
    resolver: Arc<PermissionResolver>,
    audit: AuditLog<dyn RbacStore>,
    directory: Arc<dyn UserDirectory>,
    metrics: Option<Arc<MetricsCollector>>,
    config: EngineConfig,
}

impl RbacEngine {
    /// Create an engine that accepts any user id
    pub async fn new(config: EngineConfig, store: Arc<dyn RbacStore>) -> Result<Self> {
        Self::with_directory(config, store, Arc::new(OpenDirectory)).await
    }

    /// Create an engine backed by `directory` for user existence checks
    pub async fn with_directory(
        config: EngineConfig,
        store: Arc<dyn RbacStore>,
        directory: Arc<dyn UserDirectory>,
    ) -> Result<Self> {
        let metrics = if config.enable_metrics {
            Some(Arc::new(MetricsCollector::new()))
        } else {
            None
        };

        let cache_config = if config.enable_cache {
            Some(config.cache_config.clone())
        } else {
            None
        };

        let resolver = Arc::new(PermissionResolver::new(
            store.clone(),
            cache_config,
            metrics.clone(),
        ));
        let store: Arc<dyn RbacStore> = Arc::new(InvalidatingStore::new(store, resolver.clone()));

        let engine = Self {
            resolver,
            audit: AuditLog::new(store.clone()),
            store,
            directory,
            metrics,
            config,
        };

        if engine.config.seed_defaults {
            engine.seed_defaults().await?;
        }
        if let Some(user_id) = engine.config.bootstrap_admin.clone() {
            engine.bootstrap_admin(&user_id).await?;
        }

        info!(
            "RbacEngine initialized with cache={}, metrics={}, sensitive permissions={}",
            engine.config.enable_cache,
            engine.config.enable_metrics,
            engine.config.sensitive_permissions.len()
        );

        Ok(engine)
    }

    /// Seed the default catalog and base roles. Safe to repeat.
    async fn seed_defaults(&self) -> Result<()> {
        let catalog = default_permissions();
        for permission in &catalog {
            self.store
                .add_permission(permission.clone(), SYSTEM_ACTOR)
                .await?;
        }

        for role in base_roles(&catalog) {
            if self.store.get_role_by_name(&role.name).await?.is_none() {
                let role = self
                    .store
                    .create_role(role, RoleKind::Base, SYSTEM_ACTOR)
                    .await?;
                debug!("Seeded base role {}", role.name);
            }
        }
        Ok(())
    }

    /// Grant the administrator role to `user_id` if nobody holds it yet.
    ///
    /// Returns the new assignment, or `None` when an administrator exists.
    pub async fn bootstrap_admin(&self, user_id: &str) -> Result<Option<Assignment>> {
        if self.store.count_admin_holders().await? > 0 {
            debug!("Administrator already present; bootstrap for {} skipped", user_id);
            return Ok(None);
        }
        if !self.directory.user_exists(user_id).await? {
            return Err(RbacError::not_found("user", user_id));
        }

        let admin = self
            .store
            .get_role_by_name(ADMIN_ROLE)
            .await?
            .ok_or_else(|| RbacError::not_found("role", ADMIN_ROLE))?;

        let assignment = self
            .store
            .assign(user_id, &admin.id, None, SYSTEM_ACTOR)
            .await?;

        info!("Bootstrapped {} as administrator", user_id);
        Ok(Some(assignment))
    }

    /// Evaluate a has-permission query asked by the user about themselves.
    ///
    /// Never returns an error: failures resolve to a `Failed` decision, which
    /// denies.
    pub async fn evaluate(
        &self,
        user_id: &str,
        permission: &str,
        scope: Option<&Scope>,
    ) -> Decision {
        self.evaluate_for(user_id, user_id, permission, scope).await
    }

    /// Evaluate a has-permission query about `user_id` asked by `actor`.
    ///
    /// `actor` is recorded in the audit entry of sensitive decisions.
    pub async fn evaluate_for(
        &self,
        actor: &str,
        user_id: &str,
        permission: &str,
        scope: Option<&Scope>,
    ) -> Decision {
        let start = Instant::now();

        let mut decision = match self.decide(user_id, permission, scope).await {
            Ok(decision) => decision,
            Err(err) => {
                if err.kind().is_retryable() {
                    warn!(
                        "Decision for {} on {} failed closed ({}): {}",
                        user_id,
                        permission,
                        err.kind(),
                        err
                    );
                } else {
                    error!(
                        "Decision for {} on {} failed closed ({}): {}",
                        user_id,
                        permission,
                        err.kind(),
                        err
                    );
                }
                Decision::failed(user_id, permission, scope, err.kind(), err.to_string())
            }
        };

        if self.is_sensitive(permission) {
            match self.audit_decision(actor, &decision).await {
                Ok(()) => decision.audited = true,
                Err(err) if decision.allowed() => {
                    error!(
                        "Audit write failed for sensitive grant of {} to {}: {}",
                        permission, user_id, err
                    );
                    decision =
                        Decision::failed(user_id, permission, scope, err.kind(), err.to_string());
                }
                Err(err) => {
                    warn!("Audit write failed for denial of {} to {}: {}", permission, user_id, err);
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            match decision.state {
                DecisionState::Resolved(allowed) => metrics.record_decision(allowed).await,
                DecisionState::Failed(kind) => metrics.record_failure(kind).await,
            }
            metrics.record_latency(start.elapsed()).await;
        }

        decision
    }

    /// Whether `user_id` holds `permission` in `scope`; `false` on any failure
    pub async fn has_permission(
        &self,
        user_id: &str,
        permission: &str,
        scope: Option<&Scope>,
    ) -> bool {
        self.evaluate(user_id, permission, scope).await.allowed()
    }

    /// Effective permission set of `user_id` in `scope`
    pub async fn effective_permissions(
        &self,
        user_id: &str,
        scope: Option<&Scope>,
    ) -> Result<Arc<EffectivePermissionSet>> {
        self.resolver.resolve(user_id, scope).await
    }

    async fn decide(
        &self,
        user_id: &str,
        permission: &str,
        scope: Option<&Scope>,
    ) -> Result<Decision> {
        let set = self.resolver.resolve(user_id, scope).await?;
        if set.contains(permission) {
            return Ok(Decision::allow(user_id, permission, scope));
        }

        // Granted permissions are always in the catalog, so only misses need the lookup.
        let reason = if self.store.get_permission(permission).await?.is_some() {
            DecisionReason::NotGranted
        } else {
            debug!("Permission {} is not in the catalog", permission);
            DecisionReason::UnknownPermission
        };
        Ok(Decision::deny(user_id, permission, scope, reason))
    }

    async fn audit_decision(&self, actor: &str, decision: &Decision) -> Result<()> {
        let draft = if decision.allowed() {
            AuditDraft::access_granted(
                actor,
                &decision.user_id,
                &decision.permission,
                decision.scope.as_ref(),
            )
        } else {
            AuditDraft::access_denied(
                actor,
                &decision.user_id,
                &decision.permission,
                decision.scope.as_ref(),
                decision.reason_text(),
            )
        };
        self.audit.record(draft).await.map(|_| ())
    }

    pub fn is_sensitive(&self, permission: &str) -> bool {
        self.config.sensitive_permissions.contains(permission)
    }

    // ---- read model ----

    pub async fn list_permissions(&self) -> Result<Vec<Permission>> {
        self.store.list_permissions().await
    }

    pub async fn get_permission(&self, id: &str) -> Result<Permission> {
        self.store
            .get_permission(id)
            .await?
            .ok_or_else(|| RbacError::not_found("permission", id))
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        self.store.list_roles().await
    }

    pub async fn get_role(&self, id: &RoleId) -> Result<Role> {
        self.store
            .get_role(id)
            .await?
            .ok_or_else(|| RbacError::not_found("role", id))
    }

    pub async fn get_role_by_name(&self, name: &str) -> Result<Role> {
        self.store
            .get_role_by_name(name)
            .await?
            .ok_or_else(|| RbacError::not_found("role", name))
    }

    /// Roles by id or name; unknown keys are skipped
    pub async fn roles_by_keys(&self, keys: &[String]) -> Result<Vec<Role>> {
        self.store.list_by_ids_or_names(keys).await
    }

    pub async fn assignments_for_user(&self, user_id: &str) -> Result<Vec<Assignment>> {
        self.store.list_for_user(user_id).await
    }

    pub async fn assignments_for_role(&self, role_id: &RoleId) -> Result<Vec<Assignment>> {
        self.get_role(role_id).await?;
        self.store.list_for_role(role_id).await
    }

    // ---- collaborators ----

    /// Store handle; mutations through it keep the cache coherent
    pub fn store(&self) -> &Arc<dyn RbacStore> {
        &self.store
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    pub fn audit(&self) -> &AuditLog<dyn RbacStore> {
        &self.audit
    }

    pub fn directory(&self) -> &Arc<dyn UserDirectory> {
        &self.directory
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsCollector>> {
        self.metrics.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
