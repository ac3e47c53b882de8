//! # Operations Platform RBAC Engine
//!
//! Role-based access control for the multi-tenant operations platform.
//!
//! ## Features
//!
//! - **Permission catalog** seeded with platform defaults, append-only
//! - **Custom and base roles** with optimistic versioning
//! - **Scoped assignments** (global, hospital, project) without scope leakage
//! - **Effective permissions** as a pure union, cached per (user, scope) and
//!   invalidated by version counters rather than expiry
//! - **Fail-closed decisions**: unknown permissions and store failures deny
//! - **Hash-chained audit log** of mutations and sensitive decisions
//! - **Self-hosted administration** guarded by the engine's own permissions
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use opsplatform_rbac::{AdminService, EngineConfig, InMemoryStore, NewRole, RbacEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig {
//!         bootstrap_admin: Some("root".to_string()),
//!         ..Default::default()
//!     };
//!     let engine = Arc::new(RbacEngine::new(config, Arc::new(InMemoryStore::new())).await?);
//!     let admin = AdminService::new(engine.clone());
//!
//!     let auditor = admin
//!         .create_role("root", NewRole::new("auditor").with_permissions(["reports.read"]))
//!         .await?;
//!     admin.assign("root", "u1", &auditor.id, None).await?;
//!
//!     assert!(engine.has_permission("u1", "reports.read", None).await);
//!     assert!(!engine.has_permission("u1", "reports.write", None).await);
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod audit;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod identity;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use admin::{AdminService, BulkAssignment, BulkAssignmentReport, BulkFailure, NewPermission};
pub use audit::{
    AuditAction, AuditEntry, AuditFilter, AuditLog, AuditPage, AuditTarget, ChainVerification,
    PageRequest,
};
pub use engine::{
    CacheConfig, Decision, DecisionReason, DecisionState, EffectivePermissionSet, EngineConfig,
    MetricsCollector, RbacEngine,
};
pub use error::{ErrorKind, RbacError, Result};
pub use identity::{OpenDirectory, StaticDirectory, UserDirectory};
pub use store::{InMemoryStore, RbacStore};
#[cfg(feature = "postgres")]
pub use store::PostgresStore;
pub use types::{
    Assignment, AssignmentId, NewRole, Permission, PermissionId, Role, RoleId, RoleKind,
    RoleUpdate, Scope, ScopeClass, UserId,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
