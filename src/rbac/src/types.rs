//! Core RBAC types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::RbacError;

/// External user identifier (issued by the authentication collaborator)
pub type UserId = String;

/// Unique role identifier
pub type RoleId = Uuid;

/// Unique permission identifier (e.g. "reports.read")
pub type PermissionId = String;

/// Unique assignment identifier
pub type AssignmentId = Uuid;

/// Permission catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Stable identifier, `domain.action`
    pub id: PermissionId,

    /// Human-readable name
    pub name: String,

    /// Domain/category tag (users, projects, hospitals, ...)
    pub domain: String,

    /// Free-text description
    #[serde(default)]
    pub description: String,
}

impl Permission {
    /// Create a permission; the domain is the identifier's first segment
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let domain = id.split('.').next().unwrap_or("general").to_string();

        Self {
            id,
            name: name.into(),
            domain,
            description: description.into(),
        }
    }
}

/// Where a role's permissions apply
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scope {
    Hospital(String),
    Project(String),
}

impl Scope {
    pub fn hospital(id: impl Into<String>) -> Self {
        Self::Hospital(id.into())
    }

    pub fn project(id: impl Into<String>) -> Self {
        Self::Project(id.into())
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Hospital(id) | Self::Project(id) => id,
        }
    }

    /// Scope class an assignment carrying this scope belongs to
    pub fn class(&self) -> ScopeClass {
        match self {
            Self::Hospital(_) => ScopeClass::Hospital,
            Self::Project(_) => ScopeClass::Project,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hospital(id) => write!(f, "hospital:{}", id),
            Self::Project(id) => write!(f, "project:{}", id),
        }
    }
}

impl FromStr for Scope {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| RbacError::invalid("scope", format!("expected kind:id, got '{}'", s)))?;

        if id.is_empty() {
            return Err(RbacError::invalid("scope", "scope id cannot be empty"));
        }

        match kind {
            "hospital" => Ok(Self::Hospital(id.to_string())),
            "project" => Ok(Self::Project(id.to_string())),
            other => Err(RbacError::invalid(
                "scope",
                format!("unknown scope kind '{}'", other),
            )),
        }
    }
}

impl TryFrom<String> for Scope {
    type Error = RbacError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.to_string()
    }
}

/// Render an optional scope for logs and messages
pub fn scope_label(scope: Option<&Scope>) -> String {
    scope.map(ToString::to_string).unwrap_or_else(|| "global".to_string())
}

/// Scope an assignment of a role may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeClass {
    Global,
    Hospital,
    Project,
}

impl ScopeClass {
    /// Global roles take no scope; scoped roles require one of their own kind.
    pub fn accepts(&self, scope: Option<&Scope>) -> bool {
        match (self, scope) {
            (Self::Global, None) => true,
            (Self::Global, Some(_)) => false,
            (class, Some(scope)) => scope.class() == *class,
            (_, None) => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Hospital => "hospital",
            Self::Project => "project",
        }
    }
}

impl fmt::Display for ScopeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeClass {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Self::Global),
            "hospital" => Ok(Self::Hospital),
            "project" => Ok(Self::Project),
            other => Err(RbacError::invalid(
                "scope_class",
                format!("unknown scope class '{}'", other),
            )),
        }
    }
}

/// System-defined or administrator-defined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    Base,
    Custom,
}

impl RoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Custom => "custom",
        }
    }
}

impl FromStr for RoleKind {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(Self::Base),
            "custom" => Ok(Self::Custom),
            other => Err(RbacError::invalid(
                "kind",
                format!("unknown role kind '{}'", other),
            )),
        }
    }
}

/// Role definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,

    /// Internal name, unique case-insensitively
    pub name: String,

    pub display_name: String,

    #[serde(default)]
    pub description: String,

    pub kind: RoleKind,

    pub scope_class: ScopeClass,

    /// Granted permissions (unordered, duplicates collapsed)
    pub permissions: BTreeSet<PermissionId>,

    /// Optimistic concurrency counter, bumped on every mutation
    pub version: u64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Materialize a new role from a creation request
    pub fn from_new(new: NewRole, kind: RoleKind) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            name: new.name,
            display_name: new.display_name,
            description: new.description,
            kind,
            scope_class: new.scope_class,
            permissions: new.permissions.into_iter().collect(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_base(&self) -> bool {
        self.kind == RoleKind::Base
    }

    /// Lookup key for case-insensitive name uniqueness
    pub fn name_key(&self) -> String {
        normalize_name(&self.name)
    }

    pub fn grants(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Normalize a role name for uniqueness checks
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Role creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub scope_class: ScopeClass,
    #[serde(default)]
    pub permissions: Vec<PermissionId>,
}

impl NewRole {
    /// Global role with the display name defaulting to the internal name
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            description: String::new(),
            scope_class: ScopeClass::Global,
            permissions: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_scope_class(mut self, scope_class: ScopeClass) -> Self {
        self.scope_class = scope_class;
        self
    }

    pub fn with_permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PermissionId>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }
}

/// Partial role update; `None` leaves the field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<PermissionId>>,
}

impl RoleUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.display_name.is_none()
            && self.description.is_none()
            && self.permissions.is_none()
    }
}

/// Binding of a user to a role, optionally scoped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub user_id: UserId,
    pub role_id: RoleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
}

impl Assignment {
    pub fn new(
        user_id: impl Into<UserId>,
        role_id: RoleId,
        scope: Option<Scope>,
        created_by: impl Into<UserId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            role_id,
            scope,
            created_at: Utc::now(),
            created_by: created_by.into(),
        }
    }

    /// Same (user, role, scope) triple
    pub fn binds(&self, user_id: &str, role_id: &RoleId, scope: Option<&Scope>) -> bool {
        self.user_id == user_id && &self.role_id == role_id && self.scope.as_ref() == scope
    }

    /// Global assignments apply everywhere; scoped ones only to their own scope.
    pub fn applies_to(&self, requested: Option<&Scope>) -> bool {
        match &self.scope {
            None => true,
            Some(scope) => Some(scope) == requested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_domain_from_id() {
        let perm = Permission::new("reports.read", "Read reports", "View compliance reports");
        assert_eq!(perm.domain, "reports");
    }

    #[test]
    fn test_scope_parse_roundtrip() {
        let scope: Scope = "hospital:H1".parse().unwrap();
        assert_eq!(scope, Scope::hospital("H1"));
        assert_eq!(scope.to_string(), "hospital:H1");

        assert!("ward:3".parse::<Scope>().is_err());
        assert!("project:".parse::<Scope>().is_err());
        assert!("H1".parse::<Scope>().is_err());
    }

    #[test]
    fn test_scope_class_accepts() {
        assert!(ScopeClass::Global.accepts(None));
        assert!(!ScopeClass::Global.accepts(Some(&Scope::hospital("H1"))));
        assert!(ScopeClass::Hospital.accepts(Some(&Scope::hospital("H1"))));
        assert!(!ScopeClass::Hospital.accepts(Some(&Scope::project("P1"))));
        assert!(!ScopeClass::Project.accepts(None));
    }

    #[test]
    fn test_assignment_applies_only_to_own_scope() {
        let role_id = Uuid::new_v4();
        let global = Assignment::new("u1", role_id, None, "admin");
        let scoped = Assignment::new("u1", role_id, Some(Scope::hospital("H1")), "admin");

        assert!(global.applies_to(None));
        assert!(global.applies_to(Some(&Scope::hospital("H2"))));
        assert!(scoped.applies_to(Some(&Scope::hospital("H1"))));
        assert!(!scoped.applies_to(Some(&Scope::hospital("H2"))));
        assert!(!scoped.applies_to(None));
    }

    #[test]
    fn test_new_role_collapses_duplicate_permissions() {
        let role = Role::from_new(
            NewRole::new("auditor").with_permissions(["reports.read", "reports.read"]),
            RoleKind::Custom,
        );
        assert_eq!(role.permissions.len(), 1);
        assert_eq!(role.version, 1);
    }
}
