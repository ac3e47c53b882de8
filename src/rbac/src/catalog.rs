//! Permission catalog: the seeded universe of permission identifiers
//!
//! The catalog itself is persisted by the store (see [`crate::store::CatalogStore`]);
//! this module holds the platform defaults, identifier validation and the
//! stable ordering used by every listing.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{RbacError, Result};
use crate::types::{NewRole, Permission, ScopeClass};

/// Internal name of the administrator base role
pub const ADMIN_ROLE: &str = "administrator";

/// Internal name of the baseline member role
pub const MEMBER_ROLE: &str = "member";

/// Required to create, update or delete roles and assignments
pub const ROLES_MANAGE: &str = "roles.manage";

/// Required to append to or prune the permission catalog
pub const PERMISSIONS_MANAGE: &str = "permissions.manage";

/// Required to query the audit log
pub const AUDIT_READ: &str = "audit.read";

/// Required to list roles and their assignments
pub const ROLES_READ: &str = "roles.read";

/// Required to inspect another user's permissions and assignments
pub const USERS_READ: &str = "users.read";

static PERMISSION_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9_]*(\.[a-z][a-z0-9_-]*)+$").expect("permission id pattern is valid")
});

/// Validate a permission identifier (`domain.action[.qualifier]`)
pub fn validate_permission_id(id: &str) -> Result<()> {
    if PERMISSION_ID.is_match(id) {
        Ok(())
    } else {
        Err(RbacError::invalid(
            "permission_id",
            format!("'{}' is not of the form domain.action", id),
        ))
    }
}

/// Sort permissions by (domain, name, id) for deterministic listings
pub fn sort_permissions(permissions: &mut [Permission]) {
    permissions.sort_by(|a, b| {
        a.domain
            .cmp(&b.domain)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Platform default catalog
pub fn default_permissions() -> Vec<Permission> {
    let entries: &[(&str, &str, &str)] = &[
        ("users.read", "View users", "List and view user accounts"),
        ("users.manage", "Manage users", "Create, update and deactivate user accounts"),
        ("roles.read", "View roles", "List roles and their permissions"),
        (ROLES_MANAGE, "Manage roles", "Create, edit and delete roles and role assignments"),
        (PERMISSIONS_MANAGE, "Manage permission catalog", "Add or retire permission identifiers"),
        (AUDIT_READ, "View audit log", "Query the authorization audit log"),
        ("hospitals.read", "View hospitals", "View hospital records"),
        ("hospitals.write", "Edit hospitals", "Create and edit hospital records"),
        ("hospitals.delete", "Delete hospitals", "Delete hospital records"),
        ("projects.read", "View projects", "View hospital projects"),
        ("projects.write", "Edit projects", "Create and edit hospital projects"),
        ("projects.delete", "Delete projects", "Delete hospital projects"),
        ("profile.read", "View profile", "View consultant profiles"),
        ("profile.write", "Edit profile", "Edit consultant profiles"),
        ("reports.read", "View reports", "View operational and compliance reports"),
        ("reports.write", "Edit reports", "Create and edit reports"),
        ("compliance.read", "View compliance", "View compliance documents and status"),
        ("compliance.manage", "Manage compliance", "Approve and revoke compliance documents"),
        ("crm.read", "View CRM", "View contacts, accounts and opportunities"),
        ("crm.write", "Edit CRM", "Edit contacts, accounts and opportunities"),
        ("timesheets.read", "View timesheets", "View consultant timesheets"),
        ("timesheets.approve", "Approve timesheets", "Approve submitted timesheets"),
    ];

    let mut permissions: Vec<Permission> = entries
        .iter()
        .map(|(id, name, description)| Permission::new(*id, *name, *description))
        .collect();
    sort_permissions(&mut permissions);
    permissions
}

/// Base roles seeded at initialization
///
/// The administrator role receives every permission of the seeded catalog.
pub fn base_roles(catalog: &[Permission]) -> Vec<NewRole> {
    vec![
        NewRole::new(ADMIN_ROLE)
            .with_display_name("Administrator")
            .with_description("Full access to the platform, including access control")
            .with_scope_class(ScopeClass::Global)
            .with_permissions(catalog.iter().map(|p| p.id.clone())),
        NewRole::new(MEMBER_ROLE)
            .with_display_name("Member")
            .with_description("Baseline access for every signed-in user")
            .with_scope_class(ScopeClass::Global)
            .with_permissions(["profile.read", "projects.read", "hospitals.read"]),
    ]
}
