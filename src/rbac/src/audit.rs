//! Append-only audit log for role/assignment mutations and sensitive decisions
//!
//! Entries are sealed into a BLAKE3 hash chain as they are appended: each
//! entry commits to its sequence number, its content and the hash of the
//! entry before it, so any rewrite of history is detectable with
//! [`AuditLog::verify`].
//!
//! Mutations append their entry inside the same store critical section
//! (or database transaction) as the mutation itself.

use blake3::Hasher;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{RbacError, Result};
use crate::store::AuditStore;
use crate::types::{Assignment, Permission, PermissionId, Role, RoleId, Scope, UserId};

/// Hash of the (virtual) entry preceding the first one
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Default page size for audit queries
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Upper bound on a single audit page
pub const MAX_PAGE_SIZE: usize = 500;

/// Kind of audited event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "role.created")]
    RoleCreated,
    #[serde(rename = "role.updated")]
    RoleUpdated,
    #[serde(rename = "role.deleted")]
    RoleDeleted,
    #[serde(rename = "assignment.created")]
    AssignmentCreated,
    #[serde(rename = "assignment.removed")]
    AssignmentRemoved,
    #[serde(rename = "permission.created")]
    PermissionCreated,
    #[serde(rename = "permission.removed")]
    PermissionRemoved,
    #[serde(rename = "access.denied")]
    AccessDenied,
    #[serde(rename = "access.granted-sensitive")]
    AccessGrantedSensitive,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoleCreated => "role.created",
            Self::RoleUpdated => "role.updated",
            Self::RoleDeleted => "role.deleted",
            Self::AssignmentCreated => "assignment.created",
            Self::AssignmentRemoved => "assignment.removed",
            Self::PermissionCreated => "permission.created",
            Self::PermissionRemoved => "permission.removed",
            Self::AccessDenied => "access.denied",
            Self::AccessGrantedSensitive => "access.granted-sensitive",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = RbacError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let action = match s {
            "role.created" => Self::RoleCreated,
            "role.updated" => Self::RoleUpdated,
            "role.deleted" => Self::RoleDeleted,
            "assignment.created" => Self::AssignmentCreated,
            "assignment.removed" => Self::AssignmentRemoved,
            "permission.created" => Self::PermissionCreated,
            "permission.removed" => Self::PermissionRemoved,
            "access.denied" => Self::AccessDenied,
            "access.granted-sensitive" => Self::AccessGrantedSensitive,
            other => {
                return Err(RbacError::invalid(
                    "action",
                    format!("unknown audit action '{}'", other),
                ))
            }
        };
        Ok(action)
    }
}

/// Identifiers an audit entry is about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<RoleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_id: Option<PermissionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
}

/// An audit event that has not yet been placed in the chain
#[derive(Debug, Clone, PartialEq)]
pub struct AuditDraft {
    pub actor: UserId,
    pub action: AuditAction,
    pub target: AuditTarget,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub reason: Option<String>,
}

impl AuditDraft {
    fn new(actor: &str, action: AuditAction, target: AuditTarget) -> Self {
        Self {
            actor: actor.to_string(),
            action,
            target,
            before: None,
            after: None,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn role_created(actor: &str, role: &Role) -> Self {
        let mut draft = Self::new(actor, AuditAction::RoleCreated, role_target(role));
        draft.after = Some(snapshot(role));
        draft
    }

    pub fn role_updated(actor: &str, before: &Role, after: &Role) -> Self {
        let mut draft = Self::new(actor, AuditAction::RoleUpdated, role_target(after));
        draft.before = Some(snapshot(before));
        draft.after = Some(snapshot(after));
        draft
    }

    pub fn role_deleted(actor: &str, role: &Role) -> Self {
        let mut draft = Self::new(actor, AuditAction::RoleDeleted, role_target(role));
        draft.before = Some(snapshot(role));
        draft
    }

    pub fn assignment_created(actor: &str, assignment: &Assignment) -> Self {
        let mut draft = Self::new(
            actor,
            AuditAction::AssignmentCreated,
            assignment_target(assignment),
        );
        draft.after = Some(snapshot(assignment));
        draft
    }

    pub fn assignment_removed(actor: &str, assignment: &Assignment) -> Self {
        let mut draft = Self::new(
            actor,
            AuditAction::AssignmentRemoved,
            assignment_target(assignment),
        );
        draft.before = Some(snapshot(assignment));
        draft
    }

    pub fn permission_created(actor: &str, permission: &Permission) -> Self {
        let mut draft = Self::new(
            actor,
            AuditAction::PermissionCreated,
            permission_target(&permission.id),
        );
        draft.after = Some(snapshot(permission));
        draft
    }

    pub fn permission_removed(actor: &str, permission: &Permission) -> Self {
        let mut draft = Self::new(
            actor,
            AuditAction::PermissionRemoved,
            permission_target(&permission.id),
        );
        draft.before = Some(snapshot(permission));
        draft
    }

    /// Denied access to `permission` for `user_id`
    pub fn access_denied(
        actor: &str,
        user_id: &str,
        permission: &str,
        scope: Option<&Scope>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(
            actor,
            AuditAction::AccessDenied,
            decision_target(user_id, permission, scope),
        )
        .with_reason(reason)
    }

    /// Granted access to a sensitive `permission` for `user_id`
    pub fn access_granted(
        actor: &str,
        user_id: &str,
        permission: &str,
        scope: Option<&Scope>,
    ) -> Self {
        Self::new(
            actor,
            AuditAction::AccessGrantedSensitive,
            decision_target(user_id, permission, scope),
        )
    }

    /// Management call rejected by a safety invariant
    pub fn rejected(actor: &str, target: AuditTarget, reason: impl Into<String>) -> Self {
        Self::new(actor, AuditAction::AccessDenied, target).with_reason(reason)
    }

    /// Place the draft in the chain after `prev_hash`
    pub fn seal(self, seq: u64, prev_hash: &str) -> Result<AuditEntry> {
        let mut entry = AuditEntry {
            seq,
            id: Uuid::new_v4(),
            actor: self.actor,
            action: self.action,
            target: self.target,
            before: self.before,
            after: self.after,
            reason: self.reason,
            // Storage keeps microsecond precision; the hash must survive a round trip.
            timestamp: Utc::now().trunc_subsecs(6),
            prev_hash: prev_hash.to_string(),
            hash: String::new(),
        };
        entry.hash = entry.compute_hash()?;
        Ok(entry)
    }
}

fn snapshot<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn role_target(role: &Role) -> AuditTarget {
    AuditTarget {
        role_id: Some(role.id),
        ..Default::default()
    }
}

fn assignment_target(assignment: &Assignment) -> AuditTarget {
    AuditTarget {
        role_id: Some(assignment.role_id),
        user_id: Some(assignment.user_id.clone()),
        assignment_id: Some(assignment.id),
        scope: assignment.scope.clone(),
        ..Default::default()
    }
}

fn permission_target(id: &str) -> AuditTarget {
    AuditTarget {
        permission_id: Some(id.to_string()),
        ..Default::default()
    }
}

fn decision_target(user_id: &str, permission: &str, scope: Option<&Scope>) -> AuditTarget {
    AuditTarget {
        user_id: Some(user_id.to_string()),
        permission_id: Some(permission.to_string()),
        scope: scope.cloned(),
        ..Default::default()
    }
}

/// Immutable audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the log, starting at 1
    pub seq: u64,

    pub id: Uuid,

    /// Who performed the mutation or triggered the decision
    pub actor: UserId,

    pub action: AuditAction,

    pub target: AuditTarget,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub timestamp: DateTime<Utc>,

    /// Hash of the preceding entry
    pub prev_hash: String,

    /// BLAKE3 over this entry's content and `prev_hash`
    pub hash: String,
}

#[derive(Serialize)]
struct HashInput<'a> {
    seq: u64,
    id: &'a Uuid,
    actor: &'a str,
    action: &'a str,
    target: &'a AuditTarget,
    before: &'a Option<Value>,
    after: &'a Option<Value>,
    reason: &'a Option<String>,
    timestamp_micros: i64,
}

impl AuditEntry {
    /// Recompute the chain hash from the entry content
    pub fn compute_hash(&self) -> Result<String> {
        let input = HashInput {
            seq: self.seq,
            id: &self.id,
            actor: &self.actor,
            action: self.action.as_str(),
            target: &self.target,
            before: &self.before,
            after: &self.after,
            reason: &self.reason,
            timestamp_micros: self.timestamp.timestamp_micros(),
        };
        let bytes = serde_json::to_vec(&input)
            .map_err(|e| RbacError::Internal(format!("failed to serialize audit entry: {}", e)))?;

        let mut hasher = Hasher::new();
        hasher.update(self.prev_hash.as_bytes());
        hasher.update(&bytes);
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Whether the entry concerns `user_id`, as actor or as target
    pub fn involves_user(&self, user_id: &str) -> bool {
        self.actor == user_id || self.target.user_id.as_deref() == Some(user_id)
    }
}

/// Audit query filters; all present filters must match
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub action: Option<AuditAction>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(user_id) = &self.user_id {
            if !entry.involves_user(user_id) {
                return false;
            }
        }
        if let Some(action) = self.action {
            if entry.action != action {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.timestamp > to {
                return false;
            }
        }
        true
    }
}

/// Cursor pagination: entries with `seq > cursor`, at most `limit`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub cursor: Option<u64>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            cursor: None,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self {
            cursor: None,
            limit,
        }
    }

    pub fn after(cursor: u64, limit: usize) -> Self {
        Self {
            cursor: Some(cursor),
            limit,
        }
    }

    /// Limit clamped to `1..=MAX_PAGE_SIZE`
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }
}

/// One page of audit entries, ordered by `seq`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    /// Pass as `cursor` to fetch the next page; `None` when exhausted
    pub next_cursor: Option<u64>,
}

impl AuditPage {
    /// Build a page from filtered entries already ordered by `seq`
    pub fn from_ordered(mut entries: Vec<AuditEntry>, limit: usize) -> Self {
        let has_more = entries.len() > limit;
        entries.truncate(limit);
        let next_cursor = if has_more {
            entries.last().map(|e| e.seq)
        } else {
            None
        };
        Self {
            entries,
            next_cursor,
        }
    }
}

/// Result of walking the hash chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub verified_entries: u64,
    /// First entry whose hash or back-link does not match
    pub first_broken_seq: Option<u64>,
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        self.first_broken_seq.is_none()
    }
}

/// Audit log facade over an [`AuditStore`]
pub struct AuditLog<S: ?Sized> {
    store: Arc<S>,
}

impl<S: AuditStore + ?Sized> AuditLog<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Append an entry. Failure propagates to the operation that triggered it.
    pub async fn record(&self, draft: AuditDraft) -> Result<AuditEntry> {
        let entry = self.store.append(draft).await?;
        debug!("Audit entry {} recorded: {}", entry.seq, entry.action);
        Ok(entry)
    }

    /// Query entries with filters and cursor pagination
    pub async fn query(&self, filter: &AuditFilter, page: PageRequest) -> Result<AuditPage> {
        self.store.query(filter, &page).await
    }

    /// Audit entries are immutable; deletion always fails.
    pub async fn delete(&self, seq: u64) -> Result<()> {
        warn!("Rejected attempt to delete audit entry {}", seq);
        Err(RbacError::Forbidden(format!(
            "audit entry {} cannot be deleted",
            seq
        )))
    }

    /// Walk the whole chain and report the first inconsistency
    pub async fn verify(&self) -> Result<ChainVerification> {
        let filter = AuditFilter::default();
        let mut page = PageRequest::first(MAX_PAGE_SIZE);
        let mut walker = ChainWalker::default();

        loop {
            let batch = self.store.query(&filter, &page).await?;
            for entry in &batch.entries {
                if !walker.extend(entry)? {
                    warn!("Audit chain broken at entry {}", entry.seq);
                    return Ok(walker.broken_at(entry.seq));
                }
            }

            match batch.next_cursor {
                Some(cursor) => page = PageRequest::after(cursor, MAX_PAGE_SIZE),
                None => break,
            }
        }

        Ok(walker.intact())
    }
}

/// Walks entries in `seq` order from the genesis hash
struct ChainWalker {
    prev_hash: String,
    verified: u64,
}

impl Default for ChainWalker {
    fn default() -> Self {
        Self {
            prev_hash: GENESIS_HASH.to_string(),
            verified: 0,
        }
    }
}

impl ChainWalker {
    /// `false` when `entry` does not link to the previous one or was altered
    fn extend(&mut self, entry: &AuditEntry) -> Result<bool> {
        if entry.prev_hash != self.prev_hash || entry.compute_hash()? != entry.hash {
            return Ok(false);
        }
        self.prev_hash = entry.hash.clone();
        self.verified += 1;
        Ok(true)
    }

    fn broken_at(self, seq: u64) -> ChainVerification {
        ChainVerification {
            verified_entries: self.verified,
            first_broken_seq: Some(seq),
        }
    }

    fn intact(self) -> ChainVerification {
        ChainVerification {
            verified_entries: self.verified,
            first_broken_seq: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewRole, RoleKind};

    fn chain(drafts: Vec<AuditDraft>) -> Vec<AuditEntry> {
        let mut prev = GENESIS_HASH.to_string();
        drafts
            .into_iter()
            .enumerate()
            .map(|(i, draft)| {
                let entry = draft.seal(i as u64 + 1, &prev).unwrap();
                prev = entry.hash.clone();
                entry
            })
            .collect()
    }

    #[test]
    fn test_action_names() {
        assert_eq!(AuditAction::AccessGrantedSensitive.as_str(), "access.granted-sensitive");
        assert_eq!(
            "role.deleted".parse::<AuditAction>().unwrap(),
            AuditAction::RoleDeleted
        );
        assert_eq!(
            serde_json::to_value(AuditAction::AssignmentRemoved).unwrap(),
            serde_json::json!("assignment.removed")
        );
        assert!("role.renamed".parse::<AuditAction>().is_err());
    }

    #[test]
    fn test_chain_detects_tampering() {
        let role = Role::from_new(NewRole::new("auditor"), RoleKind::Custom);
        let mut entries = chain(vec![
            AuditDraft::role_created("admin", &role),
            AuditDraft::access_denied("u1", "u1", "roles.manage", None, "missing permission"),
            AuditDraft::role_deleted("admin", &role),
        ]);

        let mut walker = ChainWalker::default();
        for entry in &entries {
            assert!(walker.extend(entry).unwrap());
        }
        assert!(walker.intact().is_intact());

        entries[1].reason = Some("nothing to see".to_string());
        let mut walker = ChainWalker::default();
        assert!(walker.extend(&entries[0]).unwrap());
        assert!(!walker.extend(&entries[1]).unwrap());
        let result = walker.broken_at(entries[1].seq);
        assert_eq!(result.first_broken_seq, Some(2));
        assert_eq!(result.verified_entries, 1);
    }

    #[test]
    fn test_filter_matches_actor_or_target_user() {
        let entries = chain(vec![
            AuditDraft::access_denied("u1", "u1", "reports.write", None, "denied"),
            AuditDraft::access_granted("u2", "u2", "roles.manage", None),
        ]);

        let filter = AuditFilter {
            user_id: Some("u1".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&entries[0]));
        assert!(!filter.matches(&entries[1]));

        let filter = AuditFilter {
            action: Some(AuditAction::AccessGrantedSensitive),
            ..Default::default()
        };
        assert!(filter.matches(&entries[1]));
    }

    #[test]
    fn test_page_from_ordered() {
        let entries = chain(
            (0..5)
                .map(|i| AuditDraft::access_denied("u", "u", "reports.write", None, format!("{}", i)))
                .collect(),
        );

        let page = AuditPage::from_ordered(entries.clone(), 3);
        assert_eq!(page.entries.len(), 3);
        assert_eq!(page.next_cursor, Some(3));

        let page = AuditPage::from_ordered(entries, 10);
        assert_eq!(page.entries.len(), 5);
        assert_eq!(page.next_cursor, None);
    }
}
