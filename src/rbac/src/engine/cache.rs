//! Version-tagged cache of effective permission sets
//!
//! Entries are keyed by (user, scope) and tagged with the generation counters
//! that were current *before* the underlying store read started. Writers bump
//! the counters after committing, so an entry built from pre-commit data can
//! never validate against post-commit counters. There is no time-based expiry.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::resolver::EffectivePermissionSet;
use crate::types::{RoleId, Scope, UserId};

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached (user, scope) entries
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    user_id: UserId,
    scope: Option<Scope>,
}

impl CacheKey {
    fn new(user_id: &str, scope: Option<&Scope>) -> Self {
        Self {
            user_id: user_id.to_string(),
            scope: scope.cloned(),
        }
    }
}

/// Generation counters observed before a resolution started
#[derive(Debug, Clone, Default)]
pub struct ResolutionTags {
    pub user_generation: u64,
    pub role_generations: Vec<(RoleId, u64)>,
}

#[derive(Clone)]
struct CachedEntry {
    set: Arc<EffectivePermissionSet>,
    tags: ResolutionTags,
}

/// Effective permission cache
pub struct PermissionCache {
    entries: DashMap<CacheKey, CachedEntry>,
    user_generations: DashMap<UserId, u64>,
    role_generations: DashMap<RoleId, u64>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    stale: AtomicU64,
}

impl PermissionCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            user_generations: DashMap::new(),
            role_generations: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale: AtomicU64::new(0),
        }
    }

    pub fn user_generation(&self, user_id: &str) -> u64 {
        self.user_generations.get(user_id).map(|g| *g).unwrap_or(0)
    }

    pub fn role_generation(&self, role_id: &RoleId) -> u64 {
        self.role_generations.get(role_id).map(|g| *g).unwrap_or(0)
    }

    fn is_current(&self, tags: &ResolutionTags, user_id: &str) -> bool {
        tags.user_generation == self.user_generation(user_id)
            && tags
                .role_generations
                .iter()
                .all(|(role_id, generation)| *generation == self.role_generation(role_id))
    }

    /// Cached set for (user, scope), if present and still current
    pub fn get(&self, user_id: &str, scope: Option<&Scope>) -> Option<Arc<EffectivePermissionSet>> {
        let key = CacheKey::new(user_id, scope);

        let entry = match self.entries.get(&key) {
            Some(entry) => entry.clone(),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if self.is_current(&entry.tags, user_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(entry.set)
        } else {
            self.entries.remove(&key);
            self.stale.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Store a completed resolution. Ignored when the tags are already outdated.
    pub fn insert(&self, set: Arc<EffectivePermissionSet>, tags: ResolutionTags) {
        if !self.is_current(&tags, &set.user_id) {
            return;
        }

        if self.entries.len() >= self.config.capacity {
            self.evict();
        }

        let key = CacheKey::new(&set.user_id, set.scope.as_ref());
        self.entries.insert(key, CachedEntry { set, tags });
    }

    /// Mark every cached set of `user_id` stale
    pub fn invalidate_user(&self, user_id: &str) {
        *self
            .user_generations
            .entry(user_id.to_string())
            .or_insert(0) += 1;
        self.entries.retain(|key, _| key.user_id != user_id);
    }

    /// Mark every cached set built from `role_id` stale
    pub fn invalidate_role(&self, role_id: &RoleId) {
        *self.role_generations.entry(*role_id).or_insert(0) += 1;
        self.entries
            .retain(|_, entry| !entry.tags.role_generations.iter().any(|(id, _)| id == role_id));
    }

    /// Drop every trace of a deleted role, its generation counter included.
    ///
    /// A role can only be deleted once nothing is assigned to it, and each of
    /// those unassignments already moved the holder's user generation.
    pub fn forget_role(&self, role_id: &RoleId) {
        self.role_generations.remove(role_id);
        self.entries
            .retain(|_, entry| !entry.tags.role_generations.iter().any(|(id, _)| id == role_id));
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            entries: self.entries.len(),
            max_entries: self.config.capacity,
        }
    }

    /// Drop roughly a tenth of the entries
    fn evict(&self) {
        let to_remove = (self.config.capacity / 10).max(1);
        let mut removed = 0;

        self.entries.retain(|_, _| {
            if removed < to_remove {
                removed += 1;
                false
            } else {
                true
            }
        });
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries found but rejected because a tag moved
    pub stale: u64,
    pub entries: usize,
    pub max_entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use uuid::Uuid;

    fn set_for(user_id: &str, scope: Option<Scope>, role_id: RoleId) -> Arc<EffectivePermissionSet> {
        Arc::new(EffectivePermissionSet {
            user_id: user_id.to_string(),
            scope,
            permissions: BTreeSet::from(["reports.read".to_string()]),
            role_versions: BTreeMap::from([(role_id, 1)]),
            assignment_generation: 0,
            resolved_at: chrono::Utc::now(),
        })
    }

    fn tags_for(cache: &PermissionCache, user_id: &str, role_id: RoleId) -> ResolutionTags {
        ResolutionTags {
            user_generation: cache.user_generation(user_id),
            role_generations: vec![(role_id, cache.role_generation(&role_id))],
        }
    }

    #[test]
    fn test_hit_after_insert() {
        let cache = PermissionCache::new(CacheConfig::default());
        let role = Uuid::new_v4();

        assert!(cache.get("u1", None).is_none());
        cache.insert(set_for("u1", None, role), tags_for(&cache, "u1", role));

        assert!(cache.get("u1", None).is_some());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_scopes_are_cached_separately() {
        let cache = PermissionCache::new(CacheConfig::default());
        let role = Uuid::new_v4();

        cache.insert(
            set_for("u1", Some(Scope::hospital("H1")), role),
            tags_for(&cache, "u1", role),
        );
        assert!(cache.get("u1", Some(&Scope::hospital("H1"))).is_some());
        assert!(cache.get("u1", Some(&Scope::hospital("H2"))).is_none());
        assert!(cache.get("u1", None).is_none());
    }

    #[test]
    fn test_user_invalidation() {
        let cache = PermissionCache::new(CacheConfig::default());
        let role = Uuid::new_v4();

        cache.insert(set_for("u1", None, role), tags_for(&cache, "u1", role));
        cache.insert(set_for("u2", None, role), tags_for(&cache, "u2", role));

        cache.invalidate_user("u1");
        assert!(cache.get("u1", None).is_none());
        assert!(cache.get("u2", None).is_some());
    }

    #[test]
    fn test_role_invalidation_hits_every_user() {
        let cache = PermissionCache::new(CacheConfig::default());
        let role = Uuid::new_v4();
        let other = Uuid::new_v4();

        cache.insert(set_for("u1", None, role), tags_for(&cache, "u1", role));
        cache.insert(set_for("u2", None, other), tags_for(&cache, "u2", other));

        cache.invalidate_role(&role);
        assert!(cache.get("u1", None).is_none());
        assert!(cache.get("u2", None).is_some());
    }

    #[test]
    fn test_outdated_tags_are_never_stored() {
        let cache = PermissionCache::new(CacheConfig::default());
        let role = Uuid::new_v4();

        // Tags captured before a concurrent write committed
        let tags = tags_for(&cache, "u1", role);
        cache.invalidate_role(&role);

        cache.insert(set_for("u1", None, role), tags);
        assert!(cache.get("u1", None).is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_deleted_roles_release_their_counter() {
        let cache = PermissionCache::new(CacheConfig::default());
        let role = Uuid::new_v4();

        cache.insert(set_for("u1", None, role), tags_for(&cache, "u1", role));
        cache.invalidate_role(&role);
        assert_eq!(cache.role_generations.len(), 1);

        cache.forget_role(&role);
        assert_eq!(cache.role_generations.len(), 0);
        assert_eq!(cache.role_generation(&role), 0);
        assert!(cache.get("u1", None).is_none());
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = PermissionCache::new(CacheConfig { capacity: 10 });
        let role = Uuid::new_v4();

        for i in 0..25 {
            let user = format!("u{}", i);
            cache.insert(set_for(&user, None, role), tags_for(&cache, &user, role));
        }
        assert!(cache.stats().entries <= 10);
    }
}
