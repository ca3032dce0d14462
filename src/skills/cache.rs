//! Content-addressed TTL cache for resolved skills.
//!
//! Keys are the stable source strings from [`crate::skills::source`].  The
//! cache allows concurrent readers; writers serialize on the inner lock.  A
//! per-entry TTL of zero means the entry never expires — safe for digests
//! and other immutable references.  Concurrent misses for the same key are
//! single-flighted: one loader runs, the rest await and share its result.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use crate::skills::error::SkillResult;
use crate::skills::types::Skill;

/// Default entry lifetime when the caller does not specify one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct CacheEntry {
    skill: Arc<Skill>,
    inserted_at: Instant,
    /// Zero = never expires.
    ttl: Duration,
}

impl CacheEntry {
    fn expired(&self, now: Instant) -> bool {
        !self.ttl.is_zero() && now.duration_since(self.inserted_at) >= self.ttl
    }
}

/// TTL skill cache with single-flight miss resolution.
pub struct SkillCache {
    default_ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Per-key load guards; the map itself is guarded by an async mutex so
    /// lookups can await without blocking the runtime.
    inflight: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SkillCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            entries: RwLock::new(HashMap::new()),
            inflight: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Look up a cached skill.  Expired entries are treated as misses and
    /// removed eagerly so a stale skill is never returned.
    pub fn get(&self, key: &str) -> Option<Arc<Skill>> {
        let now = Instant::now();
        {
            let Ok(entries) = self.entries.read() else {
                return None;
            };
            match entries.get(key) {
                Some(entry) if !entry.expired(now) => return Some(entry.skill.clone()),
                Some(_) => {} // fall through to removal
                None => return None,
            }
        }
        if let Ok(mut entries) = self.entries.write() {
            // Re-check under the write lock; another writer may have refreshed.
            if entries.get(key).is_some_and(|e| e.expired(now)) {
                entries.remove(key);
            }
        }
        None
    }

    /// Insert with the cache default TTL.
    pub fn put(&self, key: impl Into<String>, skill: Skill) {
        self.put_with_ttl(key, skill, self.default_ttl);
    }

    /// Insert with an explicit TTL.  Zero = never expires.
    pub fn put_with_ttl(&self, key: impl Into<String>, skill: Skill, ttl: Duration) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                key.into(),
                CacheEntry {
                    skill: Arc::new(skill),
                    inserted_at: Instant::now(),
                    ttl,
                },
            );
        }
    }

    /// Remove one entry; returns whether it existed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries
            .write()
            .map(|mut e| e.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Drop every entry.
    pub fn invalidate_all(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    /// Sweep expired entries; returns how many were removed.
    pub fn clean_expired(&self) -> usize {
        let now = Instant::now();
        self.entries
            .write()
            .map(|mut entries| {
                let before = entries.len();
                entries.retain(|_, e| !e.expired(now));
                before - entries.len()
            })
            .unwrap_or(0)
    }

    pub fn size(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Get the skill for `key`, running `load` on a miss.  Concurrent calls
    /// for the same key do not stampede: one loader runs; the others await
    /// the per-key guard and then find the fresh entry.  The loader returns
    /// the skill plus the TTL to cache it under.
    pub async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> SkillResult<Arc<Skill>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SkillResult<(Skill, Duration)>>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }

        let guard = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let _held = guard.lock().await;

        // The winning loader populated the cache while we waited.
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }

        let result = load().await;
        {
            let mut inflight = self.inflight.lock().await;
            inflight.remove(key);
        }
        let (skill, ttl) = result?;
        self.put_with_ttl(key, skill, ttl);
        self.get(key)
            .ok_or_else(|| crate::skills::error::SkillError::NotFound(key.to_string()))
    }
}

impl Default for SkillCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
