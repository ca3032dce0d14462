//! TTL-based retention of completed run records.
//!
//! A periodic scanner deletes terminal runs whose completion time is older
//! than the TTL, subject to a per-scan deletion cap and a per-agent floor:
//! the newest `preserve_min_per_agent` runs of each agent survive even when
//! expired.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::sync::watch;

use crate::run::record::Run;
use crate::store::RunStore;

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Age after completion at which a run becomes deletable.
    pub ttl: Duration,
    pub scan_interval: Duration,
    /// Deletion cap per scan.
    pub max_delete_batch: usize,
    /// Newest runs kept per agent regardless of age.
    pub preserve_min_per_agent: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(168 * 3600),
            scan_interval: Duration::from_secs(3600),
            max_delete_batch: 100,
            preserve_min_per_agent: 5,
        }
    }
}

pub struct RetentionScanner {
    store: Arc<dyn RunStore>,
    config: RetentionConfig,
}

impl RetentionScanner {
    pub fn new(store: Arc<dyn RunStore>, config: RetentionConfig) -> Self {
        Self { store, config }
    }

    /// Run the periodic scan loop until the stop signal flips.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.scan_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.scan_once().await {
                        Ok(0) => {}
                        Ok(deleted) => {
                            tracing::info!(deleted, "retention: purged expired runs");
                        }
                        Err(error) => {
                            tracing::warn!("retention scan failed: {error}");
                        }
                    }
                }
                Ok(()) = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// One retention pass; returns the number of runs deleted.
    pub async fn scan_once(&self) -> Result<usize, crate::store::StoreError> {
        let runs = self.store.list().await?;
        let cutoff = Utc::now() - chrono::Duration::from_std(self.config.ttl).unwrap_or_default();

        // Group terminal runs by agent so the per-agent floor can be applied.
        let mut by_agent: HashMap<String, Vec<Run>> = HashMap::new();
        for run in runs {
            if run.phase.is_terminal() && run.completion_time.is_some() {
                by_agent.entry(run.agent_ref.clone()).or_default().push(run);
            }
        }

        let mut candidates: Vec<Run> = Vec::new();
        for (_, mut agent_runs) in by_agent {
            // Newest first; the head of the list is protected by the floor.
            agent_runs.sort_by_key(|r| std::cmp::Reverse(r.completion_time));
            for run in agent_runs.into_iter().skip(self.config.preserve_min_per_agent) {
                if run.completion_time.is_some_and(|t| t < cutoff) {
                    candidates.push(run);
                }
            }
        }

        // Oldest first, capped per scan.
        candidates.sort_by_key(|r| r.completion_time);
        candidates.truncate(self.config.max_delete_batch);

        let mut deleted = 0;
        for run in candidates {
            self.store.delete(&run.id).await?;
            deleted += 1;
        }
        Ok(deleted)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::record::{RunPhase, Trigger};
    use crate::store::MemoryRunStore;

    fn expired_run(agent: &str, age_hours: i64) -> Run {
        let mut run = Run::new(agent, "staging", Trigger::Scheduled, "m");
        run.phase = RunPhase::Succeeded;
        run.completion_time = Some(Utc::now() - chrono::Duration::hours(age_hours));
        run
    }

    fn config(preserve: usize, batch: usize) -> RetentionConfig {
        RetentionConfig {
            ttl: Duration::from_secs(168 * 3600),
            scan_interval: Duration::from_secs(3600),
            max_delete_batch: batch,
            preserve_min_per_agent: preserve,
        }
    }

    #[tokio::test]
    async fn preserve_floor_keeps_newest_per_agent() {
        let store = Arc::new(MemoryRunStore::new());
        for i in 0..10 {
            store
                .create(&expired_run("ops/watchman", 200 + i))
                .await
                .unwrap();
        }
        let scanner = RetentionScanner::new(store.clone(), config(5, 100));
        let deleted = scanner.scan_once().await.unwrap();
        assert_eq!(deleted, 5);
        assert_eq!(store.len(), 5);
    }

    #[tokio::test]
    async fn fresh_runs_are_not_deleted() {
        let store = Arc::new(MemoryRunStore::new());
        store.create(&expired_run("ops/watchman", 1)).await.unwrap();
        let scanner = RetentionScanner::new(store.clone(), config(0, 100));
        assert_eq!(scanner.scan_once().await.unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn non_terminal_runs_are_never_deleted() {
        let store = Arc::new(MemoryRunStore::new());
        let mut run = expired_run("ops/watchman", 500);
        run.phase = RunPhase::Running;
        store.create(&run).await.unwrap();
        let scanner = RetentionScanner::new(store.clone(), config(0, 100));
        assert_eq!(scanner.scan_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn batch_cap_limits_deletions_per_scan() {
        let store = Arc::new(MemoryRunStore::new());
        for i in 0..10 {
            store
                .create(&expired_run("ops/watchman", 200 + i))
                .await
                .unwrap();
        }
        let scanner = RetentionScanner::new(store.clone(), config(0, 3));
        assert_eq!(scanner.scan_once().await.unwrap(), 3);
        assert_eq!(store.len(), 7);
    }

    #[tokio::test]
    async fn floor_is_per_agent() {
        let store = Arc::new(MemoryRunStore::new());
        for i in 0..4 {
            store.create(&expired_run("ops/a", 200 + i)).await.unwrap();
            store.create(&expired_run("ops/b", 200 + i)).await.unwrap();
        }
        let scanner = RetentionScanner::new(store.clone(), config(2, 100));
        let deleted = scanner.scan_once().await.unwrap();
        assert_eq!(deleted, 4);
        assert_eq!(store.len(), 4);
    }
}
