//! Run persistence contract.
//!
//! The durable object store is an external collaborator; [`RunStore`]
//! models the operations the control plane needs.  [`MemoryRunStore`] backs
//! tests, the retention scanner's unit tests, and single-process
//! deployments.  The store enforces the terminal-once invariant: after a
//! run reaches a terminal phase, further status writes are no-ops.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::run::record::{Run, RunPhase};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("run not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence operations for run records.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a new run (phase `pending`); the owner reference to the
    /// agent must already be stamped.
    async fn create(&self, run: &Run) -> StoreResult<()>;

    /// Write the run's status.  The transition to a terminal phase happens
    /// at most once; a second terminal write is an idempotent no-op that
    /// returns `Ok(false)`.
    async fn update_status(&self, run: &Run) -> StoreResult<bool>;

    async fn get(&self, id: &str) -> StoreResult<Run>;

    /// All runs, unordered.
    async fn list(&self) -> StoreResult<Vec<Run>>;

    async fn delete(&self, id: &str) -> StoreResult<()>;
}

// ─── MemoryRunStore ──────────────────────────────────────────────────────────

/// In-memory `RunStore`.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: RwLock<HashMap<String, Run>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runs.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create(&self, run: &Run) -> StoreResult<()> {
        let mut runs = self
            .runs
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        runs.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn update_status(&self, run: &Run) -> StoreResult<bool> {
        let mut runs = self
            .runs
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let existing = runs
            .get_mut(&run.id)
            .ok_or_else(|| StoreError::NotFound(run.id.clone()))?;
        if existing.phase.is_terminal() {
            return Ok(false);
        }
        *existing = run.clone();
        Ok(true)
    }

    async fn get(&self, id: &str) -> StoreResult<Run> {
        self.runs
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self) -> StoreResult<Vec<Run>> {
        Ok(self
            .runs
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?
            .values()
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.runs
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?
            .remove(id);
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
