//! Run persistence.
//!
//! The orchestrator needs two things from storage: record a finished run,
//! and fetch the final prompt of an earlier one to refine it further. Store
//! failures are logged by the orchestrator and never fail a run.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use promptsmith_core::PipelineRun;

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Record a terminated run and the prompt it ended with.
    async fn store_run(&self, run: &PipelineRun, final_prompt: &str) -> Result<(), StoreError>;

    /// Final prompt of a stored run.
    async fn fetch_prompt(&self, run_id: Uuid) -> Result<Option<String>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Run is not terminal: {0}")]
    NotTerminal(Uuid),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone)]
struct StoredRun {
    run: PipelineRun,
    final_prompt: String,
}

/// In-memory implementation for tests and single-process use
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<Uuid, StoredRun>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.read().is_empty()
    }

    /// Stored copy of a run.
    pub fn run(&self, run_id: Uuid) -> Option<PipelineRun> {
        self.runs.read().get(&run_id).map(|s| s.run.clone())
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn store_run(&self, run: &PipelineRun, final_prompt: &str) -> Result<(), StoreError> {
        if run.finished_at.is_none() {
            return Err(StoreError::NotTerminal(run.id));
        }
        self.runs.write().insert(
            run.id,
            StoredRun {
                run: run.clone(),
                final_prompt: final_prompt.to_string(),
            },
        );
        Ok(())
    }

    async fn fetch_prompt(&self, run_id: Uuid) -> Result<Option<String>, StoreError> {
        Ok(self
            .runs
            .read()
            .get(&run_id)
            .map(|s| s.final_prompt.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptsmith_core::PipelineConfig;

    #[tokio::test]
    async fn test_store_and_fetch() {
        let store = InMemoryRunStore::new();
        let mut run = PipelineRun::new("You are a bot.", PipelineConfig::default());
        run.finalize();

        store.store_run(&run, "You are a careful bot.").await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.fetch_prompt(run.id).await.unwrap().as_deref(),
            Some("You are a careful bot.")
        );
        assert!(store.fetch_prompt(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_running_run_is_rejected() {
        let store = InMemoryRunStore::new();
        let run = PipelineRun::new("You are a bot.", PipelineConfig::default());

        assert!(matches!(
            store.store_run(&run, "x").await,
            Err(StoreError::NotTerminal(_))
        ));
        assert!(store.is_empty());
    }
}
