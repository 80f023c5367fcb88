use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use super::traits::{PersistedAgent, StateStore};

#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    agents: Arc<RwLock<Vec<PersistedAgent>>>,
    saves: Arc<AtomicUsize>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agents(agents: Vec<PersistedAgent>) -> Self {
        Self {
            agents: Arc::new(RwLock::new(agents)),
            saves: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn snapshot(&self) -> Vec<PersistedAgent> {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save(&self, agents: &[PersistedAgent]) -> Result<()> {
        *self.agents.write().unwrap_or_else(|e| e.into_inner()) = agents.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> Result<Vec<PersistedAgent>> {
        Ok(self.snapshot())
    }
}
