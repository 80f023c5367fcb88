use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use super::agent::Agent;
use crate::error::RuntimeError;
use crate::types::AgentId;

#[derive(Default)]
struct Entries {
    agents: HashMap<AgentId, Arc<Agent>>,
    // Deleted ids are never handed out again
    retired: HashSet<AgentId>,
}

#[derive(Default)]
pub struct AgentRegistry {
    entries: RwLock<Entries>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, agent: Arc<Agent>) -> Result<(), RuntimeError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.agents.contains_key(&agent.id) || entries.retired.contains(&agent.id) {
            return Err(RuntimeError::InvalidInput(format!(
                "Agent id {} already used",
                agent.id
            )));
        }
        entries.agents.insert(agent.id, agent);
        Ok(())
    }

    pub fn get(&self, id: AgentId) -> Option<Arc<Agent>> {
        self.read().agents.get(&id).cloned()
    }

    pub fn contains(&self, id: AgentId) -> bool {
        let entries = self.read();
        entries.agents.contains_key(&id) || entries.retired.contains(&id)
    }

    /// Point-in-time copy ordered by creation time. The registry lock is
    /// released before the caller touches any agent.
    pub fn list(&self) -> Vec<Arc<Agent>> {
        let mut agents: Vec<Arc<Agent>> = self.read().agents.values().cloned().collect();
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        agents
    }

    pub fn remove(&self, id: AgentId) -> Option<Arc<Agent>> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let removed = entries.agents.remove(&id);
        if removed.is_some() {
            entries.retired.insert(id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read().agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }
}
