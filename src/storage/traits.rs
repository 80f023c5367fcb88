use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::memory::AgentMemory;
use crate::types::{AgentConfig, AgentId, AgentStatus, HistoryEntry, SkillState, TaskResult};

/// Durable image of one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedAgent {
    pub id: AgentId,
    pub config: AgentConfig,
    pub created_at: DateTime<Utc>,
    pub status: AgentStatus,
    pub updated_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub memory: AgentMemory,
    pub skills: Vec<SkillState>,
    // Submission order
    pub results: Vec<TaskResult>,
    pub history: Vec<HistoryEntry>,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Replaces the stored state with `agents`.
    async fn save(&self, agents: &[PersistedAgent]) -> Result<()>;

    async fn load(&self) -> Result<Vec<PersistedAgent>>;
}
