use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AgentId, AgentStatus, SkillConfig, SkillReport, TaskId};

/// Creation-time configuration. Never mutated once the agent exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
    #[serde(default)]
    pub abilities: Vec<String>,
    #[serde(default)]
    pub skills: Vec<SkillConfig>,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    // Falls back to the runtime-wide `agent.max_task_history`
    #[serde(default)]
    pub max_task_history: Option<usize>,
}

fn default_agent_type() -> String {
    "custom".to_string()
}

impl AgentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent_type: default_agent_type(),
            abilities: Vec::new(),
            skills: Vec::new(),
            memory: MemoryConfig::default(),
            queue: QueueConfig::default(),
            llm: LlmConfig::default(),
            max_task_history: None,
        }
    }

    pub fn with_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = agent_type.into();
        self
    }

    pub fn with_ability(mut self, ability: impl Into<String>) -> Self {
        self.abilities.push(ability.into());
        self
    }

    pub fn with_skill(mut self, skill: SkillConfig) -> Self {
        self.skills.push(skill);
        self
    }

    pub fn with_max_task_history(mut self, cap: usize) -> Self {
        self.max_task_history = Some(cap);
        self
    }

    pub fn with_queue_size(mut self, max_size: usize) -> Self {
        self.queue.max_size = Some(max_size);
        self
    }

    /// An agent that declares no abilities may run any registered one.
    pub fn allows(&self, ability: &str) -> bool {
        self.abilities.is_empty() || self.abilities.iter().any(|a| a == ability)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub max_entries: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { max_entries: 1000 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    // Falls back to the runtime-wide `agent.max_queue_size`
    pub max_size: Option<usize>,
}

/// Passed through untouched to abilities that talk to a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub task_id: TaskId,
    pub ability: String,
    pub input: Value,
    pub output: Value,
    pub timestamp: DateTime<Utc>,
}

/// Read-only view returned by status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusReport {
    pub id: AgentId,
    pub name: String,
    pub agent_type: String,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub uptime_secs: f64,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub queue_len: usize,
    pub history_len: usize,
    pub task_count: usize,
    pub skills: Vec<SkillReport>,
}
