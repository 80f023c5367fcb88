pub mod agent;
pub mod skill;
pub mod task;

pub use agent::{
    AgentConfig, AgentStatusReport, HistoryEntry, LlmConfig, MemoryConfig, QueueConfig,
};
pub use skill::{Schedule, SkillConfig, SkillReport, SkillState};
pub use task::{ExecuteResponse, Task, TaskResult};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AgentId = Uuid;
pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Created,      // Registered, never started
    Initializing, // Loop spawned, first iteration pending
    Running,      // Loop draining work
    Paused,       // Loop parked until resume
    Stopped,      // Loop exited cleanly
    Error,        // Ability or loop failure, needs restart
}

impl AgentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AgentStatus::Created => "created",
            AgentStatus::Initializing => "initializing",
            AgentStatus::Running => "running",
            AgentStatus::Paused => "paused",
            AgentStatus::Stopped => "stopped",
            AgentStatus::Error => "error",
        }
    }

    /// Statuses under which a work loop is expected to be alive.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AgentStatus::Initializing | AgentStatus::Running | AgentStatus::Paused
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Stopped | AgentStatus::Error)
    }

    pub fn accepts(&self, mode: DispatchMode) -> bool {
        match mode {
            DispatchMode::Direct => *self == AgentStatus::Running,
            DispatchMode::Queue => matches!(self, AgentStatus::Running | AgentStatus::Paused),
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    Direct,
    #[default]
    Queue,
}
