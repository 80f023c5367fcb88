//! Error taxonomy for runtime operations.

use crate::types::{AgentId, AgentStatus, TaskId, TaskStatus};

/// Errors surfaced at the runtime's call boundary.
///
/// Ability failures are not represented here: they are captured on the
/// task record and escalate the agent to `AgentStatus::Error` instead.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// Bad configuration, malformed task or unknown ability.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The requested transition is not valid from the agent's current status.
    #[error("Cannot {operation} agent {agent_id} while {status}")]
    StateConflict {
        agent_id: AgentId,
        operation: String,
        status: AgentStatus,
    },

    #[error("Cannot cancel task {task_id} while {status}")]
    TaskNotCancellable { task_id: TaskId, status: TaskStatus },

    #[error("Task queue full ({capacity} entries)")]
    QueueFull { capacity: usize },

    #[error("Persistence error: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RuntimeError {
    pub fn state_conflict(agent_id: AgentId, operation: &str, status: AgentStatus) -> Self {
        Self::StateConflict {
            agent_id,
            operation: operation.to_string(),
            status,
        }
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
