use serde::{Deserialize, Serialize};

use crate::error::{Result, RuntimeError};
use crate::types::{AgentId, AgentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleOp {
    Start,
    Stop,
    Pause,
    Resume,
}

impl LifecycleOp {
    pub fn as_str(&self) -> &str {
        match self {
            LifecycleOp::Start => "start",
            LifecycleOp::Stop => "stop",
            LifecycleOp::Pause => "pause",
            LifecycleOp::Resume => "resume",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Apply(AgentStatus),
    /// Already where the operation would leave it.
    NoOp,
}

pub struct AgentStateMachine;

impl AgentStateMachine {
    pub fn plan(agent_id: AgentId, status: AgentStatus, op: LifecycleOp) -> Result<Transition> {
        let transition = match (status, op) {
            (AgentStatus::Created | AgentStatus::Stopped, LifecycleOp::Start) => {
                Transition::Apply(AgentStatus::Initializing)
            }
            (AgentStatus::Running | AgentStatus::Initializing, LifecycleOp::Start) => {
                Transition::NoOp
            }

            (
                AgentStatus::Created
                | AgentStatus::Initializing
                | AgentStatus::Running
                | AgentStatus::Paused,
                LifecycleOp::Stop,
            ) => Transition::Apply(AgentStatus::Stopped),
            (AgentStatus::Stopped | AgentStatus::Error, LifecycleOp::Stop) => Transition::NoOp,

            (AgentStatus::Running, LifecycleOp::Pause) => Transition::Apply(AgentStatus::Paused),
            (AgentStatus::Paused, LifecycleOp::Resume) => Transition::Apply(AgentStatus::Running),

            // Paused must resume, Error must go through restart
            _ => {
                return Err(RuntimeError::state_conflict(agent_id, op.as_str(), status));
            }
        };

        Ok(transition)
    }
}
