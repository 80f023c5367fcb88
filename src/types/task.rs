use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DispatchMode, TaskId, TaskStatus};

/// A unit of work addressed to one ability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub ability: String,
    #[serde(default)]
    pub mode: DispatchMode,
    // Higher runs first; equal priorities run in submission order
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub payload: Value,
}

impl Task {
    pub fn new(ability: impl Into<String>, mode: DispatchMode) -> Self {
        Self {
            ability: ability.into(),
            mode,
            priority: 0,
            payload: Value::Null,
        }
    }

    pub fn direct(ability: impl Into<String>) -> Self {
        Self::new(ability, DispatchMode::Direct)
    }

    pub fn queued(ability: impl Into<String>) -> Self {
        Self::new(ability, DispatchMode::Queue)
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: TaskId,
    pub ability: String,
    pub status: TaskStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub task: Task,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl TaskResult {
    pub fn pending(task: Task) -> Self {
        Self {
            id: TaskId::new_v4(),
            ability: task.ability.clone(),
            status: TaskStatus::Pending,
            submitted_at: Utc::now(),
            started_at: None,
            ended_at: None,
            task,
            output: None,
            error: None,
        }
    }

    pub fn running(task: Task) -> Self {
        let mut result = Self::pending(task);
        result.mark_running();
        result
    }

    pub fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self, output: Value) {
        self.status = TaskStatus::Completed;
        self.output = Some(output);
        self.ended_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.ended_at = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.ended_at = Some(Utc::now());
    }
}

/// Structured reply of `Runtime::execute_task`. Failures never surface as `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub success: bool,
    pub task_id: Option<TaskId>,
    pub queued: bool,
    pub status: Option<TaskStatus>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl ExecuteResponse {
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            task_id: None,
            queued: false,
            status: None,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn queued(task_id: TaskId) -> Self {
        Self {
            success: true,
            task_id: Some(task_id),
            queued: true,
            status: Some(TaskStatus::Pending),
            result: None,
            error: None,
        }
    }

    pub fn from_result(record: &TaskResult) -> Self {
        let success = record.status == TaskStatus::Completed;
        Self {
            success,
            task_id: Some(record.id),
            queued: false,
            status: Some(record.status),
            result: record.output.clone(),
            error: record.error.clone(),
        }
    }
}
