use std::sync::Arc;

use super::agent::Agent;
use super::executor;
use crate::abilities::Ability;
use crate::error::{Result, RuntimeError};
use crate::metrics::MetricEvent;
use crate::runtime::Runtime;
use crate::types::{
    AgentId, AgentStatus, DispatchMode, ExecuteResponse, Task, TaskId, TaskResult, TaskStatus,
};

const NOT_IN_STATE: &str = "Agent not in correct state";

impl Runtime {
    /// Submits a task. Every failure is reported inside the response;
    /// rejected submissions leave no task record behind.
    pub async fn execute_task(&self, agent_id: AgentId, task: Task) -> ExecuteResponse {
        let Some(agent) = self.inner.agents.get(agent_id) else {
            return reject(agent_id, "Agent not found".to_string());
        };

        let ability = if task.ability.trim().is_empty() {
            None
        } else {
            self.abilities().get(&task.ability)
        };
        let Some(ability) = ability else {
            return reject(agent_id, format!("Ability not found: {}", task.ability));
        };
        if !agent.config.allows(&task.ability) {
            return reject(
                agent_id,
                format!("Ability not enabled for agent: {}", task.ability),
            );
        }

        match task.mode {
            DispatchMode::Queue => self.enqueue(&agent, task),
            DispatchMode::Direct => self.execute_direct(&agent, ability, task).await,
        }
    }

    fn enqueue(&self, agent: &Arc<Agent>, task: Task) -> ExecuteResponse {
        let ability = task.ability.clone();
        let submitted = agent.with_state(|state| -> std::result::Result<TaskId, String> {
            if !state.status.accepts(DispatchMode::Queue) {
                return Err(NOT_IN_STATE.to_string());
            }
            let record = TaskResult::pending(task);
            let task_id = record.id;
            state
                .queue
                .push(task_id, record.task.priority)
                .map_err(|_| "Task queue full".to_string())?;
            state.results.insert(record);
            Ok(task_id)
        });

        match submitted {
            Ok(task_id) => {
                agent.wake();
                self.metrics().record(
                    MetricEvent::counter("agent.task.queued", 1.0)
                        .tag("agent", agent.id)
                        .tag("ability", &ability),
                );
                log::debug!("Queued task {} ({}) on agent {}", task_id, ability, agent.id);
                ExecuteResponse::queued(task_id)
            }
            Err(error) => reject(agent.id, error),
        }
    }

    async fn execute_direct(
        &self,
        agent: &Arc<Agent>,
        ability: Arc<dyn Ability>,
        task: Task,
    ) -> ExecuteResponse {
        let task_id = agent.with_state(|state| {
            if !state.status.accepts(DispatchMode::Direct) {
                return None;
            }
            let record = TaskResult::running(task.clone());
            let task_id = record.id;
            state.results.insert(record);
            Some(task_id)
        });
        let Some(task_id) = task_id else {
            return reject(agent.id, NOT_IN_STATE.to_string());
        };

        let _gate = agent.exec_gate().await;

        // The agent may have been paused, stopped or failed while we waited
        let waiting = agent.with_state(|state| -> Option<TaskResult> {
            let running = state.status == AgentStatus::Running;
            let record = state.results.get_mut(&task_id)?;
            if record.status != TaskStatus::Running {
                return Some(record.clone());
            }
            if running {
                record.mark_running();
                state.touch();
                None
            } else {
                record.fail(NOT_IN_STATE);
                Some(record.clone())
            }
        });
        if let Some(record) = waiting {
            return ExecuteResponse::from_result(&record);
        }

        let outcome = executor::invoke(&ability, agent, Some(task_id), &task, self.metrics()).await;
        let succeeded = outcome.is_ok();
        let record = agent.with_state(|state| state.finish_task(task_id, &task, outcome));
        self.record_task_outcome(agent.id, &task.ability, succeeded, record.as_ref());

        match record {
            Some(record) => ExecuteResponse::from_result(&record),
            None => ExecuteResponse::rejected(format!("Task {} record missing", task_id)),
        }
    }

    pub(crate) fn record_task_outcome(
        &self,
        agent_id: AgentId,
        ability: &str,
        succeeded: bool,
        record: Option<&TaskResult>,
    ) {
        let name = if succeeded {
            self.inner.restarts.reset(agent_id);
            "agent.task.completed"
        } else {
            "agent.task.failed"
        };
        self.metrics().record(
            MetricEvent::counter(name, 1.0)
                .tag("agent", agent_id)
                .tag("ability", ability),
        );
        if let Some(record) = record {
            if let (Some(started), Some(ended)) = (record.started_at, record.ended_at) {
                if let Ok(elapsed) = ended.signed_duration_since(started).to_std() {
                    self.metrics().record(
                        MetricEvent::timer("agent.task.duration", elapsed).tag("ability", ability),
                    );
                }
            }
        }
    }

    pub fn get_task_status(&self, agent_id: AgentId, task_id: TaskId) -> Result<TaskStatus> {
        Ok(self.get_task_result(agent_id, task_id)?.status)
    }

    pub fn get_task_result(&self, agent_id: AgentId, task_id: TaskId) -> Result<TaskResult> {
        self.agent(agent_id)?
            .with_state(|state| state.results.get(&task_id).cloned())
            .ok_or(RuntimeError::TaskNotFound(task_id))
    }

    /// Newest first, optionally filtered by status.
    pub fn list_tasks(
        &self,
        agent_id: AgentId,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<TaskResult>> {
        Ok(self
            .agent(agent_id)?
            .with_state(|state| state.results.list(status, limit)))
    }

    /// Cancels a pending or running task. A pending task is skipped when the
    /// loop reaches it; a running ability finishes but its output is dropped.
    pub fn cancel_task(&self, agent_id: AgentId, task_id: TaskId) -> Result<()> {
        let agent = self.agent(agent_id)?;
        agent.with_state(|state| -> Result<()> {
            let record = state
                .results
                .get_mut(&task_id)
                .ok_or(RuntimeError::TaskNotFound(task_id))?;
            match record.status {
                TaskStatus::Pending | TaskStatus::Running => {
                    record.cancel();
                    Ok(())
                }
                status => Err(RuntimeError::TaskNotCancellable { task_id, status }),
            }
        })?;

        log::info!("Cancelled task {} on agent {}", task_id, agent_id);
        Ok(())
    }
}

fn reject(agent_id: AgentId, error: String) -> ExecuteResponse {
    log::warn!("Rejected task for agent {}: {}", agent_id, error);
    ExecuteResponse::rejected(error)
}
