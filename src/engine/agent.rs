use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

use super::memory::AgentMemory;
use super::queue::TaskQueue;
use super::results::ResultStore;
use crate::config::AgentDefaults;
use crate::error::RuntimeError;
use crate::lifecycle::HealthProbe;
use crate::storage::PersistedAgent;
use crate::types::{
    AgentConfig, AgentId, AgentStatus, AgentStatusReport, HistoryEntry, SkillState, Task,
    TaskId, TaskResult, TaskStatus,
};

/// Everything about an agent that changes after creation.
pub struct AgentState {
    pub status: AgentStatus,
    pub updated_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub memory: AgentMemory,
    pub queue: TaskQueue,
    pub skills: Vec<SkillState>,
    pub results: ResultStore,
    pub history: VecDeque<HistoryEntry>,
    history_cap: usize,
    // Bumped on every start; a loop holding an older value must exit
    pub generation: u64,
}

impl AgentState {
    pub fn set_status(&mut self, status: AgentStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        let now = Utc::now();
        self.last_error = Some(error.into());
        self.last_error_at = Some(now);
        self.status = AgentStatus::Error;
        self.updated_at = now;
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
        self.last_error_at = None;
    }

    pub fn push_history(&mut self, entry: HistoryEntry) {
        if self.history_cap == 0 {
            return;
        }
        self.history.push_back(entry);
        while self.history.len() > self.history_cap {
            self.history.pop_front();
        }
    }

    /// Applies an ability outcome to the task record and returns the record.
    ///
    /// A cancelled record keeps its status and drops the output, but a
    /// failure still moves the agent to `Error`.
    pub fn finish_task(
        &mut self,
        task_id: TaskId,
        task: &Task,
        outcome: Result<serde_json::Value, String>,
    ) -> Option<TaskResult> {
        let cancelled = self
            .results
            .get(&task_id)
            .map_or(false, |record| record.status == TaskStatus::Cancelled);

        match outcome {
            Ok(output) => {
                if !cancelled {
                    if let Some(record) = self.results.get_mut(&task_id) {
                        record.complete(output.clone());
                    }
                    self.push_history(HistoryEntry {
                        task_id,
                        ability: task.ability.clone(),
                        input: task.payload.clone(),
                        output,
                        timestamp: Utc::now(),
                    });
                }
            }
            Err(error) => {
                if !cancelled {
                    if let Some(record) = self.results.get_mut(&task_id) {
                        record.fail(error.clone());
                    }
                }
                self.record_error(format!("Task {} ({}) failed: {}", task_id, task.ability, error));
            }
        }

        self.touch();
        let record = self.results.get(&task_id).cloned();
        self.results.evict_overflow();
        record
    }
}

/// A registered agent.
///
/// Identity and config never change. All mutable state sits behind one
/// short-held std mutex, and ability runs are serialized by a separate
/// async gate so status queries never wait on a running ability.
pub struct Agent {
    pub id: AgentId,
    pub config: AgentConfig,
    pub created_at: DateTime<Utc>,
    state: Mutex<AgentState>,
    wake: Notify,
    exec: tokio::sync::Mutex<()>,
}

impl Agent {
    pub fn new(
        id: AgentId,
        config: AgentConfig,
        defaults: &AgentDefaults,
    ) -> Result<Self, RuntimeError> {
        let now = Utc::now();
        let skills = config
            .skills
            .iter()
            .map(|skill| SkillState::new(skill, now))
            .collect::<Result<Vec<_>, _>>()?;

        let state = AgentState {
            status: AgentStatus::Created,
            updated_at: now,
            last_activity: now,
            started_at: None,
            last_error: None,
            last_error_at: None,
            memory: AgentMemory::new(config.memory.max_entries),
            queue: TaskQueue::new(config.queue.max_size.unwrap_or(defaults.max_queue_size)),
            skills,
            results: ResultStore::new(defaults.max_task_results),
            history: VecDeque::new(),
            history_cap: config.max_task_history.unwrap_or(defaults.max_task_history),
            generation: 0,
        };

        Ok(Self::assemble(id, config, now, state))
    }

    /// Rebuilds an agent from its persisted image. Nothing is running after a
    /// restore, so live statuses come back as `Stopped` and interrupted tasks
    /// as failed.
    pub fn from_persisted(
        persisted: PersistedAgent,
        defaults: &AgentDefaults,
    ) -> Result<Self, RuntimeError> {
        let PersistedAgent {
            id,
            config,
            created_at,
            status,
            updated_at,
            last_activity,
            last_error,
            last_error_at,
            memory,
            mut skills,
            results: records,
            history,
        } = persisted;

        for skill in &mut skills {
            skill.rehydrate()?;
        }

        let status = match status {
            AgentStatus::Created | AgentStatus::Error => status,
            _ => AgentStatus::Stopped,
        };

        let mut queue = TaskQueue::new(config.queue.max_size.unwrap_or(defaults.max_queue_size));
        let mut results = ResultStore::new(defaults.max_task_results);
        for mut record in records {
            match record.status {
                TaskStatus::Running => record.fail("interrupted before completion"),
                TaskStatus::Pending => {
                    if let Err(e) = queue.push(record.id, record.task.priority) {
                        record.fail(e.to_string());
                    }
                }
                _ => {}
            }
            results.insert(record);
        }

        let history_cap = config.max_task_history.unwrap_or(defaults.max_task_history);
        let mut state = AgentState {
            status,
            updated_at,
            last_activity,
            started_at: None,
            last_error,
            last_error_at,
            memory,
            queue,
            skills,
            results,
            history: VecDeque::new(),
            history_cap,
            generation: 0,
        };
        for entry in history {
            state.push_history(entry);
        }

        Ok(Self::assemble(id, config, created_at, state))
    }

    fn assemble(
        id: AgentId,
        config: AgentConfig,
        created_at: DateTime<Utc>,
        state: AgentState,
    ) -> Self {
        Self {
            id,
            config,
            created_at,
            state: Mutex::new(state),
            wake: Notify::new(),
            exec: tokio::sync::Mutex::new(()),
        }
    }

    /// Runs `f` under the state lock. Never call this across an `.await`.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut AgentState) -> R) -> R {
        f(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> AgentStatus {
        self.lock().status
    }

    /// Wakes the work loop. A wake-up sent while the loop is busy is kept
    /// for its next park.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub(crate) async fn parked(&self) {
        self.wake.notified().await
    }

    /// Held by whoever is running an ability on this agent.
    pub(crate) async fn exec_gate(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.exec.lock().await
    }

    pub fn report(&self) -> AgentStatusReport {
        let now = Utc::now();
        let state = self.lock();
        let uptime_secs = match state.started_at {
            Some(started) if state.status.is_active() => {
                now.signed_duration_since(started).num_milliseconds().max(0) as f64 / 1000.0
            }
            _ => 0.0,
        };

        AgentStatusReport {
            id: self.id,
            name: self.config.name.clone(),
            agent_type: self.config.agent_type.clone(),
            status: state.status,
            created_at: self.created_at,
            updated_at: state.updated_at,
            last_activity: state.last_activity,
            uptime_secs,
            last_error: state.last_error.clone(),
            last_error_at: state.last_error_at,
            queue_len: state.queue.len(),
            history_len: state.history.len(),
            task_count: state.results.len(),
            skills: state.skills.iter().map(SkillState::report).collect(),
        }
    }

    pub fn probe(&self) -> HealthProbe {
        let state = self.lock();
        HealthProbe {
            agent_id: self.id,
            name: self.config.name.clone(),
            status: state.status,
            last_activity: state.last_activity,
            started_at: state.started_at,
            last_error: state.last_error.clone(),
        }
    }

    pub fn snapshot(&self) -> PersistedAgent {
        let state = self.lock();
        PersistedAgent {
            id: self.id,
            config: self.config.clone(),
            created_at: self.created_at,
            status: state.status,
            updated_at: state.updated_at,
            last_activity: state.last_activity,
            last_error: state.last_error.clone(),
            last_error_at: state.last_error_at,
            memory: state.memory.clone(),
            skills: state.skills.clone(),
            results: state.results.iter().cloned().collect(),
            history: state.history.iter().cloned().collect(),
        }
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.lock().history.iter().cloned().collect()
    }

    #[doc(hidden)]
    pub fn set_last_activity(&self, at: DateTime<Utc>) {
        self.lock().last_activity = at;
    }
}
