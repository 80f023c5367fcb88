use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::agent::Agent;
use super::work_loop;
use crate::error::Result;
use crate::lifecycle::{AgentStateMachine, LifecycleOp, Transition};
use crate::metrics::MetricEvent;
use crate::runtime::{LoopHandle, Runtime};
use crate::types::{AgentId, AgentStatus};

impl Runtime {
    /// Spawns the agent's work loop and returns without waiting for it to
    /// reach `Running`. Starting a live agent is a no-op.
    pub fn start_agent(&self, agent_id: AgentId) -> Result<()> {
        let agent = self.agent(agent_id)?;
        let generation = self.apply(&agent, LifecycleOp::Start, |state| {
            let now = Utc::now();
            state.started_at = Some(now);
            state.last_activity = now;
            state.generation += 1;
            state.generation
        })?;

        if let Some(generation) = generation {
            self.spawn_loop(agent.clone(), generation);
            agent.wake();
            log::info!("Started agent {} ({})", agent.config.name, agent_id);
        }
        Ok(())
    }

    /// Marks the agent stopped and waits up to `agent.stop_timeout_secs` for
    /// its loop to exit (indefinitely when that is ≤ 0). A loop that fails to
    /// exit leaves the agent in `Error`.
    pub async fn stop_agent(&self, agent_id: AgentId) -> Result<()> {
        let agent = self.agent(agent_id)?;
        let applied = self.apply(&agent, LifecycleOp::Stop, |_| ())?;
        agent.wake();

        let handle = self
            .inner
            .loops
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&agent_id);

        if let Some(mut handle) = handle {
            let joined = match self.inner.config.agent.stop_timeout() {
                Some(timeout) => tokio::time::timeout(timeout, &mut handle.join)
                    .await
                    .map_err(|_| timeout),
                None => Ok((&mut handle.join).await),
            };
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::error!("Work loop of agent {} failed: {}", agent_id, e);
                    agent.with_state(|state| state.record_error(format!("Work loop failed: {}", e)));
                }
                Err(timeout) => {
                    log::error!(
                        "Work loop of agent {} did not stop within {:?}",
                        agent_id,
                        timeout
                    );
                    agent.with_state(|state| {
                        state.record_error(format!("Work loop did not stop within {:?}", timeout))
                    });
                }
            }
        }

        if applied.is_some() {
            log::info!("Stopped agent {} ({})", agent.config.name, agent_id);
        }
        Ok(())
    }

    pub fn pause_agent(&self, agent_id: AgentId) -> Result<()> {
        let agent = self.agent(agent_id)?;
        self.apply(&agent, LifecycleOp::Pause, |_| ())?;
        agent.wake();
        log::info!("Paused agent {} ({})", agent.config.name, agent_id);
        Ok(())
    }

    pub fn resume_agent(&self, agent_id: AgentId) -> Result<()> {
        let agent = self.agent(agent_id)?;
        self.apply(&agent, LifecycleOp::Resume, |state| state.touch())?;
        agent.wake();
        log::info!("Resumed agent {} ({})", agent.config.name, agent_id);
        Ok(())
    }

    /// Stops the agent if needed, clears its last error and starts it again.
    /// This is the way out of `Error`.
    pub async fn restart_agent(&self, agent_id: AgentId) -> Result<()> {
        self.stop_agent(agent_id).await?;

        let agent = self.agent(agent_id)?;
        agent.with_state(|state| {
            state.clear_error();
            if state.status == AgentStatus::Error {
                state.set_status(AgentStatus::Stopped);
            }
        });

        self.start_agent(agent_id)?;
        self.metrics()
            .record(MetricEvent::counter("agent.restarted", 1.0).tag("agent", agent_id));
        Ok(())
    }

    /// Id of the loop currently registered for the agent, if any.
    pub fn loop_task_id(&self, agent_id: AgentId) -> Option<u64> {
        self.inner
            .loops
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&agent_id)
            .map(|handle| handle.loop_id)
    }

    /// Plans `op` against the current status and applies it under one lock
    /// hold. `Ok(None)` is a successful no-op.
    fn apply<R>(
        &self,
        agent: &Agent,
        op: LifecycleOp,
        on_apply: impl FnOnce(&mut super::agent::AgentState) -> R,
    ) -> Result<Option<R>> {
        agent
            .with_state(|state| -> Result<Option<R>> {
                match AgentStateMachine::plan(agent.id, state.status, op)? {
                    Transition::NoOp => Ok(None),
                    Transition::Apply(next) => {
                        state.set_status(next);
                        Ok(Some(on_apply(state)))
                    }
                }
            })
            .map_err(|e| {
                log::warn!("{}", e);
                e
            })
    }

    fn spawn_loop(&self, agent: Arc<Agent>, generation: u64) {
        let loop_id = self.inner.next_loop_id.fetch_add(1, Ordering::SeqCst);
        let agent_id = agent.id;

        // Held across the spawn so the loop cannot deregister before it is registered
        let mut loops = self.inner.loops.lock().unwrap_or_else(|e| e.into_inner());
        let join = tokio::spawn(work_loop::run(self.clone(), agent, generation, loop_id));
        loops.insert(agent_id, LoopHandle { loop_id, join });
    }

    pub(crate) fn remove_loop_handle(&self, agent_id: AgentId, loop_id: u64) {
        let mut loops = self.inner.loops.lock().unwrap_or_else(|e| e.into_inner());
        if loops.get(&agent_id).map(|h| h.loop_id) == Some(loop_id) {
            loops.remove(&agent_id);
        }
    }
}
