//! The per-agent work loop: one spawned task per running agent.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use super::agent::Agent;
use super::{executor, scheduler};
use crate::metrics::MetricEvent;
use crate::runtime::Runtime;
use crate::types::{AgentStatus, TaskStatus};

enum Step {
    Exit,
    Park,
    Work,
}

pub(crate) async fn run(runtime: Runtime, agent: Arc<Agent>, generation: u64, loop_id: u64) {
    log::debug!(
        "Work loop {} started for agent {} (generation {})",
        loop_id,
        agent.id,
        generation
    );

    let failure = match AssertUnwindSafe(drive(&runtime, &agent, generation))
        .catch_unwind()
        .await
    {
        Ok(()) => None,
        Err(panic) => Some(format!(
            "Work loop panicked: {}",
            executor::panic_message(panic.as_ref())
        )),
    };

    let exited_in_error = agent.with_state(|state| {
        let current = state.generation == generation;
        if current {
            if let Some(cause) = &failure {
                state.record_error(cause.clone());
            }
            if !state.status.is_terminal() {
                state.set_status(AgentStatus::Stopped);
            }
        }
        state.touch();
        current && state.status == AgentStatus::Error
    });

    if let Some(cause) = &failure {
        log::error!("Agent {}: {}", agent.id, cause);
    }
    runtime.remove_loop_handle(agent.id, loop_id);
    if let Err(e) = runtime.persist().await {
        log::error!("Failed to persist state after agent {} loop exit: {}", agent.id, e);
    }
    log::debug!("Work loop {} for agent {} exited", loop_id, agent.id);

    if exited_in_error && runtime.config().restart.from_loop {
        restart_after_failure(&runtime, &agent, generation).await;
    }
}

async fn drive(runtime: &Runtime, agent: &Arc<Agent>, generation: u64) {
    let idle_poll = runtime.config().agent.idle_poll();

    loop {
        let step = agent.with_state(|state| {
            if state.generation != generation {
                return Step::Exit;
            }
            match state.status {
                AgentStatus::Stopped | AgentStatus::Error | AgentStatus::Created => Step::Exit,
                AgentStatus::Paused => Step::Park,
                AgentStatus::Initializing => {
                    state.set_status(AgentStatus::Running);
                    state.touch();
                    log::info!("Agent {} is running", agent.id);
                    Step::Work
                }
                AgentStatus::Running => {
                    state.touch();
                    Step::Work
                }
            }
        });

        match step {
            Step::Exit => return,
            Step::Park => agent.parked().await,
            Step::Work => {
                let ran_skills = scheduler::run_due_skills(runtime, agent, generation).await;
                let ran_task = run_next_task(runtime, agent, generation).await;

                if ran_skills || ran_task {
                    tokio::task::yield_now().await;
                } else {
                    let _ = tokio::time::timeout(idle_poll, agent.parked()).await;
                }
            }
        }
    }
}

/// Pops and runs one queued task. Returns false when the queue was empty.
async fn run_next_task(runtime: &Runtime, agent: &Arc<Agent>, generation: u64) -> bool {
    let Some(entry) = agent.with_state(|state| state.queue.pop()) else {
        return false;
    };
    let task_id = entry.task_id;

    let task = agent.with_state(|state| match state.results.get(&task_id) {
        None => {
            log::warn!("Agent {} dequeued unknown task {}", agent.id, task_id);
            None
        }
        Some(record) if record.status == TaskStatus::Pending => Some(record.task.clone()),
        Some(record) => {
            log::debug!("Dropping task {} ({}) from queue", task_id, record.status);
            None
        }
    });
    let Some(task) = task else {
        return true;
    };

    let ability = runtime.abilities().get(&task.ability);
    let _gate = agent.exec_gate().await;

    let ready = agent.with_state(|state| {
        if state.generation != generation || state.status != AgentStatus::Running {
            state.queue.requeue(entry);
            return false;
        }
        match state.results.get_mut(&task_id) {
            Some(record) if record.status == TaskStatus::Pending => {
                record.mark_running();
                true
            }
            _ => false,
        }
    });
    if !ready {
        return true;
    }

    let outcome = match &ability {
        Some(ability) => {
            executor::invoke(ability, agent, Some(task_id), &task, runtime.metrics()).await
        }
        None => Err(format!("Ability not found: {}", task.ability)),
    };
    let succeeded = outcome.is_ok();
    let record = agent.with_state(|state| state.finish_task(task_id, &task, outcome));

    runtime.record_task_outcome(agent.id, &task.ability, succeeded, record.as_ref());
    true
}

async fn restart_after_failure(runtime: &Runtime, agent: &Arc<Agent>, generation: u64) {
    let Some(delay) = runtime.inner.restarts.schedule(agent.id, Instant::now()) else {
        log::warn!(
            "Agent {} exhausted its restart budget, staying in error",
            agent.id
        );
        return;
    };

    log::info!("Restarting agent {} in {:?}", agent.id, delay);
    tokio::time::sleep(delay).await;

    let still_failed = agent.with_state(|state| {
        state.generation == generation && state.status == AgentStatus::Error
    });
    if !still_failed {
        log::debug!("Agent {} recovered before its scheduled restart", agent.id);
        return;
    }

    match runtime.restart_agent(agent.id).await {
        Ok(()) => runtime.metrics().record(
            MetricEvent::counter("agent.restart.from_loop", 1.0).tag("agent", agent.id),
        ),
        Err(e) => log::error!("Scheduled restart of agent {} failed: {}", agent.id, e),
    }
}
