use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use super::agent::Agent;
use crate::abilities::{Ability, AbilityContext};
use crate::metrics::{MetricEvent, MetricsSink};
use crate::types::{Task, TaskId};

/// Invokes one ability for `agent`. Errors and panics both come back as the
/// failure message; the caller must already hold the agent's execution gate.
pub(crate) async fn invoke(
    ability: &Arc<dyn Ability>,
    agent: &Arc<Agent>,
    task_id: Option<TaskId>,
    task: &Task,
    metrics: &dyn MetricsSink,
) -> Result<Value, String> {
    let ctx = AbilityContext::new(agent.clone(), task_id);
    let started = Instant::now();

    let outcome = AssertUnwindSafe(ability.invoke(&ctx, task))
        .catch_unwind()
        .await;

    metrics.record(
        MetricEvent::timer("agent.ability.duration", started.elapsed())
            .tag("ability", &task.ability)
            .tag("agent", agent.id),
    );

    match outcome {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => {
            log::error!("Ability {} failed on agent {}: {:#}", task.ability, agent.id, e);
            Err(format!("{:#}", e))
        }
        Err(panic) => {
            let message = format!("Ability panicked: {}", panic_message(panic.as_ref()));
            log::error!("Ability {} on agent {}: {}", task.ability, agent.id, message);
            Err(message)
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
