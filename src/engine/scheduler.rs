use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use super::agent::Agent;
use super::executor;
use crate::metrics::MetricEvent;
use crate::runtime::Runtime;
use crate::types::{AgentStatus, Task};

/// Decays skill experience and runs every skill whose schedule is due.
/// Returns true if at least one skill ran.
///
/// Skill outcomes only touch the skill's own record; a failing skill never
/// changes the agent's status and a passing one leaves the restart budget alone.
pub(crate) async fn run_due_skills(runtime: &Runtime, agent: &Arc<Agent>, generation: u64) -> bool {
    let tuning = &runtime.config().skills;

    let due: Vec<(usize, String)> = agent.with_state(|state| {
        let now = Utc::now();
        state
            .skills
            .iter_mut()
            .enumerate()
            .filter_map(|(index, skill)| {
                skill.decay(tuning.xp_decay);
                skill.is_due(now).then(|| (index, skill.ability.clone()))
            })
            .collect()
    });

    let mut ran = false;
    for (index, name) in due {
        let _gate = agent.exec_gate().await;

        let proceed = agent.with_state(|state| {
            if state.generation != generation || state.status != AgentStatus::Running {
                return false;
            }
            if let Some(skill) = state.skills.get_mut(index) {
                skill.mark_started(Utc::now());
            }
            true
        });
        if !proceed {
            break;
        }

        let task = Task::direct(name.clone()).with_payload(json!({
            "skill": name,
            "scheduled": true,
        }));
        let outcome = match runtime.abilities().get(&name) {
            Some(ability) => {
                executor::invoke(&ability, agent, None, &task, runtime.metrics()).await
            }
            None => Err(format!("Ability not found: {}", name)),
        };

        let succeeded = outcome.is_ok();
        agent.with_state(|state| {
            if let Some(skill) = state.skills.get_mut(index) {
                match &outcome {
                    Ok(_) => skill.record_success(tuning.success_reward),
                    Err(e) => skill.record_failure(tuning.failure_penalty, e.clone()),
                }
            }
            state.touch();
        });

        if succeeded {
            runtime.metrics().record(
                MetricEvent::counter("agent.skill.executed", 1.0)
                    .tag("agent", agent.id)
                    .tag("skill", &name),
            );
        } else {
            log::warn!("Skill {} failed on agent {}", name, agent.id);
            runtime.metrics().record(
                MetricEvent::counter("agent.skill.failed", 1.0)
                    .tag("agent", agent.id)
                    .tag("skill", &name),
            );
        }
        ran = true;
    }

    ran
}
