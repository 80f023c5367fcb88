use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::health::{HealthSnapshot, OverallHealth};
use crate::types::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    AgentError,
    AgentStalled,
    RuntimeUnhealthy,
    RestartsExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl AlertKind {
    pub fn severity(&self) -> AlertSeverity {
        match self {
            AlertKind::AgentStalled => AlertSeverity::Warning,
            AlertKind::AgentError | AlertKind::RuntimeUnhealthy | AlertKind::RestartsExhausted => {
                AlertSeverity::Critical
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub agent_id: Option<AgentId>,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

struct AlertState {
    recent: VecDeque<Alert>,
    last_raised: HashMap<(AlertKind, Option<AgentId>), DateTime<Utc>>,
}

/// Turns health snapshots into alerts, suppressing repeats inside a cooldown.
pub struct AlertManager {
    cooldown: Duration,
    capacity: usize,
    state: Mutex<AlertState>,
}

impl AlertManager {
    pub fn new(cooldown: std::time::Duration, capacity: usize) -> Self {
        Self {
            cooldown: Duration::from_std(cooldown).unwrap_or_else(|_| Duration::zero()),
            capacity,
            state: Mutex::new(AlertState {
                recent: VecDeque::new(),
                last_raised: HashMap::new(),
            }),
        }
    }

    /// Returns only the alerts newly raised by this snapshot.
    pub fn evaluate(
        &self,
        snapshot: &HealthSnapshot,
        restarts_exhausted: impl Fn(AgentId) -> bool,
    ) -> Vec<Alert> {
        let mut candidates = Vec::new();

        for agent in &snapshot.agents {
            if agent.status == crate::types::AgentStatus::Error {
                candidates.push((
                    AlertKind::AgentError,
                    Some(agent.agent_id),
                    format!(
                        "Agent {} ({}) is in error: {}",
                        agent.name,
                        agent.agent_id,
                        agent.last_error.as_deref().unwrap_or("unknown error")
                    ),
                ));
            }
            if agent.is_stalled {
                candidates.push((
                    AlertKind::AgentStalled,
                    Some(agent.agent_id),
                    format!(
                        "Agent {} ({}) has shown no activity for {:.1}s",
                        agent.name, agent.agent_id, agent.secs_since_activity
                    ),
                ));
            }
            if agent.needs_attention() && restarts_exhausted(agent.agent_id) {
                candidates.push((
                    AlertKind::RestartsExhausted,
                    Some(agent.agent_id),
                    format!(
                        "Agent {} ({}) exhausted its restart budget",
                        agent.name, agent.agent_id
                    ),
                ));
            }
        }

        if snapshot.overall_status == OverallHealth::Unhealthy {
            candidates.push((
                AlertKind::RuntimeUnhealthy,
                None,
                format!(
                    "Runtime unhealthy: {} erroring, {} stalled of {} agents",
                    snapshot.counts.error, snapshot.counts.stalled, snapshot.counts.total
                ),
            ));
        }

        let now = snapshot.timestamp;
        let mut state = self.lock();
        let mut raised = Vec::new();

        for (kind, agent_id, message) in candidates {
            let key = (kind, agent_id);
            if let Some(last) = state.last_raised.get(&key) {
                if now.signed_duration_since(*last) < self.cooldown {
                    continue;
                }
            }
            state.last_raised.insert(key, now);

            let alert = Alert {
                kind,
                severity: kind.severity(),
                agent_id,
                message,
                raised_at: now,
            };
            match alert.severity {
                AlertSeverity::Critical => log::error!("ALERT {:?}: {}", kind, alert.message),
                AlertSeverity::Warning => log::warn!("ALERT {:?}: {}", kind, alert.message),
            }

            state.recent.push_back(alert.clone());
            if state.recent.len() > self.capacity {
                state.recent.pop_front();
            }
            raised.push(alert);
        }

        raised
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<Alert> {
        self.lock().recent.iter().rev().take(limit).cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AlertState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
