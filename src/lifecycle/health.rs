use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{AgentId, AgentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub agent_id: AgentId,
    pub name: String,
    pub status: AgentStatus,
    pub is_stalled: bool,
    pub uptime_secs: f64,
    pub secs_since_activity: f64,
    pub last_error: Option<String>,
}

impl AgentHealth {
    pub fn needs_attention(&self) -> bool {
        self.status == AgentStatus::Error || self.is_stalled
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCounts {
    pub total: usize,
    pub running: usize,
    pub paused: usize,
    pub stopped: usize,
    pub error: usize,
    pub stalled: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub overall_status: OverallHealth,
    pub counts: HealthCounts,
    pub agents: Vec<AgentHealth>,
    pub restarts_attempted: usize,
}

/// Inputs read from one agent under its own lock.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    pub agent_id: AgentId,
    pub name: String,
    pub status: AgentStatus,
    pub last_activity: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

pub struct HealthEvaluator {
    // None disables stall detection
    max_stall: Option<Duration>,
}

impl HealthEvaluator {
    pub fn new(max_stall: impl Into<Option<Duration>>) -> Self {
        Self {
            max_stall: max_stall.into(),
        }
    }

    pub fn assess(&self, probe: HealthProbe, now: DateTime<Utc>) -> AgentHealth {
        let secs_since_activity = seconds_between(probe.last_activity, now);
        let is_stalled = match self.max_stall {
            Some(max_stall) => {
                matches!(
                    probe.status,
                    AgentStatus::Running | AgentStatus::Initializing
                ) && secs_since_activity > max_stall.as_secs_f64()
            }
            None => false,
        };

        let uptime_secs = match probe.started_at {
            Some(started) if probe.status.is_active() => seconds_between(started, now),
            _ => 0.0,
        };

        AgentHealth {
            agent_id: probe.agent_id,
            name: probe.name,
            status: probe.status,
            is_stalled,
            uptime_secs,
            secs_since_activity,
            last_error: probe.last_error,
        }
    }

    pub fn aggregate(agents: &[AgentHealth]) -> (HealthCounts, OverallHealth) {
        let mut counts = HealthCounts {
            total: agents.len(),
            ..HealthCounts::default()
        };
        let mut troubled = 0;

        for agent in agents {
            match agent.status {
                AgentStatus::Running => counts.running += 1,
                AgentStatus::Paused => counts.paused += 1,
                AgentStatus::Stopped => counts.stopped += 1,
                AgentStatus::Error => counts.error += 1,
                AgentStatus::Created | AgentStatus::Initializing => {}
            }
            if agent.is_stalled {
                counts.stalled += 1;
            }
            if agent.needs_attention() {
                troubled += 1;
            }
        }

        let overall = if troubled == 0 {
            OverallHealth::Healthy
        } else if troubled * 2 > counts.total {
            OverallHealth::Unhealthy
        } else {
            OverallHealth::Degraded
        };

        (counts, overall)
    }
}

fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let millis = later.signed_duration_since(earlier).num_milliseconds().max(0);
    millis as f64 / 1000.0
}
