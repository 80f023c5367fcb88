use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RestartConfig;
use crate::types::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Granted { attempt: u32 },
    Backoff(Duration),
    Exhausted,
}

#[derive(Debug, Default, Clone, Copy)]
struct RestartRecord {
    attempts: u32,
    not_before: Option<Instant>,
}

/// Restart budget shared by the monitor and the work loop, so the two
/// recovery paths cannot multiply each other's attempts.
pub struct RestartPolicy {
    config: RestartConfig,
    records: Mutex<HashMap<AgentId, RestartRecord>>,
}

impl RestartPolicy {
    pub fn new(config: RestartConfig) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Delay that must pass after attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.config.delay().as_secs_f64();
        let factor = self.config.backoff_multiplier.max(1.0).powi(attempt as i32);
        let ceiling = self.config.max_delay().as_secs_f64().max(base);
        Duration::from_secs_f64((base * factor).min(ceiling))
    }

    /// Books an immediate attempt if the budget and backoff allow it.
    pub fn acquire(&self, agent_id: AgentId, now: Instant) -> RestartDecision {
        let mut records = self.lock();
        let record = records.entry(agent_id).or_default();

        if record.attempts >= self.config.max_attempts {
            return RestartDecision::Exhausted;
        }
        if let Some(not_before) = record.not_before {
            if now < not_before {
                return RestartDecision::Backoff(not_before - now);
            }
        }

        let attempt = record.attempts;
        record.attempts += 1;
        record.not_before = Some(now + self.delay_for(attempt));
        RestartDecision::Granted {
            attempt: attempt + 1,
        }
    }

    /// Books a deferred attempt and returns how long to wait before making it.
    pub fn schedule(&self, agent_id: AgentId, now: Instant) -> Option<Duration> {
        let mut records = self.lock();
        let record = records.entry(agent_id).or_default();

        if record.attempts >= self.config.max_attempts {
            return None;
        }

        let backoff = self.delay_for(record.attempts);
        let pending = record
            .not_before
            .map(|not_before| not_before.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO);
        let wait = backoff.max(pending);

        record.attempts += 1;
        record.not_before = Some(now + wait);
        Some(wait)
    }

    pub fn attempts(&self, agent_id: AgentId) -> u32 {
        self.lock()
            .get(&agent_id)
            .map(|record| record.attempts)
            .unwrap_or(0)
    }

    pub fn is_exhausted(&self, agent_id: AgentId) -> bool {
        self.attempts(agent_id) >= self.config.max_attempts
    }

    /// Called after the agent proves healthy again.
    pub fn reset(&self, agent_id: AgentId) {
        self.lock().remove(&agent_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<AgentId, RestartRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}
