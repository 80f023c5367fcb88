use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::RuntimeError;

/// When a skill runs on its own. Skills without a schedule only run on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    Periodic { interval_secs: f64 },
    Once { at: DateTime<Utc> },
    // Seconds-first syntax of the `cron` crate, e.g. "0 */5 * * * *"
    Cron { expression: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillConfig {
    pub ability: String,
    #[serde(default)]
    pub schedule: Option<Schedule>,
}

impl SkillConfig {
    pub fn on_demand(ability: impl Into<String>) -> Self {
        Self {
            ability: ability.into(),
            schedule: None,
        }
    }

    pub fn periodic(ability: impl Into<String>, interval_secs: f64) -> Self {
        Self {
            ability: ability.into(),
            schedule: Some(Schedule::Periodic { interval_secs }),
        }
    }

    pub fn once(ability: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            ability: ability.into(),
            schedule: Some(Schedule::Once { at }),
        }
    }

    pub fn cron(ability: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            ability: ability.into(),
            schedule: Some(Schedule::Cron {
                expression: expression.into(),
            }),
        }
    }
}

/// Per-agent execution record of a scheduled ability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillState {
    pub ability: String,
    pub schedule: Option<Schedule>,
    pub experience: f64,
    pub last_executed: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub failure_count: u64,
    pub last_error: Option<String>,
    // Reference point for cron schedules that have never fired
    pub anchor: DateTime<Utc>,
    #[serde(skip)]
    cron: Option<CronSchedule>,
}

impl SkillState {
    pub fn new(config: &SkillConfig, anchor: DateTime<Utc>) -> Result<Self, RuntimeError> {
        let mut state = Self {
            ability: config.ability.clone(),
            schedule: config.schedule.clone(),
            experience: 0.0,
            last_executed: None,
            run_count: 0,
            failure_count: 0,
            last_error: None,
            anchor,
            cron: None,
        };
        state.rehydrate()?;
        Ok(state)
    }

    /// Validates the schedule and rebuilds the parsed cron expression, which
    /// is not persisted.
    pub fn rehydrate(&mut self) -> Result<(), RuntimeError> {
        self.cron = None;
        match &self.schedule {
            Some(Schedule::Periodic { interval_secs }) => {
                if !interval_secs.is_finite() || *interval_secs <= 0.0 {
                    return Err(RuntimeError::InvalidInput(format!(
                        "Skill {} has a non-positive interval",
                        self.ability
                    )));
                }
            }
            Some(Schedule::Cron { expression }) => {
                let parsed = CronSchedule::from_str(expression).map_err(|e| {
                    RuntimeError::InvalidInput(format!(
                        "Skill {} has an invalid cron expression '{}': {}",
                        self.ability, expression, e
                    ))
                })?;
                self.cron = Some(parsed);
            }
            Some(Schedule::Once { .. }) | None => {}
        }
        Ok(())
    }

    pub fn decay(&mut self, factor: f64) {
        self.experience *= factor;
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match &self.schedule {
            None => false,
            Some(Schedule::Periodic { interval_secs }) => match self.last_executed {
                None => true,
                Some(last) => {
                    let elapsed_ms = now.signed_duration_since(last).num_milliseconds();
                    elapsed_ms as f64 >= interval_secs * 1000.0
                }
            },
            Some(Schedule::Once { at }) => self.last_executed.is_none() && now >= *at,
            Some(Schedule::Cron { .. }) => {
                let since = self.last_executed.unwrap_or(self.anchor);
                self.cron
                    .as_ref()
                    .and_then(|schedule| schedule.after(&since).next())
                    .map(|next| next <= now)
                    .unwrap_or(false)
            }
        }
    }

    pub fn mark_started(&mut self, now: DateTime<Utc>) {
        self.last_executed = Some(now);
    }

    pub fn record_success(&mut self, reward: f64) {
        self.experience += reward;
        self.run_count += 1;
    }

    pub fn record_failure(&mut self, penalty: f64, error: impl Into<String>) {
        self.experience -= penalty;
        self.run_count += 1;
        self.failure_count += 1;
        self.last_error = Some(error.into());
    }

    pub fn report(&self) -> SkillReport {
        SkillReport {
            ability: self.ability.clone(),
            scheduled: self.schedule.is_some(),
            experience: self.experience,
            last_executed: self.last_executed,
            run_count: self.run_count,
            failure_count: self.failure_count,
            last_error: self.last_error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillReport {
    pub ability: String,
    pub scheduled: bool,
    pub experience: f64,
    pub last_executed: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub failure_count: u64,
    pub last_error: Option<String>,
}
