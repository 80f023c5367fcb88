use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, RuntimeError};

/// Read-only key lookup. Keys are dotted, e.g. `monitor.interval_secs`.
pub trait ConfigSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// `monitor.interval_secs` is read from `ADEPT_MONITOR_INTERVAL_SECS`.
#[derive(Debug, Clone, Default)]
pub struct EnvSource;

impl EnvSource {
    pub fn var_name(key: &str) -> String {
        format!("ADEPT_{}", key.replace('.', "_").to_uppercase())
    }
}

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(Self::var_name(key)).ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TomlSource {
    values: HashMap<String, String>,
}

impl TomlSource {
    pub fn parse(content: &str) -> Result<Self> {
        let table: toml::Table = content
            .parse()
            .map_err(|e: toml::de::Error| RuntimeError::Config(e.to_string()))?;
        let mut values = HashMap::new();
        flatten_table("", &table, &mut values);
        Ok(Self { values })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }
}

fn flatten_table(prefix: &str, table: &toml::Table, out: &mut HashMap<String, String>) {
    for (key, value) in table {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            toml::Value::Table(nested) => flatten_table(&full_key, nested, out),
            toml::Value::String(s) => {
                out.insert(full_key, s.clone());
            }
            toml::Value::Integer(i) => {
                out.insert(full_key, i.to_string());
            }
            toml::Value::Float(f) => {
                out.insert(full_key, f.to_string());
            }
            toml::Value::Boolean(b) => {
                out.insert(full_key, b.to_string());
            }
            other => {
                log::warn!("Ignoring unsupported config value for {}: {}", full_key, other);
            }
        }
    }
}

impl ConfigSource for TomlSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// First source that knows a key wins.
#[derive(Default)]
pub struct LayeredSource {
    layers: Vec<Box<dyn ConfigSource>>,
}

impl LayeredSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: impl ConfigSource + 'static) -> Self {
        self.layers.push(Box::new(source));
        self
    }
}

impl ConfigSource for LayeredSource {
    fn get(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub restart: RestartConfig,
    pub agent: AgentDefaults,
    pub skills: SkillTuning,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub interval_secs: f64,
    pub max_stall_secs: f64,
    pub auto_restart: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    pub from_loop: bool,
    pub delay_secs: f64,
    pub max_attempts: u32,
    pub backoff_multiplier: f64,
    pub max_delay_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefaults {
    pub max_task_history: usize,
    pub max_task_results: usize,
    pub max_queue_size: usize,
    pub idle_poll_secs: f64,
    pub stop_timeout_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillTuning {
    pub xp_decay: f64,
    pub success_reward: f64,
    pub failure_penalty: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig {
                enabled: true,
                interval_secs: 30.0,
                max_stall_secs: 300.0,
                auto_restart: true,
            },
            restart: RestartConfig {
                from_loop: false,
                delay_secs: 5.0,
                max_attempts: 5,
                backoff_multiplier: 2.0,
                max_delay_secs: 300.0,
            },
            agent: AgentDefaults {
                max_task_history: 100,
                max_task_results: 1000,
                max_queue_size: 1000,
                idle_poll_secs: 1.0,
                stop_timeout_secs: 10.0,
            },
            skills: SkillTuning {
                xp_decay: 0.999,
                success_reward: 1.0,
                failure_penalty: 2.0,
            },
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_source(&EnvSource)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::from_source(&TomlSource::parse(content)?)
    }

    /// Loads `path`, letting environment variables override file values.
    pub fn from_file_with_env(path: &Path) -> Result<Self> {
        let source = LayeredSource::new()
            .with(EnvSource)
            .with(TomlSource::from_file(path)?);
        Self::from_source(&source)
    }

    pub fn from_source(source: &dyn ConfigSource) -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            monitor: MonitorConfig {
                enabled: read_bool(source, "monitor.enabled", d.monitor.enabled)?,
                interval_secs: read(source, "monitor.interval_secs", d.monitor.interval_secs)?,
                max_stall_secs: read(source, "monitor.max_stall_secs", d.monitor.max_stall_secs)?,
                auto_restart: read_bool(source, "monitor.auto_restart", d.monitor.auto_restart)?,
            },
            restart: RestartConfig {
                from_loop: read_bool(source, "restart.from_loop", d.restart.from_loop)?,
                delay_secs: read(source, "restart.delay_secs", d.restart.delay_secs)?,
                max_attempts: read(source, "restart.max_attempts", d.restart.max_attempts)?,
                backoff_multiplier: read(
                    source,
                    "restart.backoff_multiplier",
                    d.restart.backoff_multiplier,
                )?,
                max_delay_secs: read(source, "restart.max_delay_secs", d.restart.max_delay_secs)?,
            },
            agent: AgentDefaults {
                max_task_history: read(
                    source,
                    "agent.max_task_history",
                    d.agent.max_task_history,
                )?,
                max_task_results: read(
                    source,
                    "agent.max_task_results",
                    d.agent.max_task_results,
                )?,
                max_queue_size: read(source, "agent.max_queue_size", d.agent.max_queue_size)?,
                idle_poll_secs: read(source, "agent.idle_poll_secs", d.agent.idle_poll_secs)?,
                stop_timeout_secs: read(
                    source,
                    "agent.stop_timeout_secs",
                    d.agent.stop_timeout_secs,
                )?,
            },
            skills: SkillTuning {
                xp_decay: read(source, "skills.xp_decay", d.skills.xp_decay)?,
                success_reward: read(source, "skills.success_reward", d.skills.success_reward)?,
                failure_penalty: read(source, "skills.failure_penalty", d.skills.failure_penalty)?,
            },
            storage: StorageConfig {
                path: source.get("storage.path").map(PathBuf::from),
            },
        })
    }
}

impl MonitorConfig {
    /// `None` when periodic sweeps are disabled (interval ≤ 0).
    pub fn interval(&self) -> Option<Duration> {
        positive_secs(self.interval_secs)
    }

    /// `None` turns stall detection off (threshold ≤ 0).
    pub fn max_stall(&self) -> Option<Duration> {
        positive_secs(self.max_stall_secs)
    }
}

impl RestartConfig {
    pub fn delay(&self) -> Duration {
        positive_secs(self.delay_secs).unwrap_or(Duration::ZERO)
    }

    pub fn max_delay(&self) -> Duration {
        positive_secs(self.max_delay_secs).unwrap_or(Duration::ZERO)
    }
}

impl AgentDefaults {
    pub fn idle_poll(&self) -> Duration {
        positive_secs(self.idle_poll_secs).unwrap_or(Duration::from_millis(100))
    }

    /// `None` means a stop waits for the loop indefinitely (timeout ≤ 0).
    pub fn stop_timeout(&self) -> Option<Duration> {
        positive_secs(self.stop_timeout_secs)
    }
}

fn positive_secs(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

fn read<T>(source: &dyn ConfigSource, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match source.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| RuntimeError::Config(format!("Invalid value '{}' for {}: {}", raw, key, e))),
        None => Ok(default),
    }
}

fn read_bool(source: &dyn ConfigSource, key: &str, default: bool) -> Result<bool> {
    match source.get(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(RuntimeError::Config(format!(
                "Invalid boolean '{}' for {}",
                raw, key
            ))),
        },
        None => Ok(default),
    }
}
