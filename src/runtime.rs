use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::abilities::AbilityRegistry;
use crate::config::Config;
use crate::engine::agent::Agent;
use crate::engine::monitor::HealthMonitor;
use crate::engine::registry::AgentRegistry;
use crate::error::{Result, RuntimeError};
use crate::lifecycle::{Alert, AlertManager, HealthEvaluator, RestartPolicy};
use crate::metrics::{MetricEvent, MetricsSink, NoopMetrics};
use crate::storage::{InMemoryStateStore, JsonFileStateStore, StateStore};
use crate::types::{AgentConfig, AgentId, AgentStatusReport};

const ALERT_COOLDOWN: Duration = Duration::from_secs(300);
const ALERT_CAPACITY: usize = 100;

/// The single work loop owned by a running agent.
pub(crate) struct LoopHandle {
    pub loop_id: u64,
    pub join: JoinHandle<()>,
}

pub(crate) struct RuntimeInner {
    pub config: Config,
    pub abilities: AbilityRegistry,
    pub agents: AgentRegistry,
    pub loops: Mutex<HashMap<AgentId, LoopHandle>>,
    pub next_loop_id: AtomicU64,
    pub restarts: RestartPolicy,
    pub evaluator: HealthEvaluator,
    pub monitor: Arc<HealthMonitor>,
    pub alerts: AlertManager,
    pub metrics: Arc<dyn MetricsSink>,
    pub store: Arc<dyn StateStore>,
    pub persist_lock: tokio::sync::Mutex<()>,
}

/// Handle to an agent runtime. Clones share the same agents and loops.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Arc<RuntimeInner>,
}

#[derive(Default)]
pub struct RuntimeBuilder {
    config: Option<Config>,
    metrics: Option<Arc<dyn MetricsSink>>,
    store: Option<Arc<dyn StateStore>>,
    skip_builtins: bool,
}

impl RuntimeBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn without_builtins(mut self) -> Self {
        self.skip_builtins = true;
        self
    }

    pub fn build(self) -> Runtime {
        let config = self.config.unwrap_or_default();

        let store: Arc<dyn StateStore> = match (self.store, &config.storage.path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(JsonFileStateStore::new(path.clone())),
            (None, None) => Arc::new(InMemoryStateStore::new()),
        };
        let abilities = if self.skip_builtins {
            AbilityRegistry::new()
        } else {
            AbilityRegistry::with_builtins()
        };

        Runtime {
            inner: Arc::new(RuntimeInner {
                restarts: RestartPolicy::new(config.restart.clone()),
                evaluator: HealthEvaluator::new(config.monitor.max_stall()),
                config,
                abilities,
                agents: AgentRegistry::new(),
                loops: Mutex::new(HashMap::new()),
                next_loop_id: AtomicU64::new(1),
                monitor: Arc::new(HealthMonitor::new()),
                alerts: AlertManager::new(ALERT_COOLDOWN, ALERT_CAPACITY),
                metrics: self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics)),
                store,
                persist_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Register custom abilities here before creating agents that use them.
    pub fn abilities(&self) -> &AbilityRegistry {
        &self.inner.abilities
    }

    pub(crate) fn metrics(&self) -> &dyn MetricsSink {
        self.inner.metrics.as_ref()
    }

    pub(crate) fn agent(&self, agent_id: AgentId) -> Result<Arc<Agent>> {
        self.inner
            .agents
            .get(agent_id)
            .ok_or(RuntimeError::AgentNotFound(agent_id))
    }

    /// Direct handle to a live agent, for inspection.
    pub fn get_agent(&self, agent_id: AgentId) -> Option<Arc<Agent>> {
        self.inner.agents.get(agent_id)
    }

    pub fn create_agent(&self, config: AgentConfig) -> Result<AgentId> {
        if config.name.trim().is_empty() {
            return Err(RuntimeError::InvalidInput(
                "Agent name must not be empty".to_string(),
            ));
        }
        for ability in &config.abilities {
            if !self.inner.abilities.contains(ability) {
                return Err(RuntimeError::InvalidInput(format!(
                    "Ability not found: {}",
                    ability
                )));
            }
        }
        for skill in &config.skills {
            if !self.inner.abilities.contains(&skill.ability) {
                return Err(RuntimeError::InvalidInput(format!(
                    "Skill ability not found: {}",
                    skill.ability
                )));
            }
        }

        let id = AgentId::new_v4();
        let agent = Agent::new(id, config, &self.inner.config.agent)?;
        let name = agent.config.name.clone();
        let agent_type = agent.config.agent_type.clone();
        self.inner.agents.register(Arc::new(agent))?;

        self.metrics()
            .record(MetricEvent::counter("agent.created", 1.0).tag("agent_type", &agent_type));
        log::info!("Created agent {} ({}, type {})", name, id, agent_type);
        Ok(id)
    }

    pub fn get_agent_status(&self, agent_id: AgentId) -> Result<AgentStatusReport> {
        Ok(self.agent(agent_id)?.report())
    }

    pub fn list_agents(&self) -> Vec<AgentStatusReport> {
        self.inner
            .agents
            .list()
            .iter()
            .map(|agent| agent.report())
            .collect()
    }

    /// Stops the agent and unregisters it. The id is never reused.
    pub async fn delete_agent(&self, agent_id: AgentId) -> Result<()> {
        self.stop_agent(agent_id).await?;
        self.inner.agents.remove(agent_id);
        self.inner.restarts.reset(agent_id);
        log::info!("Deleted agent {}", agent_id);
        Ok(())
    }

    pub async fn persist(&self) -> Result<()> {
        let _guard = self.inner.persist_lock.lock().await;
        let snapshots: Vec<_> = self
            .inner
            .agents
            .list()
            .iter()
            .map(|agent| agent.snapshot())
            .collect();
        self.inner
            .store
            .save(&snapshots)
            .await
            .map_err(RuntimeError::Persistence)
    }

    /// Loads persisted agents. Ids already known to this runtime are skipped.
    /// Returns how many agents were restored.
    pub async fn restore(&self) -> Result<usize> {
        let persisted = self
            .inner
            .store
            .load()
            .await
            .map_err(RuntimeError::Persistence)?;

        let mut restored = 0;
        for image in persisted {
            let id = image.id;
            if self.inner.agents.contains(id) {
                log::debug!("Skipping restore of agent {}: id already present", id);
                continue;
            }
            match Agent::from_persisted(image, &self.inner.config.agent) {
                Ok(agent) => {
                    self.inner.agents.register(Arc::new(agent))?;
                    restored += 1;
                }
                Err(e) => log::warn!("Skipping restore of agent {}: {}", id, e),
            }
        }

        log::info!("Restored {} agents", restored);
        Ok(restored)
    }

    /// Restores persisted agents and starts the health monitor when enabled.
    pub async fn launch(&self) -> Result<usize> {
        let restored = self.restore().await?;
        if self.inner.config.monitor.enabled {
            self.start_monitor();
        }
        Ok(restored)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.stop_monitor().await;
        for agent in self.inner.agents.list() {
            if let Err(e) = self.stop_agent(agent.id).await {
                log::warn!("Failed to stop agent {} during shutdown: {}", agent.id, e);
            }
        }
        self.persist().await?;
        log::info!("Runtime shut down");
        Ok(())
    }

    /// Alerts raised by health sweeps, newest first.
    pub fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        self.inner.alerts.recent(limit)
    }
}
