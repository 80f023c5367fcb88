pub mod builtin;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::engine::agent::Agent;
use crate::error::RuntimeError;
use crate::types::{AgentId, LlmConfig, Task, TaskId};

/// What an ability sees of the agent running it.
///
/// The context never exposes the agent's lock; memory access goes through
/// short-lived helper calls.
#[derive(Clone)]
pub struct AbilityContext {
    agent: Arc<Agent>,
    task_id: Option<TaskId>,
}

impl AbilityContext {
    pub(crate) fn new(agent: Arc<Agent>, task_id: Option<TaskId>) -> Self {
        Self { agent, task_id }
    }

    pub fn agent_id(&self) -> AgentId {
        self.agent.id
    }

    pub fn agent_name(&self) -> &str {
        &self.agent.config.name
    }

    pub fn agent_type(&self) -> &str {
        &self.agent.config.agent_type
    }

    pub fn llm(&self) -> &LlmConfig {
        &self.agent.config.llm
    }

    /// `None` for scheduled skill runs.
    pub fn task_id(&self) -> Option<TaskId> {
        self.task_id
    }

    pub fn remember(&self, key: impl Into<String>, value: Value) {
        self.agent.with_state(|state| state.memory.insert(key.into(), value));
    }

    pub fn recall(&self, key: &str) -> Option<Value> {
        self.agent.with_state(|state| state.memory.get(key))
    }

    pub fn forget(&self, key: &str) -> Option<Value> {
        self.agent.with_state(|state| state.memory.remove(key))
    }
}

#[async_trait]
pub trait Ability: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    async fn invoke(&self, ctx: &AbilityContext, task: &Task) -> Result<Value>;
}

type AbilityFn = dyn Fn(&AbilityContext, &Task) -> Result<Value> + Send + Sync;

/// Adapts a plain closure into an [`Ability`].
pub struct FnAbility {
    name: String,
    description: String,
    func: Box<AbilityFn>,
}

impl FnAbility {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(&AbilityContext, &Task) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl Ability for FnAbility {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, ctx: &AbilityContext, task: &Task) -> Result<Value> {
        (self.func)(ctx, task)
    }
}

/// Name → ability table. Written at startup, read on every dispatch.
#[derive(Default)]
pub struct AbilityRegistry {
    abilities: RwLock<HashMap<String, Arc<dyn Ability>>>,
}

impl AbilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let registry = Self::new();
        builtin::register_builtins(&registry);
        registry
    }

    pub fn register(&self, ability: Arc<dyn Ability>) -> Result<(), RuntimeError> {
        let name = ability.name().trim().to_string();
        if name.is_empty() {
            return Err(RuntimeError::InvalidInput(
                "Ability name must not be empty".to_string(),
            ));
        }

        let mut abilities = self.abilities.write().unwrap_or_else(|e| e.into_inner());
        if abilities.insert(name.clone(), ability).is_some() {
            log::warn!("Ability {} re-registered, replacing previous implementation", name);
        } else {
            log::debug!("Registered ability {}", name);
        }
        Ok(())
    }

    pub fn register_fn<F>(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        func: F,
    ) -> Result<(), RuntimeError>
    where
        F: Fn(&AbilityContext, &Task) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnAbility::new(name, description, func)))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Ability>> {
        self.abilities
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.abilities
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .abilities
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
