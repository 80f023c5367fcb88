use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{Ability, AbilityContext, AbilityRegistry};
use crate::types::Task;

/// Returns the payload unchanged.
pub struct EchoAbility;

#[async_trait]
impl Ability for EchoAbility {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Returns the task payload"
    }

    async fn invoke(&self, _ctx: &AbilityContext, task: &Task) -> Result<Value> {
        Ok(task.payload.clone())
    }
}

pub struct PingAbility;

#[async_trait]
impl Ability for PingAbility {
    fn name(&self) -> &str {
        "ping"
    }

    fn description(&self) -> &str {
        "Liveness check reporting the agent's identity"
    }

    async fn invoke(&self, ctx: &AbilityContext, _task: &Task) -> Result<Value> {
        Ok(json!({
            "pong": true,
            "agent_id": ctx.agent_id(),
            "agent_name": ctx.agent_name(),
        }))
    }
}

/// Stores `payload.value` under `payload.key` in agent memory.
pub struct MemoryStoreAbility;

#[async_trait]
impl Ability for MemoryStoreAbility {
    fn name(&self) -> &str {
        "memory_store"
    }

    fn description(&self) -> &str {
        "Stores a value in agent memory"
    }

    async fn invoke(&self, ctx: &AbilityContext, task: &Task) -> Result<Value> {
        let key = memory_key(&task.payload)?;
        let value = task.payload.get("value").cloned().unwrap_or(Value::Null);
        ctx.remember(key.clone(), value);
        Ok(json!({ "stored": key }))
    }
}

pub struct MemoryRecallAbility;

#[async_trait]
impl Ability for MemoryRecallAbility {
    fn name(&self) -> &str {
        "memory_recall"
    }

    fn description(&self) -> &str {
        "Reads a value from agent memory"
    }

    async fn invoke(&self, ctx: &AbilityContext, task: &Task) -> Result<Value> {
        let key = memory_key(&task.payload)?;
        let value = ctx.recall(&key);
        Ok(json!({
            "key": key,
            "found": value.is_some(),
            "value": value.unwrap_or(Value::Null),
        }))
    }
}

fn memory_key(payload: &Value) -> Result<String> {
    payload
        .get("key")
        .and_then(|k| k.as_str())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Missing 'key' parameter"))
}

pub fn register_builtins(registry: &AbilityRegistry) {
    let builtins: Vec<Arc<dyn Ability>> = vec![
        Arc::new(EchoAbility),
        Arc::new(PingAbility),
        Arc::new(MemoryStoreAbility),
        Arc::new(MemoryRecallAbility),
    ];
    for ability in builtins {
        if let Err(e) = registry.register(ability) {
            log::error!("Failed to register built-in ability: {}", e);
        }
    }
}
