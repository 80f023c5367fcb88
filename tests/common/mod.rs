//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use adept::{Ability, AbilityContext, AgentId, AgentStatus, Config, Runtime, Task};

/// Defaults tuned for tests: no background monitor, short parks.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.monitor.enabled = false;
    config.agent.idle_poll_secs = 0.02;
    config.agent.stop_timeout_secs = 2.0;
    config.restart.delay_secs = 0.01;
    config.restart.max_delay_secs = 0.05;
    config
}

pub fn runtime_with(config: Config) -> Runtime {
    Runtime::builder().config(config).build()
}

pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        if Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_for_status(runtime: &Runtime, agent_id: AgentId, status: AgentStatus) {
    wait_until(&format!("agent status {}", status), || {
        runtime
            .get_agent_status(agent_id)
            .map(|report| report.status == status)
            .unwrap_or(false)
    })
    .await
}

/// Returns the payload and remembers every payload it saw, in call order.
pub struct Recorder {
    name: String,
    pub seen: Arc<Mutex<Vec<Value>>>,
}

impl Recorder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Ability for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _ctx: &AbilityContext, task: &Task) -> Result<Value> {
        self.seen.lock().unwrap().push(task.payload.clone());
        Ok(task.payload.clone())
    }
}

/// Blocks until the test hands out a permit.
pub struct Gate {
    name: String,
    pub permits: Arc<Semaphore>,
}

impl Gate {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            permits: Arc::new(Semaphore::new(0)),
        }
    }
}

#[async_trait]
impl Ability for Gate {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _ctx: &AbilityContext, task: &Task) -> Result<Value> {
        self.permits.acquire().await?.forget();
        Ok(task.payload.clone())
    }
}

pub struct Boom;

#[async_trait]
impl Ability for Boom {
    fn name(&self) -> &str {
        "boom"
    }

    async fn invoke(&self, _ctx: &AbilityContext, _task: &Task) -> Result<Value> {
        Err(anyhow!("kaboom"))
    }
}

pub struct Panicker;

#[async_trait]
impl Ability for Panicker {
    fn name(&self) -> &str {
        "panicker"
    }

    async fn invoke(&self, _ctx: &AbilityContext, _task: &Task) -> Result<Value> {
        panic!("ability exploded");
    }
}

/// Tracks how many invocations overlap.
#[derive(Default)]
pub struct Probe {
    active: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
}

#[async_trait]
impl Ability for Probe {
    fn name(&self) -> &str {
        "probe"
    }

    async fn invoke(&self, _ctx: &AbilityContext, _task: &Task) -> Result<Value> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(3)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Null)
    }
}
