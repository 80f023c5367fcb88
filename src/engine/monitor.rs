use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::lifecycle::{HealthEvaluator, HealthSnapshot, RestartDecision};
use crate::metrics::MetricEvent;
use crate::runtime::{Runtime, RuntimeInner};

/// Background sweeper state. Owned by the runtime; the sweeping task only
/// holds a weak reference back to it.
pub struct HealthMonitor {
    running: AtomicBool,
    interrupt: Notify,
    handle: Mutex<Option<JoinHandle<()>>>,
    last: RwLock<Option<HealthSnapshot>>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            interrupt: Notify::new(),
            handle: Mutex::new(None),
            last: RwLock::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn publish(&self, snapshot: HealthSnapshot) {
        *self.last.write().unwrap_or_else(|e| e.into_inner()) = Some(snapshot);
    }

    fn latest(&self) -> Option<HealthSnapshot> {
        self.last.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Runtime {
    /// Starts periodic health sweeps. Returns whether the monitor is running.
    pub fn start_monitor(&self) -> bool {
        let monitor = &self.inner.monitor;
        let Some(interval) = self.inner.config.monitor.interval() else {
            log::warn!(
                "Health monitor interval is {}s, periodic sweeps disabled",
                self.inner.config.monitor.interval_secs
            );
            return false;
        };
        if monitor.running.swap(true, Ordering::SeqCst) {
            return true;
        }

        let join = tokio::spawn(monitor_loop(
            Arc::downgrade(&self.inner),
            monitor.clone(),
            interval,
        ));
        *monitor.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(join);
        log::info!("Health monitor started ({:?} interval)", interval);
        true
    }

    pub async fn stop_monitor(&self) {
        let monitor = &self.inner.monitor;
        if !monitor.running.swap(false, Ordering::SeqCst) {
            return;
        }
        monitor.interrupt.notify_one();

        let handle = monitor
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::error!("Health monitor task failed: {}", e);
            }
        }
        log::info!("Health monitor stopped");
    }

    pub fn is_monitor_running(&self) -> bool {
        self.inner.monitor.is_running()
    }

    /// Last published snapshot; `None` before the first sweep.
    pub fn health_snapshot(&self) -> Option<HealthSnapshot> {
        self.inner.monitor.latest()
    }

    /// One full sweep: assess every agent, restart the ones in trouble when
    /// allowed, raise alerts and publish the snapshot.
    pub async fn run_health_check(&self) -> HealthSnapshot {
        let now = Utc::now();
        let agents = self.inner.agents.list();
        let health: Vec<_> = agents
            .iter()
            .map(|agent| self.inner.evaluator.assess(agent.probe(), now))
            .collect();
        let (counts, overall_status) = HealthEvaluator::aggregate(&health);

        let auto_restart = self.inner.config.monitor.auto_restart;
        let mut restarts_attempted = 0;
        if auto_restart {
            for agent in health.iter().filter(|a| a.needs_attention()) {
                match self.inner.restarts.acquire(agent.agent_id, Instant::now()) {
                    RestartDecision::Granted { attempt } => {
                        restarts_attempted += 1;
                        log::info!(
                            "Restarting agent {} ({}), attempt {}",
                            agent.name,
                            agent.agent_id,
                            attempt
                        );
                        if let Err(e) = self.restart_agent(agent.agent_id).await {
                            log::error!("Restart of agent {} failed: {}", agent.agent_id, e);
                        }
                    }
                    RestartDecision::Backoff(wait) => {
                        log::debug!(
                            "Agent {} restart deferred for {:?}",
                            agent.agent_id,
                            wait
                        );
                    }
                    RestartDecision::Exhausted => {
                        log::warn!(
                            "Agent {} ({}) needs attention but its restart budget is spent",
                            agent.name,
                            agent.agent_id
                        );
                    }
                }
            }
        }

        let snapshot = HealthSnapshot {
            timestamp: now,
            overall_status,
            counts,
            agents: health,
            restarts_attempted,
        };

        let restarts = &self.inner.restarts;
        let alerts = self
            .inner
            .alerts
            .evaluate(&snapshot, |id| auto_restart && restarts.is_exhausted(id));
        for alert in &alerts {
            self.metrics().record(
                MetricEvent::counter("alerts.raised", 1.0).tag("kind", format!("{:?}", alert.kind)),
            );
        }

        let counts = &snapshot.counts;
        for (name, value) in [
            ("runtime.agents.total", counts.total),
            ("runtime.agents.running", counts.running),
            ("runtime.agents.error", counts.error),
            ("runtime.agents.stalled", counts.stalled),
        ] {
            self.metrics().record(MetricEvent::gauge(name, value as f64));
        }

        log::debug!(
            "Health sweep: {:?}, {} agents ({} running, {} error, {} stalled), {} restarts",
            snapshot.overall_status,
            counts.total,
            counts.running,
            counts.error,
            counts.stalled,
            restarts_attempted
        );

        self.inner.monitor.publish(snapshot.clone());
        snapshot
    }
}

async fn monitor_loop(runtime: Weak<RuntimeInner>, monitor: Arc<HealthMonitor>, interval: Duration) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = monitor.interrupt.notified() => {}
        }
        if !monitor.is_running() {
            break;
        }
        let Some(inner) = runtime.upgrade() else {
            break;
        };
        Runtime { inner }.run_health_check().await;
    }
    log::debug!("Health monitor loop exited");
}
