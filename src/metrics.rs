//! Fire-and-forget metrics sink.
//!
//! The runtime reports counters, gauges and timers through [`MetricsSink`].
//! Recording never blocks the caller and never fails.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum MetricKind {
    Counter(f64),
    Gauge(f64),
    Timer(Duration),
}

#[derive(Debug, Clone)]
pub struct MetricEvent {
    pub name: String,
    pub kind: MetricKind,
    pub tags: Vec<(String, String)>,
}

impl MetricEvent {
    pub fn counter(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, MetricKind::Counter(value))
    }

    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, MetricKind::Gauge(value))
    }

    pub fn timer(name: impl Into<String>, elapsed: Duration) -> Self {
        Self::new(name, MetricKind::Timer(elapsed))
    }

    fn new(name: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            kind,
            tags: Vec::new(),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.tags.push((key.into(), value.to_string()));
        self
    }
}

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricEvent);
}

#[derive(Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record(&self, _event: MetricEvent) {}
}

/// Writes every event to the log at debug level.
#[derive(Debug, Default)]
pub struct LogMetrics;

impl MetricsSink for LogMetrics {
    fn record(&self, event: MetricEvent) {
        log::debug!("metric {} {:?} {:?}", event.name, event.kind, event.tags);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimerStats {
    pub count: u64,
    pub total: Duration,
    pub max: Duration,
}

impl TimerStats {
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / self.count as u32
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub counters: HashMap<String, f64>,
    pub gauges: HashMap<String, f64>,
    pub timers: HashMap<String, TimerStats>,
}

/// Aggregates events by name; tags are ignored for aggregation.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    summary: Mutex<MetricsSummary>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> f64 {
        self.lock().counters.get(name).copied().unwrap_or(0.0)
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.lock().gauges.get(name).copied()
    }

    pub fn timer(&self, name: &str) -> TimerStats {
        self.lock().timers.get(name).cloned().unwrap_or_default()
    }

    pub fn summary(&self) -> MetricsSummary {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsSummary> {
        self.summary.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record(&self, event: MetricEvent) {
        let mut summary = self.lock();
        match event.kind {
            MetricKind::Counter(value) => {
                *summary.counters.entry(event.name).or_default() += value;
            }
            MetricKind::Gauge(value) => {
                summary.gauges.insert(event.name, value);
            }
            MetricKind::Timer(elapsed) => {
                let stats = summary.timers.entry(event.name).or_default();
                stats.count += 1;
                stats.total += elapsed;
                stats.max = stats.max.max(elapsed);
            }
        }
    }
}
