use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub const SESSION_CAPTURE_TIME: &str = "session_capture_time";
pub const DOCUMENTATION_SYNC_TIME: &str = "documentation_sync_time";
pub const CONTEXT_RECOVERY_TIME: &str = "context_recovery_time";
pub const QUALITY_GATE_EXECUTION_TIME: &str = "quality_gate_execution_time";
pub const VALIDATION_TIME: &str = "validation_time";

pub const ALERTS_TRIGGERED: &str = "alerts_triggered";

/// Running statistics for one named performance metric
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceMetric {
    pub name: String,
    pub unit: String,
    pub threshold: f64,
    pub current_value: f64,
    pub average_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub sample_count: u64,
}

impl PerformanceMetric {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, threshold: f64) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            threshold,
            current_value: 0.0,
            average_value: 0.0,
            min_value: 0.0,
            max_value: 0.0,
            sample_count: 0,
        }
    }

    pub fn update_value(&mut self, value: f64) {
        self.current_value = value;
        self.sample_count += 1;

        if self.sample_count == 1 {
            self.min_value = value;
            self.max_value = value;
        } else {
            self.min_value = self.min_value.min(value);
            self.max_value = self.max_value.max(value);
        }

        // Incremental mean, no stored sum
        let n = self.sample_count as f64;
        self.average_value = ((self.average_value * (n - 1.0)) + value) / n;
    }

    pub fn exceeds_threshold(&self) -> bool {
        self.sample_count > 0 && self.current_value > self.threshold
    }
}

/// Table of performance metrics, created once at startup. Updates lock a
/// single shard of the map, never the whole table.
#[derive(Debug, Default)]
pub struct MetricTracker {
    metrics: DashMap<String, PerformanceMetric>,
}

impl MetricTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker preloaded with the metrics the monitor knows about
    pub fn with_default_metrics() -> Self {
        let tracker = Self::new();
        tracker.register(
            SESSION_CAPTURE_TIME,
            PerformanceMetric::new("Session Capture Time", "ms", 5000.0),
        );
        tracker.register(
            DOCUMENTATION_SYNC_TIME,
            PerformanceMetric::new("Documentation Sync Time", "ms", 10000.0),
        );
        tracker.register(
            CONTEXT_RECOVERY_TIME,
            PerformanceMetric::new("Context Recovery Time", "ms", 30000.0),
        );
        tracker.register(
            QUALITY_GATE_EXECUTION_TIME,
            PerformanceMetric::new("Quality Gate Execution Time", "ms", 15000.0),
        );
        tracker.register(
            VALIDATION_TIME,
            PerformanceMetric::new("Validation Time", "ms", 10000.0),
        );
        tracker
    }

    pub fn register(&self, key: &str, metric: PerformanceMetric) {
        self.metrics.insert(key.to_string(), metric);
    }

    /// Record a sample. Returns false when the metric is unknown.
    pub fn update_value(&self, key: &str, value: f64) -> bool {
        match self.metrics.get_mut(key) {
            Some(mut metric) => {
                metric.update_value(value);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<PerformanceMetric> {
        self.metrics.get(key).map(|m| m.clone())
    }

    pub fn snapshot(&self) -> HashMap<String, PerformanceMetric> {
        self.metrics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn current_values(&self) -> HashMap<String, f64> {
        self.metrics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().current_value))
            .collect()
    }
}

/// Operations whose outcome is counted by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    SessionCapture,
    DocumentationSync,
    QualityGateExecution,
    ContextRecovery,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::SessionCapture,
        OperationKind::DocumentationSync,
        OperationKind::QualityGateExecution,
        OperationKind::ContextRecovery,
    ];

    fn counter_prefix(&self) -> &'static str {
        match self {
            OperationKind::SessionCapture => "session_captures",
            OperationKind::DocumentationSync => "documentation_syncs",
            OperationKind::QualityGateExecution => "quality_gate_executions",
            OperationKind::ContextRecovery => "context_recoveries",
        }
    }

    fn success_label(&self) -> &'static str {
        match self {
            OperationKind::QualityGateExecution => "passed",
            _ => "successful",
        }
    }

    pub fn total_counter(&self) -> String {
        format!("{}_total", self.counter_prefix())
    }

    pub fn success_counter(&self) -> String {
        format!("{}_{}", self.counter_prefix(), self.success_label())
    }

    pub fn failure_counter(&self) -> String {
        format!("{}_failed", self.counter_prefix())
    }

    pub fn success_rate_key(&self) -> &'static str {
        match self {
            OperationKind::SessionCapture => "session_capture_success_rate",
            OperationKind::DocumentationSync => "documentation_sync_success_rate",
            OperationKind::QualityGateExecution => "quality_gate_success_rate",
            OperationKind::ContextRecovery => "context_recovery_success_rate",
        }
    }

    /// Duration metric fed by this operation
    pub fn metric_key(&self) -> &'static str {
        match self {
            OperationKind::SessionCapture => SESSION_CAPTURE_TIME,
            OperationKind::DocumentationSync => DOCUMENTATION_SYNC_TIME,
            OperationKind::QualityGateExecution => QUALITY_GATE_EXECUTION_TIME,
            OperationKind::ContextRecovery => CONTEXT_RECOVERY_TIME,
        }
    }
}

/// Named counters. The set of names is fixed at construction, so increments
/// only touch an atomic and never take a lock.
#[derive(Debug)]
pub struct OperationCounters {
    counters: HashMap<String, AtomicU64>,
}

impl Default for OperationCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationCounters {
    pub fn new() -> Self {
        let mut counters = HashMap::new();
        for kind in OperationKind::ALL {
            counters.insert(kind.total_counter(), AtomicU64::new(0));
            counters.insert(kind.success_counter(), AtomicU64::new(0));
            counters.insert(kind.failure_counter(), AtomicU64::new(0));
        }
        counters.insert(ALERTS_TRIGGERED.to_string(), AtomicU64::new(0));
        Self { counters }
    }

    pub fn increment(&self, name: &str) {
        if let Some(counter) = self.counters.get(name) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn record(&self, kind: OperationKind, successful: bool) {
        self.increment(&kind.total_counter());
        if successful {
            self.increment(&kind.success_counter());
        } else {
            self.increment(&kind.failure_counter());
        }
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counters
            .iter()
            .map(|(name, value)| (name.clone(), value.load(Ordering::Relaxed)))
            .collect()
    }

    /// successful / total per operation, omitting operations never recorded
    pub fn success_rates(&self) -> HashMap<String, f64> {
        OperationKind::ALL
            .iter()
            .filter_map(|kind| {
                let total = self.get(&kind.total_counter());
                if total == 0 {
                    return None;
                }
                let successful = self.get(&kind.success_counter());
                Some((
                    kind.success_rate_key().to_string(),
                    successful as f64 / total as f64,
                ))
            })
            .collect()
    }
}
