use super::{AlertLevel, OperationKind, SystemHealthReport};
use prometheus::{
    exponential_buckets, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, IntGaugeVec, Opts, Registry,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

/// Prometheus view of the monitor's state
pub struct MetricsCollector {
    registry: Arc<Registry>,

    // Health
    pub system_status: IntGauge,
    pub component_status: IntGaugeVec,
    pub health_checks_total: IntCounter,

    // Performance metrics, labelled by metric key
    pub performance_value: GaugeVec,

    // Operation counters, labelled by counter name
    pub operations_total: IntCounterVec,

    // Alerts
    pub alerts_dispatched_total: IntCounterVec,
    pub alerts_suppressed_total: IntCounter,

    // Scheduler jobs
    pub job_duration_seconds: HistogramVec,
    pub job_failures_total: IntCounterVec,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Arc::new(Registry::new());

        let system_status = IntGauge::with_opts(Opts::new(
            "continuity_system_status",
            "Current system status (0 healthy, 1 degraded, 2 unhealthy)",
        ))?;
        registry.register(Box::new(system_status.clone()))?;

        let component_status = IntGaugeVec::new(
            Opts::new(
                "continuity_component_status",
                "Status of each monitored component (0 healthy, 1 degraded, 2 unhealthy)",
            ),
            &["component"],
        )?;
        registry.register(Box::new(component_status.clone()))?;

        let health_checks_total = IntCounter::with_opts(Opts::new(
            "continuity_health_checks_total",
            "Total number of health checks performed",
        ))?;
        registry.register(Box::new(health_checks_total.clone()))?;

        let performance_value = GaugeVec::new(
            Opts::new(
                "continuity_performance_metric_value",
                "Current value of each tracked performance metric",
            ),
            &["metric"],
        )?;
        registry.register(Box::new(performance_value.clone()))?;

        let operations_total = IntCounterVec::new(
            Opts::new(
                "continuity_operations_total",
                "Recorded operations by counter name",
            ),
            &["counter"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let alerts_dispatched_total = IntCounterVec::new(
            Opts::new(
                "continuity_alerts_dispatched_total",
                "Alerts accepted for dispatch by level",
            ),
            &["level"],
        )?;
        registry.register(Box::new(alerts_dispatched_total.clone()))?;

        let alerts_suppressed_total = IntCounter::with_opts(Opts::new(
            "continuity_alerts_suppressed_total",
            "Alerts suppressed by the rate limiter",
        ))?;
        registry.register(Box::new(alerts_suppressed_total.clone()))?;

        let job_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "continuity_job_duration_seconds",
                "Duration of scheduled monitoring jobs in seconds",
            )
            .buckets(exponential_buckets(0.001, 2.0, 15)?),
            &["job"],
        )?;
        registry.register(Box::new(job_duration_seconds.clone()))?;

        let job_failures_total = IntCounterVec::new(
            Opts::new(
                "continuity_job_failures_total",
                "Scheduled job runs that failed or panicked",
            ),
            &["job"],
        )?;
        registry.register(Box::new(job_failures_total.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            system_status,
            component_status,
            health_checks_total,
            performance_value,
            operations_total,
            alerts_dispatched_total,
            alerts_suppressed_total,
            job_duration_seconds,
            job_failures_total,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn update_health(&self, report: &SystemHealthReport) {
        self.health_checks_total.inc();
        self.system_status.set(report.overall_health.gauge_value());
        for (component, health) in report.components() {
            self.component_status
                .with_label_values(&[component.key()])
                .set(health.status.gauge_value());
        }
    }

    pub fn update_performance(&self, values: &HashMap<String, f64>) {
        for (metric, value) in values {
            self.performance_value
                .with_label_values(&[metric.as_str()])
                .set(*value);
        }
    }

    /// Mirror of [`OperationCounters::record`](super::OperationCounters::record)
    pub fn record_operation(&self, kind: OperationKind, successful: bool) {
        self.operations_total
            .with_label_values(&[kind.total_counter().as_str()])
            .inc();
        let outcome = if successful {
            kind.success_counter()
        } else {
            kind.failure_counter()
        };
        self.operations_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn record_alert(&self, level: AlertLevel) {
        self.alerts_dispatched_total
            .with_label_values(&[level.as_str()])
            .inc();
    }

    pub fn record_alert_suppressed(&self) {
        self.alerts_suppressed_total.inc();
    }

    pub fn record_job_failure(&self, job: &str) {
        self.job_failures_total.with_label_values(&[job]).inc();
    }

    /// Get metrics in Prometheus format
    pub fn gather_metrics(&self) -> String {
        use prometheus::TextEncoder;
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_else(|e| {
                error!("Failed to encode metrics: {}", e);
                String::new()
            })
    }
}

/// Job timing guard that records the run duration on drop
pub struct JobTimer {
    start: Instant,
    metrics: Arc<MetricsCollector>,
    job: &'static str,
}

impl JobTimer {
    pub fn new(metrics: Arc<MetricsCollector>, job: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metrics,
            job,
        }
    }
}

impl Drop for JobTimer {
    fn drop(&mut self) {
        self.metrics
            .job_duration_seconds
            .with_label_values(&[self.job])
            .observe(self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::{ComponentHealth, HealthStatus};

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().unwrap();
        assert_eq!(collector.system_status.get(), 0);
        assert_eq!(collector.health_checks_total.get(), 0);
    }

    #[test]
    fn test_health_update_sets_status_gauges() {
        let collector = MetricsCollector::new().unwrap();
        let report = SystemHealthReport::new(
            ComponentHealth::new(HealthStatus::Healthy, "ok"),
            ComponentHealth::new(HealthStatus::Degraded, "slow"),
            ComponentHealth::new(HealthStatus::Healthy, "ok"),
            ComponentHealth::new(HealthStatus::Healthy, "ok"),
        );
        collector.update_health(&report);

        assert_eq!(collector.system_status.get(), 1);
        assert_eq!(
            collector
                .component_status
                .with_label_values(&["documentation_sync"])
                .get(),
            1
        );
        assert_eq!(collector.health_checks_total.get(), 1);
    }

    #[test]
    fn test_operation_counters_mirror_names() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_operation(OperationKind::QualityGateExecution, true);
        collector.record_operation(OperationKind::QualityGateExecution, false);

        let get = |name: &str| collector.operations_total.with_label_values(&[name]).get();
        assert_eq!(get("quality_gate_executions_total"), 2);
        assert_eq!(get("quality_gate_executions_passed"), 1);
        assert_eq!(get("quality_gate_executions_failed"), 1);
    }

    #[test]
    fn test_job_timer_observes_on_drop() {
        let collector = Arc::new(MetricsCollector::new().unwrap());
        {
            let _timer = JobTimer::new(collector.clone(), "health_check");
        }
        assert_eq!(
            collector
                .job_duration_seconds
                .with_label_values(&["health_check"])
                .get_sample_count(),
            1
        );
    }

    #[test]
    fn test_text_exposition() {
        let collector = MetricsCollector::new().unwrap();
        let mut values = HashMap::new();
        values.insert("session_capture_time".to_string(), 7000.0);
        collector.update_performance(&values);
        collector.record_alert(AlertLevel::Critical);

        let text = collector.gather_metrics();
        assert!(text.contains("continuity_performance_metric_value{metric=\"session_capture_time\"} 7000"));
        assert!(text.contains("continuity_alerts_dispatched_total{level=\"CRITICAL\"} 1"));
    }
}
