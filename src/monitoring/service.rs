//! The monitor itself: owns the current status, the metric table, the
//! counters and the event log, and turns what the checks find into alerts.

use super::{
    build_channels, Alert, AlertDispatcher, AlertLevel, AlertStatistics, CleanupSummary,
    Component, DispatchOutcome, EmailSender, EventLog, HealthChecker, HealthStatus,
    MetricTracker, MetricsCollector, MonitoringEvent, MonitoringEventType, OperationCounters,
    OperationKind, PerformanceReport, Probes, SystemHealthReport, ALERTS_TRIGGERED,
    MONITOR_COMPONENT,
};
use crate::config::{Config, MonitoringConfig};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Window scanned for ERROR events by the failure pattern check
pub const FAILURE_PATTERN_WINDOW_MINUTES: i64 = 10;

pub const SYSTEM_HEALTH_CRITICAL: &str = "System Health Critical";
pub const SYSTEM_HEALTH_DEGRADED: &str = "System Health Degraded";
pub const PERFORMANCE_THRESHOLD_EXCEEDED: &str = "Performance Threshold Exceeded";
pub const EXTENDED_SYSTEM_DEGRADATION: &str = "Extended System Degradation";
pub const LOW_SUCCESS_RATE: &str = "Low Success Rate";
pub const FAILURE_PATTERN_DETECTED: &str = "Failure Pattern Detected";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: HealthStatus,
    pub last_health_check: Option<DateTime<Utc>>,
    /// Set on the transition out of HEALTHY, cleared on the way back
    pub degraded_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitoringDashboard {
    pub system_status: HealthStatus,
    pub last_health_check: Option<DateTime<Utc>>,
    pub health_report: SystemHealthReport,
    pub performance_report: PerformanceReport,
    pub recent_events: Vec<MonitoringEvent>,
    pub alert_statistics: AlertStatistics,
}

pub struct MonitoringService {
    config: MonitoringConfig,
    checker: HealthChecker,
    tracker: MetricTracker,
    counters: OperationCounters,
    events: EventLog,
    dispatcher: AlertDispatcher,
    metrics: Arc<MetricsCollector>,
    status: RwLock<StatusSnapshot>,
}

impl MonitoringService {
    pub fn new(
        config: MonitoringConfig,
        checker: HealthChecker,
        dispatcher: AlertDispatcher,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            config,
            checker,
            tracker: MetricTracker::with_default_metrics(),
            counters: OperationCounters::new(),
            events: EventLog::new(),
            dispatcher,
            metrics,
            status: RwLock::new(StatusSnapshot {
                status: HealthStatus::Healthy,
                last_health_check: None,
                degraded_since: None,
            }),
        }
    }

    /// Wire the monitor from configuration: one HTTP client shared by all
    /// channels, channels chosen by which settings are present.
    pub fn from_config(
        config: &Config,
        probes: Probes,
        email_sender: Arc<dyn EmailSender>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.alerting.channel_timeout())
            .build()?;
        let channels = build_channels(&config.alerting, client, email_sender);
        let dispatcher = AlertDispatcher::new(config.alerting.clone(), channels);
        let checker = HealthChecker::new(probes, config.monitoring.probe_timeout());
        let metrics = Arc::new(MetricsCollector::new()?);

        info!("Session continuity monitoring service initialized");
        Ok(Self::new(
            config.monitoring.clone(),
            checker,
            dispatcher,
            metrics,
        ))
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn tracker(&self) -> &MetricTracker {
        &self.tracker
    }

    pub fn counters(&self) -> &OperationCounters {
        &self.counters
    }

    pub fn current_status(&self) -> HealthStatus {
        self.status.read().status
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        *self.status.read()
    }

    // -----------------------------------------------------------------------
    // Health

    /// Fresh report from the probes, without touching the status
    pub async fn health_report(&self) -> SystemHealthReport {
        self.checker
            .check_system_health(&self.tracker, &self.counters)
            .await
    }

    /// Scheduled health tick: poll, move the status, raise alerts
    pub async fn perform_health_check(&self) -> SystemHealthReport {
        let report = self.health_report().await;
        self.metrics.update_health(&report);

        self.update_status(report.overall_health);

        match report.overall_health {
            HealthStatus::Unhealthy => {
                self.trigger_alert(
                    AlertLevel::Critical,
                    SYSTEM_HEALTH_CRITICAL,
                    "Session continuity system is in unhealthy state",
                );
            }
            HealthStatus::Degraded => {
                self.trigger_alert(
                    AlertLevel::Warning,
                    SYSTEM_HEALTH_DEGRADED,
                    "Session continuity system performance is degraded",
                );
            }
            HealthStatus::Healthy => {}
        }
        self.raise_component_alerts(&report);

        self.status.write().last_health_check = Some(Utc::now());
        report
    }

    fn update_status(&self, next: HealthStatus) {
        let now = Utc::now();
        let previous = {
            let mut state = self.status.write();
            let previous = std::mem::replace(&mut state.status, next);
            if next == HealthStatus::Healthy {
                state.degraded_since = None;
            } else if previous == HealthStatus::Healthy {
                state.degraded_since = Some(now);
            }
            previous
        };

        if previous != next {
            info!(from = %previous, to = %next, "System status changed");
            self.record_event(MonitoringEvent::status_change(previous, next).at(now));
        }
    }

    fn raise_component_alerts(&self, report: &SystemHealthReport) {
        for component in Component::ALL {
            let health = report.component(component);
            if health.status == HealthStatus::Unhealthy {
                self.trigger_alert(
                    AlertLevel::Critical,
                    &component.failure_title(),
                    &health.message,
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Performance

    pub fn performance_report(&self) -> PerformanceReport {
        PerformanceReport {
            timestamp: Utc::now(),
            performance_metrics: self.tracker.current_values(),
            counters: self.counters.snapshot(),
            success_rates: self.counters.success_rates(),
        }
    }

    /// Scheduled performance tick. Values of metrics that have been sampled
    /// are fed back into the tracker; metrics over their threshold raise one
    /// warning naming each of them.
    pub fn perform_performance_check(&self) -> PerformanceReport {
        let report = self.performance_report();

        for (key, value) in &report.performance_metrics {
            let sampled = self
                .tracker
                .get(key)
                .is_some_and(|metric| metric.sample_count > 0);
            if sampled {
                self.tracker.update_value(key, *value);
            }
        }
        self.metrics.update_performance(&report.performance_metrics);

        let mut keys: Vec<_> = report.performance_metrics.keys().collect();
        keys.sort();
        let exceeded: Vec<String> = keys
            .into_iter()
            .filter_map(|key| {
                let metric = self.tracker.get(key)?;
                metric.exceeds_threshold().then(|| {
                    format!(
                        "{} ({}) exceeded threshold: {} > {}",
                        key, metric.name, metric.current_value, metric.threshold
                    )
                })
            })
            .collect();

        // Every slow metric shares one alert and one rate-limit key
        if !exceeded.is_empty() {
            self.trigger_alert(
                AlertLevel::Warning,
                PERFORMANCE_THRESHOLD_EXCEEDED,
                &exceeded.join("; "),
            );
        }

        debug!("Performance check completed");
        report
    }

    // -----------------------------------------------------------------------
    // Pattern checks

    pub fn perform_alerting_check(&self) {
        self.perform_alerting_check_at(Utc::now());
    }

    pub fn perform_alerting_check_at(&self, now: DateTime<Utc>) {
        self.check_extended_degradation(now);
        self.check_success_rates();
        self.check_failure_pattern(now);
        debug!("Alerting check completed");
    }

    fn check_extended_degradation(&self, now: DateTime<Utc>) {
        let snapshot = self.status_snapshot();
        let Some(since) = snapshot.degraded_since else {
            return;
        };
        let minutes = (now - since).num_minutes();

        if minutes > i64::from(self.config.degradation_threshold_minutes) {
            self.trigger_alert(
                AlertLevel::Warning,
                EXTENDED_SYSTEM_DEGRADATION,
                &format!("System has been {} for {minutes} minutes", snapshot.status),
            );
        }
    }

    fn check_success_rates(&self) {
        let mut low: Vec<_> = self
            .counters
            .success_rates()
            .into_iter()
            .filter(|(_, rate)| *rate < self.config.min_success_rate)
            .collect();
        if low.is_empty() {
            return;
        }
        low.sort_by(|a, b| a.0.cmp(&b.0));

        let details = low
            .iter()
            .map(|(key, rate)| format!("{key} is {rate:.2}"))
            .collect::<Vec<_>>()
            .join(", ");
        self.trigger_alert(
            AlertLevel::Warning,
            LOW_SUCCESS_RATE,
            &format!(
                "Success rate below {:.2}: {}",
                self.config.min_success_rate, details
            ),
        );
    }

    fn check_failure_pattern(&self, now: DateTime<Utc>) {
        let since = now - Duration::minutes(FAILURE_PATTERN_WINDOW_MINUTES);
        let failures = self.events.count_since(MonitoringEventType::Error, since);

        if failures >= self.config.failure_pattern_threshold {
            self.trigger_alert(
                AlertLevel::Critical,
                FAILURE_PATTERN_DETECTED,
                &format!(
                    "Multiple failures detected in the last {FAILURE_PATTERN_WINDOW_MINUTES} minutes: {failures}"
                ),
            );
        }
    }

    // -----------------------------------------------------------------------
    // Alerts and events

    /// Raise an alert from the monitor. The ALERT event and the
    /// `alerts_triggered` counter only move when the rate limiter let it by.
    pub fn trigger_alert(&self, level: AlertLevel, title: &str, message: &str) -> DispatchOutcome {
        let alert = Alert::new(level, title, message, MONITOR_COMPONENT);
        let outcome = self.dispatcher.send_alert(alert);

        match outcome {
            DispatchOutcome::RateLimited => self.metrics.record_alert_suppressed(),
            DispatchOutcome::Accepted | DispatchOutcome::Disabled => {
                self.counters.increment(ALERTS_TRIGGERED);
                self.metrics.record_alert(level);
                self.record_event(
                    MonitoringEvent::new(MonitoringEventType::Alert, format!("{title}: {message}"))
                        .with_component(MONITOR_COMPONENT),
                );
                warn!(level = %level, "Alert triggered: {} - {}", title, message);
            }
        }
        outcome
    }

    pub fn record_event(&self, event: MonitoringEvent) {
        debug!(event_type = ?event.event_type, "Monitoring event: {}", event.message);
        self.events.record(event);
    }

    /// Note a failed scheduled job so the failure pattern check can see it
    pub fn record_job_failure(&self, job: &'static str, message: &str) {
        self.metrics.record_job_failure(job);
        self.record_event(MonitoringEvent::new(
            MonitoringEventType::Error,
            format!("{job} failed: {message}"),
        ));
    }

    pub fn recent_events(&self, limit: usize) -> Vec<MonitoringEvent> {
        self.events.recent(limit)
    }

    pub fn cleanup(&self) -> CleanupSummary {
        self.dispatcher.cleanup()
    }

    // -----------------------------------------------------------------------
    // Operation recording

    pub fn record_operation(&self, kind: OperationKind, duration_ms: f64, successful: bool) {
        self.counters.record(kind, successful);
        self.tracker.update_value(kind.metric_key(), duration_ms);
        self.metrics.record_operation(kind, successful);
    }

    pub fn record_session_capture(&self, duration_ms: f64, successful: bool) {
        self.record_operation(OperationKind::SessionCapture, duration_ms, successful);
    }

    pub fn record_documentation_sync(&self, duration_ms: f64, successful: bool) {
        self.record_operation(OperationKind::DocumentationSync, duration_ms, successful);
    }

    pub fn record_quality_gate_execution(&self, duration_ms: f64, passed: bool) {
        self.record_operation(OperationKind::QualityGateExecution, duration_ms, passed);
    }

    pub fn record_context_recovery(&self, duration_ms: f64, successful: bool) {
        self.record_operation(OperationKind::ContextRecovery, duration_ms, successful);
    }

    // -----------------------------------------------------------------------

    pub async fn dashboard(&self) -> MonitoringDashboard {
        let snapshot = self.status_snapshot();
        MonitoringDashboard {
            system_status: snapshot.status,
            last_health_check: snapshot.last_health_check,
            health_report: self.health_report().await,
            performance_report: self.performance_report(),
            recent_events: self.events.recent(self.events.len()),
            alert_statistics: self.dispatcher.statistics(),
        }
    }
}
