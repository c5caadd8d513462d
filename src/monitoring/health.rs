use super::{
    Component, ComponentHealth, HealthStatus, MetricTracker, OperationCounters, OperationKind,
    SystemHealthReport, SESSION_CAPTURE_TIME,
};
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error};

pub const SYNC_HEALTHY_SCORE: f64 = 0.95;
pub const SYNC_DEGRADED_SCORE: f64 = 0.80;
pub const GATES_HEALTHY_PASS_RATE: f64 = 0.90;
pub const GATES_DEGRADED_PASS_RATE: f64 = 0.70;
pub const RELIABLE_SOURCE_SCORE: f64 = 0.80;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Probe request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{probe} probe responded with status {status}")]
    Status { probe: &'static str, status: u16 },

    #[error("{probe} probe timed out after {timeout:?}")]
    Timeout { probe: &'static str, timeout: Duration },

    #[error("{probe} probe panicked: {message}")]
    Panicked { probe: &'static str, message: String },

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureValidation {
    pub valid: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Session state handed from the capture probe to the gate run. The monitor
/// never looks inside it.
pub type SessionSnapshot = serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub consistency_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GateResult {
    #[serde(default)]
    pub name: Option<String>,
    pub passed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GateRunReport {
    pub results: Vec<GateResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecoverySource {
    #[serde(default)]
    pub name: Option<String>,
    pub reliability_score: f64,
}

#[async_trait]
pub trait CaptureProbe: Send + Sync {
    async fn validate(&self) -> Result<CaptureValidation, ProbeError>;
    async fn capture_session_state(&self) -> Result<SessionSnapshot, ProbeError>;
}

#[async_trait]
pub trait SyncProbe: Send + Sync {
    async fn validate_consistency(&self) -> Result<ConsistencyReport, ProbeError>;
}

#[async_trait]
pub trait GatesProbe: Send + Sync {
    async fn run_all_gates(&self, session: &SessionSnapshot) -> Result<GateRunReport, ProbeError>;
}

#[async_trait]
pub trait RecoveryProbe: Send + Sync {
    async fn analyze_available_sources(&self) -> Result<Vec<RecoverySource>, ProbeError>;
}

/// The four collaborators polled on every health check
#[derive(Clone)]
pub struct Probes {
    pub capture: Arc<dyn CaptureProbe>,
    pub sync: Arc<dyn SyncProbe>,
    pub gates: Arc<dyn GatesProbe>,
    pub recovery: Arc<dyn RecoveryProbe>,
}

/// Polls the probes and folds their answers into a [`SystemHealthReport`].
/// Every probe call is bounded by a timeout and shielded from panics.
#[derive(Clone)]
pub struct HealthChecker {
    probes: Probes,
    probe_timeout: Duration,
}

impl HealthChecker {
    pub fn new(probes: Probes, probe_timeout: Duration) -> Self {
        Self {
            probes,
            probe_timeout,
        }
    }

    pub async fn check_system_health(
        &self,
        tracker: &MetricTracker,
        counters: &OperationCounters,
    ) -> SystemHealthReport {
        let start = Instant::now();

        let (session_capture, documentation_sync, quality_gates, context_recovery) = tokio::join!(
            self.check_session_capture(tracker, counters),
            self.check_documentation_sync(),
            self.check_quality_gates(),
            self.check_context_recovery(),
        );

        let report = SystemHealthReport::new(
            session_capture,
            documentation_sync,
            quality_gates,
            context_recovery,
        );
        debug!(
            overall = %report.overall_health,
            "System health check completed in {}ms",
            start.elapsed().as_millis()
        );
        report
    }

    async fn check_session_capture(
        &self,
        tracker: &MetricTracker,
        counters: &OperationCounters,
    ) -> ComponentHealth {
        let start = Instant::now();
        let validation = self
            .guarded("session capture", self.probes.capture.validate())
            .await;

        let mut health = match validation {
            Ok(v) if v.valid => {
                ComponentHealth::new(HealthStatus::Healthy, "Session capture operating normally")
            }
            Ok(v) => ComponentHealth::new(
                HealthStatus::Degraded,
                match v.error_message {
                    Some(reason) => format!("Session capture validation failed: {reason}"),
                    None => "Session capture validation failed".to_string(),
                },
            ),
            Err(e) => return probe_failure(Component::SessionCapture, e, start),
        };

        if let Some(metric) = tracker.get(SESSION_CAPTURE_TIME) {
            if metric.exceeds_threshold() {
                health.status = HealthStatus::Degraded;
                health.message = format!(
                    "Session capture time {:.0}{} exceeds threshold {:.0}{}",
                    metric.current_value, metric.unit, metric.threshold, metric.unit
                );
            }
            health = health.with_detail("average_time_ms", metric.average_value);
        }
        if let Some(rate) = counters
            .success_rates()
            .get(OperationKind::SessionCapture.success_rate_key())
        {
            health = health.with_detail("success_rate", *rate);
        }

        finish(health, start)
    }

    async fn check_documentation_sync(&self) -> ComponentHealth {
        let start = Instant::now();
        let report = match self
            .guarded("documentation sync", self.probes.sync.validate_consistency())
            .await
        {
            Ok(report) => report,
            Err(e) => return probe_failure(Component::DocumentationSync, e, start),
        };

        let score = report.consistency_score;
        let health = if score >= SYNC_HEALTHY_SCORE {
            ComponentHealth::new(HealthStatus::Healthy, "Documentation is consistent")
        } else if score >= SYNC_DEGRADED_SCORE {
            ComponentHealth::new(
                HealthStatus::Degraded,
                format!("Documentation consistency below target: {score:.2}"),
            )
        } else {
            ComponentHealth::new(
                HealthStatus::Unhealthy,
                format!("Documentation consistency critically low: {score:.2}"),
            )
        };

        finish(health.with_detail("consistency_score", score), start)
    }

    async fn check_quality_gates(&self) -> ComponentHealth {
        let start = Instant::now();
        let session = match self
            .guarded("session capture", self.probes.capture.capture_session_state())
            .await
        {
            Ok(session) => session,
            Err(e) => return probe_failure(Component::QualityGates, e, start),
        };

        let report = match self
            .guarded("quality gates", self.probes.gates.run_all_gates(&session))
            .await
        {
            Ok(report) => report,
            Err(e) => return probe_failure(Component::QualityGates, e, start),
        };

        let total = report.results.len();
        if total == 0 {
            let health = ComponentHealth::new(HealthStatus::Unhealthy, "No quality gates reported")
                .with_detail("pass_rate", 0.0)
                .with_detail("total_gates", 0.0);
            return finish(health, start);
        }

        let passed = report.results.iter().filter(|r| r.passed).count();
        let pass_rate = passed as f64 / total as f64;
        let status = if pass_rate >= GATES_HEALTHY_PASS_RATE {
            HealthStatus::Healthy
        } else if pass_rate >= GATES_DEGRADED_PASS_RATE {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };

        let health = ComponentHealth::new(
            status,
            format!("{passed}/{total} quality gates passed"),
        )
        .with_detail("pass_rate", pass_rate)
        .with_detail("total_gates", total as f64);
        finish(health, start)
    }

    async fn check_context_recovery(&self) -> ComponentHealth {
        let start = Instant::now();
        let sources = match self
            .guarded(
                "context recovery",
                self.probes.recovery.analyze_available_sources(),
            )
            .await
        {
            Ok(sources) => sources,
            Err(e) => return probe_failure(Component::ContextRecovery, e, start),
        };

        let count = sources.len();
        let average_reliability = if count == 0 {
            0.0
        } else {
            sources.iter().map(|s| s.reliability_score).sum::<f64>() / count as f64
        };
        let reliable = sources
            .iter()
            .filter(|s| s.reliability_score >= RELIABLE_SOURCE_SCORE)
            .count();

        let health = if reliable > 0 {
            ComponentHealth::new(
                HealthStatus::Healthy,
                format!("{reliable} reliable recovery sources available"),
            )
        } else if count > 0 {
            ComponentHealth::new(
                HealthStatus::Degraded,
                format!("{count} recovery sources available, none reliable"),
            )
        } else {
            ComponentHealth::new(HealthStatus::Unhealthy, "No recovery sources available")
        };

        let health = health
            .with_detail("available_sources", count as f64)
            .with_detail("average_reliability", average_reliability);
        finish(health, start)
    }

    /// Run one probe call under the timeout, turning a panic into an error
    async fn guarded<T, F>(&self, probe: &'static str, call: F) -> Result<T, ProbeError>
    where
        F: Future<Output = Result<T, ProbeError>>,
    {
        match tokio::time::timeout(self.probe_timeout, AssertUnwindSafe(call).catch_unwind()).await
        {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(ProbeError::Panicked {
                probe,
                message: panic_message(panic.as_ref()),
            }),
            Err(_) => Err(ProbeError::Timeout {
                probe,
                timeout: self.probe_timeout,
            }),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn probe_failure(component: Component, error: ProbeError, start: Instant) -> ComponentHealth {
    error!(component = %component, "Health probe failed: {}", error);
    finish(
        ComponentHealth::new(
            HealthStatus::Unhealthy,
            format!("{} check failed: {}", component.display_name(), error),
        ),
        start,
    )
}

fn finish(mut health: ComponentHealth, start: Instant) -> ComponentHealth {
    health.response_time_ms = start.elapsed().as_millis() as u64;
    health
}


#[cfg(test)]
mod tests {
    use super::test_probes::*;
    use super::*;

    fn checker(probes: &Arc<ScriptedProbes>) -> HealthChecker {
        HealthChecker::new(test_probes::probes(probes), Duration::from_millis(200))
    }

    async fn check(probes: &Arc<ScriptedProbes>) -> SystemHealthReport {
        checker(probes)
            .check_system_health(
                &MetricTracker::with_default_metrics(),
                &OperationCounters::new(),
            )
            .await
    }

    #[tokio::test]
    async fn test_all_probes_healthy() {
        let probes = ScriptedProbes::healthy();
        let report = check(&probes).await;
        assert_eq!(report.overall_health, HealthStatus::Healthy);
        assert_eq!(report.quality_gates.detail("pass_rate"), Some(1.0));
        assert_eq!(report.context_recovery.detail("available_sources"), Some(1.0));
    }

    #[tokio::test]
    async fn test_sync_score_bands() {
        let probes = ScriptedProbes::healthy();
        for (score, expected) in [
            (0.95, HealthStatus::Healthy),
            (0.94, HealthStatus::Degraded),
            (0.80, HealthStatus::Degraded),
            (0.79, HealthStatus::Unhealthy),
        ] {
            *probes.sync.lock() = Script::Answer(ConsistencyReport {
                consistency_score: score,
            });
            let report = check(&probes).await;
            assert_eq!(report.documentation_sync.status, expected, "score {score}");
        }
    }

    #[tokio::test]
    async fn test_gate_pass_rate_bands() {
        let probes = ScriptedProbes::healthy();
        for (passed, expected) in [
            (9, HealthStatus::Healthy),
            (8, HealthStatus::Degraded),
            (7, HealthStatus::Degraded),
            (6, HealthStatus::Unhealthy),
        ] {
            *probes.gates.lock() = Script::Answer(gates(passed, 10));
            let report = check(&probes).await;
            assert_eq!(report.quality_gates.status, expected, "{passed}/10 passed");
        }
    }

    #[tokio::test]
    async fn test_no_gates_is_unhealthy() {
        let probes = ScriptedProbes::healthy();
        *probes.gates.lock() = Script::Answer(GateRunReport::default());
        let report = check(&probes).await;
        assert_eq!(report.quality_gates.status, HealthStatus::Unhealthy);
        assert_eq!(report.overall_health, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_recovery_source_rules() {
        let probes = ScriptedProbes::healthy();

        *probes.recovery.lock() = Script::Answer(vec![source(0.5), source(0.79)]);
        assert_eq!(check(&probes).await.context_recovery.status, HealthStatus::Degraded);

        *probes.recovery.lock() = Script::Answer(vec![source(0.5), source(0.8)]);
        assert_eq!(check(&probes).await.context_recovery.status, HealthStatus::Healthy);

        *probes.recovery.lock() = Script::Answer(Vec::new());
        let report = check(&probes).await;
        assert_eq!(report.context_recovery.status, HealthStatus::Unhealthy);
        assert_eq!(report.context_recovery.detail("average_reliability"), Some(0.0));
    }

    #[tokio::test]
    async fn test_invalid_capture_is_degraded_with_probe_message() {
        let probes = ScriptedProbes::healthy();
        *probes.capture.lock() = Script::Answer(CaptureValidation {
            valid: false,
            error_message: Some("snapshot missing".to_string()),
        });
        let report = check(&probes).await;
        assert_eq!(report.session_capture.status, HealthStatus::Degraded);
        assert_eq!(
            report.session_capture.message,
            "Session capture validation failed: snapshot missing"
        );
        assert_eq!(report.overall_health, HealthStatus::Degraded);

        *probes.capture.lock() = Script::Answer(CaptureValidation {
            valid: false,
            error_message: None,
        });
        let report = check(&probes).await;
        assert_eq!(report.session_capture.message, "Session capture validation failed");
    }

    #[tokio::test]
    async fn test_slow_capture_metric_degrades_component() {
        let probes = ScriptedProbes::healthy();
        let tracker = MetricTracker::with_default_metrics();
        tracker.update_value(SESSION_CAPTURE_TIME, 7000.0);

        let report = checker(&probes)
            .check_system_health(&tracker, &OperationCounters::new())
            .await;
        assert_eq!(report.session_capture.status, HealthStatus::Degraded);
        assert_eq!(report.session_capture.detail("average_time_ms"), Some(7000.0));
    }

    #[tokio::test]
    async fn test_probe_error_panic_and_timeout_are_unhealthy() {
        let probes = ScriptedProbes::healthy();
        *probes.capture.lock() = Script::Fail("connection refused".to_string());
        *probes.sync.lock() = Script::Panic;
        *probes.recovery.lock() = Script::Hang;

        let report = check(&probes).await;
        assert_eq!(report.session_capture.status, HealthStatus::Unhealthy);
        assert!(report.session_capture.message.contains("connection refused"));
        assert_eq!(report.documentation_sync.status, HealthStatus::Unhealthy);
        assert!(report.documentation_sync.message.contains("probe exploded"));
        assert_eq!(report.context_recovery.status, HealthStatus::Unhealthy);
        assert!(report.context_recovery.message.contains("timed out"));
        // Gates still answer normally
        assert_eq!(report.quality_gates.status, HealthStatus::Healthy);
        assert_eq!(report.overall_health, HealthStatus::Unhealthy);
    }
}
