pub mod alerts;
pub mod channels;
pub mod health;
pub mod history;
pub mod metrics;
pub mod probes;
pub mod rate_limit;
pub mod scheduler;
pub mod service;
pub mod tracker;

pub use alerts::*;
pub use channels::*;
pub use health::*;
pub use history::*;
pub use metrics::*;
pub use probes::*;
pub use rate_limit::*;
pub use scheduler::*;
pub use service::*;
pub use tracker::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Component name used on alerts and events raised by the monitor itself
pub const MONITOR_COMPONENT: &str = "session-continuity";

/// Source tag sent to every external channel
pub const ALERT_SOURCE: &str = "session-continuity-system";

/// Three-level health verdict. Ordering follows severity, so the overall
/// status of a set of components is simply the maximum.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Unhealthy => "UNHEALTHY",
        }
    }

    /// Numeric encoding used by the status gauge
    pub fn gauge_value(&self) -> i64 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
        }
    }

    /// Most severe status of the given verdicts, `Healthy` when empty
    pub fn worst<I>(statuses: I) -> HealthStatus
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        statuses.into_iter().max().unwrap_or_default()
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl AlertLevel {
    pub const ALL: [AlertLevel; 3] = [AlertLevel::Info, AlertLevel::Warning, AlertLevel::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "INFO",
            AlertLevel::Warning => "WARNING",
            AlertLevel::Critical => "CRITICAL",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            AlertLevel::Info => 0,
            AlertLevel::Warning => 1,
            AlertLevel::Critical => 2,
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four functional areas polled by the health check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    SessionCapture,
    DocumentationSync,
    QualityGates,
    ContextRecovery,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::SessionCapture,
        Component::DocumentationSync,
        Component::QualityGates,
        Component::ContextRecovery,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Component::SessionCapture => "session_capture",
            Component::DocumentationSync => "documentation_sync",
            Component::QualityGates => "quality_gates",
            Component::ContextRecovery => "context_recovery",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Component::SessionCapture => "Session Capture",
            Component::DocumentationSync => "Documentation Sync",
            Component::QualityGates => "Quality Gates",
            Component::ContextRecovery => "Context Recovery",
        }
    }

    /// Title of the critical alert raised when this component is unhealthy
    pub fn failure_title(&self) -> String {
        format!("{} Failed", self.display_name())
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub message: String,
    pub last_checked: DateTime<Utc>,
    pub response_time_ms: u64,
    /// Component specific numeric details (pass rate, consistency score, ...)
    pub details: BTreeMap<String, f64>,
}

impl ComponentHealth {
    pub fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            last_checked: Utc::now(),
            response_time_ms: 0,
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, name: &str, value: f64) -> Self {
        self.details.insert(name.to_string(), value);
        self
    }

    pub fn detail(&self, name: &str) -> Option<f64> {
        self.details.get(name).copied()
    }
}

/// Point-in-time health of the whole subsystem. Built fresh on every check
/// and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealthReport {
    pub timestamp: DateTime<Utc>,
    pub overall_health: HealthStatus,
    pub session_capture: ComponentHealth,
    pub documentation_sync: ComponentHealth,
    pub quality_gates: ComponentHealth,
    pub context_recovery: ComponentHealth,
}

impl SystemHealthReport {
    pub fn new(
        session_capture: ComponentHealth,
        documentation_sync: ComponentHealth,
        quality_gates: ComponentHealth,
        context_recovery: ComponentHealth,
    ) -> Self {
        let overall_health = HealthStatus::worst([
            session_capture.status,
            documentation_sync.status,
            quality_gates.status,
            context_recovery.status,
        ]);

        Self {
            timestamp: Utc::now(),
            overall_health,
            session_capture,
            documentation_sync,
            quality_gates,
            context_recovery,
        }
    }

    pub fn component(&self, component: Component) -> &ComponentHealth {
        match component {
            Component::SessionCapture => &self.session_capture,
            Component::DocumentationSync => &self.documentation_sync,
            Component::QualityGates => &self.quality_gates,
            Component::ContextRecovery => &self.context_recovery,
        }
    }

    pub fn components(&self) -> impl Iterator<Item = (Component, &ComponentHealth)> {
        Component::ALL.into_iter().map(move |c| (c, self.component(c)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub timestamp: DateTime<Utc>,
    /// Current value per tracked metric
    pub performance_metrics: HashMap<String, f64>,
    pub counters: HashMap<String, u64>,
    /// Only present for operations that have been recorded at least once
    pub success_rates: HashMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(status: HealthStatus) -> ComponentHealth {
        ComponentHealth::new(status, "test")
    }

    #[test]
    fn test_overall_health_is_unhealthy_when_any_component_is() {
        let report = SystemHealthReport::new(
            component(HealthStatus::Healthy),
            component(HealthStatus::Degraded),
            component(HealthStatus::Unhealthy),
            component(HealthStatus::Healthy),
        );
        assert_eq!(report.overall_health, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_overall_health_is_degraded_without_unhealthy_components() {
        let report = SystemHealthReport::new(
            component(HealthStatus::Healthy),
            component(HealthStatus::Healthy),
            component(HealthStatus::Degraded),
            component(HealthStatus::Healthy),
        );
        assert_eq!(report.overall_health, HealthStatus::Degraded);
    }

    #[test]
    fn test_overall_health_is_healthy_when_all_are() {
        let report = SystemHealthReport::new(
            component(HealthStatus::Healthy),
            component(HealthStatus::Healthy),
            component(HealthStatus::Healthy),
            component(HealthStatus::Healthy),
        );
        assert_eq!(report.overall_health, HealthStatus::Healthy);
        assert_eq!(report.components().count(), 4);
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&HealthStatus::Degraded).unwrap();
        assert_eq!(json, "\"DEGRADED\"");
        let json = serde_json::to_string(&AlertLevel::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
    }

    #[test]
    fn test_component_failure_titles() {
        assert_eq!(Component::SessionCapture.failure_title(), "Session Capture Failed");
        assert_eq!(Component::QualityGates.failure_title(), "Quality Gates Failed");
    }
}
