pub mod api;
pub mod config;
pub mod monitoring;

pub use config::Config;

// Re-export monitoring types
pub use monitoring::{
    Alert, AlertDispatcher, AlertLevel, Component, DispatchOutcome, HealthChecker, HealthStatus,
    HttpProbes, MetricsCollector, MonitoringScheduler, MonitoringService, Probes,
    SystemHealthReport,
};
