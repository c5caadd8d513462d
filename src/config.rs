use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server port
    pub http_port: u16,

    /// Base URL of the host application's probe endpoints
    pub probe_base_url: String,

    /// Alert dispatch settings
    pub alerting: AlertingConfig,

    /// Health and pattern thresholds
    pub monitoring: MonitoringConfig,

    /// Periodic job intervals
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    /// Master switch for alert dispatch
    pub enabled: bool,

    /// Slack-compatible incoming webhook URL
    pub slack_webhook_url: Option<String>,

    pub email_enabled: bool,

    /// Generic JSON webhook URL
    pub webhook_url: Option<String>,

    /// PagerDuty events v2 routing key
    pub pagerduty_key: Option<String>,

    /// OpsGenie API key
    pub opsgenie_key: Option<String>,

    /// Cooldown per alert key in minutes
    pub rate_limit_minutes: u32,

    /// Timeout for a single outbound channel call
    pub channel_timeout_seconds: u64,

    /// Maximum alerts being delivered at the same time
    pub dispatch_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Minutes out of HEALTHY before "Extended System Degradation" fires
    pub degradation_threshold_minutes: u32,

    /// Success rate below which "Low Success Rate" fires
    pub min_success_rate: f64,

    /// ERROR events within ten minutes that count as a failure pattern
    pub failure_pattern_threshold: usize,

    /// Timeout for a single probe call
    pub probe_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub health_interval_seconds: u64,
    pub performance_interval_seconds: u64,
    pub alerting_interval_seconds: u64,
    pub cleanup_interval_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 8080,
            probe_base_url: "http://localhost:3000/api/continuity".to_string(),
            alerting: AlertingConfig::default(),
            monitoring: MonitoringConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            slack_webhook_url: None,
            email_enabled: false,
            webhook_url: None,
            pagerduty_key: None,
            opsgenie_key: None,
            rate_limit_minutes: 5,
            channel_timeout_seconds: 5,
            dispatch_concurrency: 5,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            degradation_threshold_minutes: 30,
            min_success_rate: 0.8,
            failure_pattern_threshold: 5,
            probe_timeout_seconds: 10,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            health_interval_seconds: 30,
            performance_interval_seconds: 60,
            alerting_interval_seconds: 120,
            cleanup_interval_seconds: 24 * 60 * 60,
        }
    }
}

impl AlertingConfig {
    pub fn channel_timeout(&self) -> Duration {
        Duration::from_secs(self.channel_timeout_seconds)
    }
}

impl MonitoringConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }
}

impl SchedulerConfig {
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_seconds)
    }

    pub fn performance_interval(&self) -> Duration {
        Duration::from_secs(self.performance_interval_seconds)
    }

    pub fn alerting_interval(&self) -> Duration {
        Duration::from_secs(self.alerting_interval_seconds)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

/// Overwrite `target` when `name` is set, failing on unparsable values
fn parse_var<T>(name: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: Display,
{
    if let Ok(raw) = env::var(name) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", name, e))?;
    }
    Ok(())
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables, reading `.env` first
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Config::default();

        parse_var("HTTP_PORT", &mut config.http_port)?;
        if let Some(url) = optional_var("PROBE_BASE_URL") {
            config.probe_base_url = url;
        }

        // Alerting
        let alerting = &mut config.alerting;
        parse_var("ALERTING_ENABLED", &mut alerting.enabled)?;
        alerting.slack_webhook_url = optional_var("ALERTING_SLACK_WEBHOOK");
        parse_var("ALERTING_EMAIL_ENABLED", &mut alerting.email_enabled)?;
        alerting.webhook_url = optional_var("ALERTING_WEBHOOK_URL");
        alerting.pagerduty_key = optional_var("ALERTING_PAGERDUTY_KEY");
        alerting.opsgenie_key = optional_var("ALERTING_OPSGENIE_KEY");
        parse_var("ALERTING_RATE_LIMIT_MINUTES", &mut alerting.rate_limit_minutes)?;
        parse_var(
            "ALERTING_CHANNEL_TIMEOUT_SECONDS",
            &mut alerting.channel_timeout_seconds,
        )?;
        parse_var(
            "ALERTING_DISPATCH_CONCURRENCY",
            &mut alerting.dispatch_concurrency,
        )?;

        // Monitoring thresholds
        let monitoring = &mut config.monitoring;
        parse_var(
            "MONITORING_DEGRADATION_THRESHOLD_MINUTES",
            &mut monitoring.degradation_threshold_minutes,
        )?;
        parse_var("MONITORING_MIN_SUCCESS_RATE", &mut monitoring.min_success_rate)?;
        parse_var(
            "MONITORING_FAILURE_PATTERN_THRESHOLD",
            &mut monitoring.failure_pattern_threshold,
        )?;
        parse_var(
            "MONITORING_PROBE_TIMEOUT_SECONDS",
            &mut monitoring.probe_timeout_seconds,
        )?;

        // Scheduler
        let scheduler = &mut config.scheduler;
        parse_var(
            "SCHEDULER_HEALTH_INTERVAL_SECONDS",
            &mut scheduler.health_interval_seconds,
        )?;
        parse_var(
            "SCHEDULER_PERFORMANCE_INTERVAL_SECONDS",
            &mut scheduler.performance_interval_seconds,
        )?;
        parse_var(
            "SCHEDULER_ALERTING_INTERVAL_SECONDS",
            &mut scheduler.alerting_interval_seconds,
        )?;
        parse_var(
            "SCHEDULER_CLEANUP_INTERVAL_SECONDS",
            &mut scheduler.cleanup_interval_seconds,
        )?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.probe_base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("Probe base URL is required"));
        }

        if self.alerting.rate_limit_minutes == 0 {
            return Err(anyhow::anyhow!(
                "Alert rate limit window must be greater than 0 minutes"
            ));
        }

        if self.alerting.channel_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Channel timeout must be greater than 0"));
        }

        if self.alerting.dispatch_concurrency == 0 {
            return Err(anyhow::anyhow!("Dispatch concurrency must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.monitoring.min_success_rate) {
            return Err(anyhow::anyhow!(
                "Minimum success rate must be between 0.0 and 1.0, got {}",
                self.monitoring.min_success_rate
            ));
        }

        if self.monitoring.probe_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Probe timeout must be greater than 0"));
        }

        let intervals = [
            ("health", self.scheduler.health_interval_seconds),
            ("performance", self.scheduler.performance_interval_seconds),
            ("alerting", self.scheduler.alerting_interval_seconds),
            ("cleanup", self.scheduler.cleanup_interval_seconds),
        ];
        for (job, seconds) in intervals {
            if seconds == 0 {
                return Err(anyhow::anyhow!(
                    "Scheduler {} interval must be greater than 0",
                    job
                ));
            }
        }

        Ok(())
    }
}
