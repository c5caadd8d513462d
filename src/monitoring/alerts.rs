use super::{
    AlertLevel, AlertRateLimiter, BoundedLog, ChannelError, NotificationChannel,
    MAX_ALERT_HISTORY, MONITOR_COMPONENT,
};
use crate::config::AlertingConfig;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Alerts and rate-limit entries older than this are dropped by cleanup
pub const ALERT_RETENTION_DAYS: i64 = 7;

/// Window used for the "recent" half of [`AlertStatistics`]
pub const RECENT_ALERT_HOURS: i64 = 24;

pub const TEST_ALERT_TITLE: &str = "Test Alert";
pub const TEST_ALERT_MESSAGE: &str = "This is a test alert from the Session Continuity System";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: Uuid,
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    pub component: String,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(
        level: AlertLevel,
        title: impl Into<String>,
        message: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            title: title.into(),
            message: message.into(),
            component: component.into(),
            timestamp: Utc::now(),
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
        }
    }

    pub fn test() -> Self {
        Self::new(
            AlertLevel::Info,
            TEST_ALERT_TITLE,
            TEST_ALERT_MESSAGE,
            MONITOR_COMPONENT,
        )
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn rate_limit_key(&self) -> String {
        format!("{}:{}:{}", self.component, self.title, self.level)
    }
}

/// What the dispatcher did with an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchOutcome {
    /// Alerting is switched off; nothing was recorded or sent
    Disabled,
    /// Same alert went out within the rate-limit window
    RateLimited,
    /// Recorded and handed to the channels
    Accepted,
}

impl DispatchOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, DispatchOutcome::Accepted)
    }
}

/// Result of one channel attempt
#[derive(Debug)]
pub struct ChannelDelivery {
    pub channel: &'static str,
    pub result: Result<(), ChannelError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertStatistics {
    pub alert_counts: BTreeMap<AlertLevel, u64>,
    pub total_alerts: u64,
    pub recent_alert_counts: BTreeMap<AlertLevel, u64>,
    pub recent_total_alerts: u64,
}

/// Which channels are live, without exposing any secret
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertingConfiguration {
    pub enabled: bool,
    pub slack_enabled: bool,
    pub email_enabled: bool,
    pub webhook_enabled: bool,
    pub pagerduty_enabled: bool,
    pub opsgenie_enabled: bool,
    pub rate_limit_minutes: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub alerts_removed: usize,
    pub rate_limit_entries_removed: usize,
}

/// Rate-limits alerts, keeps their history and fans accepted alerts out to
/// the configured channels.
pub struct AlertDispatcher {
    config: AlertingConfig,
    rate_limiter: AlertRateLimiter,
    history: BoundedLog<Alert>,
    level_counts: [AtomicU64; 3],
    channels: Arc<Vec<Arc<dyn NotificationChannel>>>,
    permits: Arc<Semaphore>,
}

impl AlertDispatcher {
    pub fn new(config: AlertingConfig, channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        info!(
            enabled = config.enabled,
            channels = channels.len(),
            rate_limit_minutes = config.rate_limit_minutes,
            "Alert dispatcher initialized"
        );

        Self {
            rate_limiter: AlertRateLimiter::new(config.rate_limit_minutes),
            history: BoundedLog::new(MAX_ALERT_HISTORY),
            level_counts: Default::default(),
            channels: Arc::new(channels),
            permits: Arc::new(Semaphore::new(config.dispatch_concurrency.max(1))),
            config,
        }
    }

    pub fn config(&self) -> &AlertingConfig {
        &self.config
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Gate, record and dispatch an alert. Channel calls run on a spawned
    /// task, so this never waits on the network.
    pub fn send_alert(&self, alert: Alert) -> DispatchOutcome {
        let outcome = self.admit(&alert);
        if !outcome.is_accepted() {
            return outcome;
        }

        let Ok(handle) = Handle::try_current() else {
            warn!(title = %alert.title, "No async runtime available, alert not dispatched");
            return outcome;
        };

        let channels = Arc::clone(&self.channels);
        let permits = Arc::clone(&self.permits);
        let timeout = self.config.channel_timeout();
        handle.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            deliver_to_channels(&channels, &alert, timeout).await;
        });

        outcome
    }

    /// Same gating as [`send_alert`](Self::send_alert) but waits for every
    /// channel to answer.
    pub async fn send_alert_and_wait(
        &self,
        alert: Alert,
    ) -> (DispatchOutcome, Vec<ChannelDelivery>) {
        let outcome = self.admit(&alert);
        if !outcome.is_accepted() {
            return (outcome, Vec::new());
        }

        let deliveries =
            deliver_to_channels(&self.channels, &alert, self.config.channel_timeout()).await;
        (outcome, deliveries)
    }

    pub fn send_test_alert(&self) -> DispatchOutcome {
        self.send_alert(Alert::test())
    }

    fn admit(&self, alert: &Alert) -> DispatchOutcome {
        if !self.config.enabled {
            debug!(title = %alert.title, "Alerting disabled, alert dropped");
            return DispatchOutcome::Disabled;
        }

        if self.rate_limiter.is_rate_limited(alert) {
            warn!(
                title = %alert.title,
                component = %alert.component,
                level = %alert.level,
                "Alert rate limited"
            );
            return DispatchOutcome::RateLimited;
        }

        self.history.push(alert.clone());
        self.level_counts[alert.level.index()].fetch_add(1, Ordering::Relaxed);

        debug!(
            id = %alert.id,
            level = %alert.level,
            "Alert accepted for dispatch: {}",
            alert.title
        );
        DispatchOutcome::Accepted
    }

    /// Newest `limit` alerts, oldest first
    pub fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        self.history.recent(limit)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn statistics(&self) -> AlertStatistics {
        self.statistics_at(Utc::now())
    }

    pub fn statistics_at(&self, now: DateTime<Utc>) -> AlertStatistics {
        let alert_counts: BTreeMap<AlertLevel, u64> = AlertLevel::ALL
            .iter()
            .map(|level| {
                (
                    *level,
                    self.level_counts[level.index()].load(Ordering::Relaxed),
                )
            })
            .collect();
        let total_alerts = alert_counts.values().sum();

        let since = now - Duration::hours(RECENT_ALERT_HOURS);
        let mut recent_alert_counts: BTreeMap<AlertLevel, u64> =
            AlertLevel::ALL.iter().map(|level| (*level, 0)).collect();
        for alert in self.history.snapshot() {
            if alert.timestamp > since {
                *recent_alert_counts.entry(alert.level).or_default() += 1;
            }
        }
        let recent_total_alerts = recent_alert_counts.values().sum();

        AlertStatistics {
            alert_counts,
            total_alerts,
            recent_alert_counts,
            recent_total_alerts,
        }
    }

    /// Mark a stored alert as acknowledged. `None` when the id is unknown.
    pub fn acknowledge(&self, id: Uuid, acknowledged_by: &str) -> Option<Alert> {
        let acknowledged = self.history.update_last(
            |alert| alert.id == id,
            |alert| {
                alert.acknowledged = true;
                alert.acknowledged_by = Some(acknowledged_by.to_string());
                alert.acknowledged_at = Some(Utc::now());
                alert.clone()
            },
        );

        match &acknowledged {
            Some(alert) => info!(id = %id, by = acknowledged_by, "Alert acknowledged: {}", alert.title),
            None => debug!(id = %id, "Acknowledge requested for unknown alert"),
        }
        acknowledged
    }

    pub fn configuration(&self) -> AlertingConfiguration {
        AlertingConfiguration {
            enabled: self.config.enabled,
            slack_enabled: is_set(&self.config.slack_webhook_url),
            email_enabled: self.config.email_enabled,
            webhook_enabled: is_set(&self.config.webhook_url),
            pagerduty_enabled: is_set(&self.config.pagerduty_key),
            opsgenie_enabled: is_set(&self.config.opsgenie_key),
            rate_limit_minutes: self.config.rate_limit_minutes,
        }
    }

    pub fn cleanup(&self) -> CleanupSummary {
        self.cleanup_at(Utc::now())
    }

    /// Drop alerts and rate-limit entries older than the retention window
    pub fn cleanup_at(&self, now: DateTime<Utc>) -> CleanupSummary {
        let cutoff = now - Duration::days(ALERT_RETENTION_DAYS);
        let summary = CleanupSummary {
            alerts_removed: self.history.retain(|alert| alert.timestamp >= cutoff),
            rate_limit_entries_removed: self.rate_limiter.purge_older_than(cutoff),
        };

        info!(
            alerts_removed = summary.alerts_removed,
            rate_limit_entries_removed = summary.rate_limit_entries_removed,
            "Alert history cleanup completed"
        );
        summary
    }

    #[cfg(test)]
    pub(crate) fn record_for_test(&self, alert: Alert) {
        self.level_counts[alert.level.index()].fetch_add(1, Ordering::Relaxed);
        self.history.push(alert);
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Attempt every channel that accepts the alert. Channels run concurrently
/// and a failure or timeout in one never affects another.
pub async fn deliver_to_channels(
    channels: &[Arc<dyn NotificationChannel>],
    alert: &Alert,
    timeout: std::time::Duration,
) -> Vec<ChannelDelivery> {
    let attempts = channels
        .iter()
        .filter(|channel| channel.accepts(alert))
        .map(|channel| async move {
            let name = channel.name();
            let result = match tokio::time::timeout(timeout, channel.deliver(alert)).await {
                Ok(result) => result,
                Err(_) => Err(ChannelError::Timeout {
                    channel: name,
                    seconds: timeout.as_secs(),
                }),
            };

            match &result {
                Ok(()) => debug!(channel = name, title = %alert.title, "Alert delivered"),
                Err(e) => error!(channel = name, title = %alert.title, "Failed to send alert: {}", e),
            }
            ChannelDelivery {
                channel: name,
                result,
            }
        });

    join_all(attempts).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::{OpsGenieChannel, PagerDutyChannel, WebhookChannel};
    use reqwest::Client;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> AlertingConfig {
        AlertingConfig {
            channel_timeout_seconds: 1,
            ..AlertingConfig::default()
        }
    }

    fn dispatcher() -> AlertDispatcher {
        AlertDispatcher::new(config(), Vec::new())
    }

    fn alert(level: AlertLevel, title: &str) -> Alert {
        Alert::new(level, title, "message", MONITOR_COMPONENT)
    }

    #[test]
    fn test_rate_limit_key_format() {
        let a = alert(AlertLevel::Critical, "Quality Gates Failed");
        assert_eq!(
            a.rate_limit_key(),
            "session-continuity:Quality Gates Failed:CRITICAL"
        );
    }

    #[test]
    fn test_disabled_dispatcher_records_nothing() {
        let dispatcher = AlertDispatcher::new(
            AlertingConfig {
                enabled: false,
                ..config()
            },
            Vec::new(),
        );
        assert_eq!(
            dispatcher.send_alert(alert(AlertLevel::Warning, "X")),
            DispatchOutcome::Disabled
        );
        assert_eq!(dispatcher.history_len(), 0);
        assert_eq!(dispatcher.statistics().total_alerts, 0);
    }

    #[tokio::test]
    async fn test_repeated_alert_is_rate_limited() {
        let dispatcher = dispatcher();
        assert_eq!(
            dispatcher.send_alert(alert(AlertLevel::Warning, "System Health Degraded")),
            DispatchOutcome::Accepted
        );
        assert_eq!(
            dispatcher.send_alert(alert(AlertLevel::Warning, "System Health Degraded")),
            DispatchOutcome::RateLimited
        );
        assert_eq!(
            dispatcher.send_alert(alert(AlertLevel::Critical, "System Health Degraded")),
            DispatchOutcome::Accepted
        );
        assert_eq!(dispatcher.history_len(), 2);
    }

    #[tokio::test]
    async fn test_history_is_capped_and_recent_is_chronological() {
        let dispatcher = dispatcher();
        for i in 0..1005 {
            dispatcher.send_alert(alert(AlertLevel::Info, &format!("alert {i}")));
        }
        assert_eq!(dispatcher.history_len(), MAX_ALERT_HISTORY);

        let recent = dispatcher.recent_alerts(3);
        let titles: Vec<_> = recent.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["alert 1002", "alert 1003", "alert 1004"]);

        // Lifetime counters survive eviction
        assert_eq!(dispatcher.statistics().total_alerts, 1005);
    }

    #[test]
    fn test_statistics_split_recent_window() {
        let dispatcher = dispatcher();
        let now = Utc::now();
        dispatcher.record_for_test(alert(AlertLevel::Critical, "old").at(now - Duration::hours(30)));
        dispatcher.record_for_test(alert(AlertLevel::Critical, "new").at(now - Duration::hours(1)));
        dispatcher.record_for_test(alert(AlertLevel::Warning, "new").at(now - Duration::hours(2)));

        let stats = dispatcher.statistics_at(now);
        assert_eq!(stats.total_alerts, 3);
        assert_eq!(stats.alert_counts[&AlertLevel::Critical], 2);
        assert_eq!(stats.recent_total_alerts, 2);
        assert_eq!(stats.recent_alert_counts[&AlertLevel::Critical], 1);
        assert_eq!(stats.recent_alert_counts[&AlertLevel::Info], 0);
    }

    #[test]
    fn test_acknowledge_marks_stored_alert() {
        let dispatcher = dispatcher();
        let a = alert(AlertLevel::Warning, "Low Success Rate");
        let id = a.id;
        dispatcher.record_for_test(a);

        let acked = dispatcher.acknowledge(id, "oncall").unwrap();
        assert!(acked.acknowledged);
        assert_eq!(acked.acknowledged_by.as_deref(), Some("oncall"));
        assert!(acked.acknowledged_at.is_some());
        assert!(dispatcher.recent_alerts(1)[0].acknowledged);

        assert!(dispatcher.acknowledge(Uuid::new_v4(), "oncall").is_none());
    }

    #[test]
    fn test_cleanup_drops_alerts_past_retention() {
        let dispatcher = dispatcher();
        let now = Utc::now();
        dispatcher.record_for_test(alert(AlertLevel::Info, "eight").at(now - Duration::days(8)));
        dispatcher.record_for_test(alert(AlertLevel::Info, "six").at(now - Duration::days(6)));

        let summary = dispatcher.cleanup_at(now);
        assert_eq!(summary.alerts_removed, 1);
        assert_eq!(dispatcher.recent_alerts(10)[0].title, "six");
    }

    #[test]
    fn test_configuration_hides_secrets() {
        let dispatcher = AlertDispatcher::new(
            AlertingConfig {
                pagerduty_key: Some("secret".to_string()),
                webhook_url: Some(String::new()),
                ..config()
            },
            Vec::new(),
        );
        let snapshot = dispatcher.configuration();
        assert!(snapshot.pagerduty_enabled);
        assert!(!snapshot.webhook_enabled);
        assert!(!snapshot.slack_enabled);
        assert_eq!(snapshot.rate_limit_minutes, 5);
        assert!(!serde_json::to_string(&snapshot).unwrap().contains("secret"));
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let broken = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&broken)
            .await;

        let healthy = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&healthy)
            .await;

        let client = Client::new();
        let channels: Vec<Arc<dyn NotificationChannel>> = vec![
            Arc::new(WebhookChannel::new(client.clone(), format!("{}/hook", broken.uri()))),
            Arc::new(WebhookChannel::new(client, format!("{}/hook", healthy.uri()))),
        ];
        let dispatcher = AlertDispatcher::new(config(), channels);

        let (outcome, deliveries) = dispatcher
            .send_alert_and_wait(alert(AlertLevel::Warning, "X"))
            .await;
        assert_eq!(outcome, DispatchOutcome::Accepted);
        assert_eq!(deliveries.len(), 2);
        assert!(matches!(
            deliveries[0].result,
            Err(ChannelError::Status { status: 500, .. })
        ));
        assert!(deliveries[1].result.is_ok());
    }

    #[tokio::test]
    async fn test_slow_channel_times_out() {
        let slow = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(3)))
            .mount(&slow)
            .await;

        let channels: Vec<Arc<dyn NotificationChannel>> =
            vec![Arc::new(WebhookChannel::new(Client::new(), slow.uri()))];
        let dispatcher = AlertDispatcher::new(config(), channels);

        let (_, deliveries) = dispatcher
            .send_alert_and_wait(alert(AlertLevel::Info, "slow"))
            .await;
        assert!(matches!(
            deliveries[0].result,
            Err(ChannelError::Timeout { channel: "webhook", .. })
        ));
    }

    #[tokio::test]
    async fn test_incident_channel_only_receives_critical() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/enqueue"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let channel = PagerDutyChannel::new(Client::new(), "routing")
            .with_endpoint(format!("{}/v2/enqueue", server.uri()));
        let dispatcher = AlertDispatcher::new(config(), vec![Arc::new(channel)]);

        let (_, skipped) = dispatcher
            .send_alert_and_wait(alert(AlertLevel::Warning, "warn"))
            .await;
        assert!(skipped.is_empty());

        let (_, sent) = dispatcher
            .send_alert_and_wait(alert(AlertLevel::Critical, "crit"))
            .await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].result.is_ok());
    }

    #[tokio::test]
    async fn test_alerts_style_channel_authenticates_with_genie_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/alerts"))
            .and(header("authorization", "GenieKey genie"))
            .and(body_partial_json(json!({
                "priority": "P1",
                "source": "session-continuity-system",
                "description": "message",
                "tags": ["session-continuity", "session-continuity", "critical"],
                "details": { "component": "session-continuity", "level": "CRITICAL" }
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let channel = OpsGenieChannel::new(Client::new(), "genie")
            .with_endpoint(format!("{}/v2/alerts", server.uri()));
        let dispatcher = AlertDispatcher::new(config(), vec![Arc::new(channel)]);

        let (_, skipped) = dispatcher
            .send_alert_and_wait(alert(AlertLevel::Info, "info"))
            .await;
        assert!(skipped.is_empty());

        let (_, sent) = dispatcher
            .send_alert_and_wait(alert(AlertLevel::Critical, "Quality Gates Failed"))
            .await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].result.is_ok(), "{:?}", sent[0].result);
    }

    #[tokio::test]
    async fn test_send_alert_delivers_in_background() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let channels: Vec<Arc<dyn NotificationChannel>> =
            vec![Arc::new(WebhookChannel::new(Client::new(), server.uri()))];
        let dispatcher = AlertDispatcher::new(config(), channels);
        assert!(dispatcher.send_test_alert().is_accepted());

        let mut received = Vec::new();
        for _ in 0..50 {
            received = server.received_requests().await.unwrap_or_default();
            if !received.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(received.len(), 1);

        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["title"], TEST_ALERT_TITLE);
        assert_eq!(body["level"], "INFO");
        assert_eq!(body["component"], "session-continuity");
    }
}
