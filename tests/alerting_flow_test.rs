mod common;

use common::StubProbes;
use continuity_monitor::monitoring::{
    AlertLevel, DispatchOutcome, LogEmailSender, MonitoringEventType, MonitoringService,
    ALERTS_TRIGGERED,
};
use continuity_monitor::Config;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing_test::traced_test;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_sink(server: &MockServer, route: &str) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.alerting.slack_webhook_url = Some(format!("{}/slack", server.uri()));
    config.alerting.webhook_url = Some(format!("{}/hook", server.uri()));
    config.alerting.channel_timeout_seconds = 2;
    config
}

/// Poll until the mock has seen `count` requests on `route`
async fn wait_for_requests(server: &MockServer, route: &str, count: usize) -> Vec<Value> {
    for _ in 0..100 {
        let bodies: Vec<Value> = server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == route)
            .filter_map(|r| serde_json::from_slice(&r.body).ok())
            .collect();
        if bodies.len() >= count {
            return bodies;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {count} requests on {route}");
}

#[tokio::test]
async fn test_unhealthy_check_reaches_every_channel() {
    let server = MockServer::start().await;
    mount_sink(&server, "/slack").await;
    mount_sink(&server, "/hook").await;

    let stub = StubProbes::broken();
    let service = MonitoringService::from_config(
        &config_for(&server),
        common::probes(&stub),
        Arc::new(LogEmailSender),
    )
    .unwrap();
    assert_eq!(service.dispatcher().channel_names(), vec!["slack", "webhook"]);

    service.perform_health_check().await;

    let hooks = wait_for_requests(&server, "/hook", 2).await;
    let titles: Vec<&str> = hooks.iter().filter_map(|b| b["title"].as_str()).collect();
    assert!(titles.contains(&"System Health Critical"));
    assert!(titles.contains(&"Session Capture Failed"));
    assert!(hooks.iter().all(|b| b["level"] == "CRITICAL"));
    assert!(hooks.iter().all(|b| b["source"] == "session-continuity-system"));

    let chats = wait_for_requests(&server, "/slack", 2).await;
    assert!(chats
        .iter()
        .all(|b| b["attachments"][0]["color"] == "danger"));

    assert_eq!(service.counters().get(ALERTS_TRIGGERED), 2);
}

#[tokio::test]
#[traced_test]
async fn test_repeated_failure_is_suppressed_within_cooldown() {
    let stub = StubProbes::broken();
    let service = MonitoringService::from_config(
        &Config::default(),
        common::probes(&stub),
        Arc::new(LogEmailSender),
    )
    .unwrap();

    service.perform_health_check().await;
    service.perform_health_check().await;

    assert_eq!(service.dispatcher().history_len(), 2);
    assert_eq!(service.counters().get(ALERTS_TRIGGERED), 2);
    assert!(logs_contain("Alert rate limited"));

    let alert_events = service
        .recent_events(100)
        .into_iter()
        .filter(|e| e.event_type == MonitoringEventType::Alert)
        .count();
    assert_eq!(alert_events, 2);

    // Component failures alert on their own; only failed jobs are ERROR events
    assert!(service
        .recent_events(100)
        .iter()
        .all(|e| e.event_type != MonitoringEventType::Error));
}

#[tokio::test]
async fn test_disabled_alerting_still_counts_triggers() {
    let mut config = Config::default();
    config.alerting.enabled = false;

    let stub = StubProbes::broken();
    let service =
        MonitoringService::from_config(&config, common::probes(&stub), Arc::new(LogEmailSender))
            .unwrap();

    let outcome = service.trigger_alert(AlertLevel::Warning, "Manual", "operator check");
    assert_eq!(outcome, DispatchOutcome::Disabled);
    assert_eq!(service.dispatcher().history_len(), 0);
    assert_eq!(service.counters().get(ALERTS_TRIGGERED), 1);
}
