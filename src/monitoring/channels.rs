//! Outbound notification channels.
//!
//! Every external endpoint implements [`NotificationChannel`]; the dispatcher
//! only iterates the configured list. Severity wording for each vendor comes
//! from one lookup table keyed by [`AlertLevel`].

use super::{Alert, AlertLevel, ALERT_SOURCE, MONITOR_COMPONENT};
use crate::config::AlertingConfig;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

pub const PAGERDUTY_EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";
pub const OPSGENIE_ALERTS_URL: &str = "https://api.opsgenie.com/v2/alerts";

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{channel} responded with status {status}")]
    Status { channel: &'static str, status: u16 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{channel} did not answer within {seconds}s")]
    Timeout { channel: &'static str, seconds: u64 },

    #[error("Email delivery failed: {0}")]
    Email(String),
}

/// Vendor wording for one severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityVocabulary {
    pub chat_color: &'static str,
    pub events_severity: &'static str,
    pub alerts_priority: &'static str,
}

const SEVERITY_VOCABULARY: [SeverityVocabulary; 3] = [
    // INFO
    SeverityVocabulary {
        chat_color: "good",
        events_severity: "info",
        alerts_priority: "P5",
    },
    // WARNING
    SeverityVocabulary {
        chat_color: "warning",
        events_severity: "warning",
        alerts_priority: "P3",
    },
    // CRITICAL
    SeverityVocabulary {
        chat_color: "danger",
        events_severity: "critical",
        alerts_priority: "P1",
    },
];

impl AlertLevel {
    pub fn vocabulary(&self) -> &'static SeverityVocabulary {
        &SEVERITY_VOCABULARY[self.index()]
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this channel wants the alert at all
    fn accepts(&self, _alert: &Alert) -> bool {
        true
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), ChannelError>;
}

/// Email transport. Delivery belongs to the host application; the monitor
/// only decides when to call it.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<(), ChannelError>;
}

/// Email sender that only writes the alert to the log
#[derive(Debug, Default, Clone)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, subject: &str, body: &str) -> Result<(), ChannelError> {
        info!("Email alert would be sent: {} - {}", subject, body);
        Ok(())
    }
}

async fn post_json<T>(
    client: &Client,
    channel: &'static str,
    url: &str,
    body: &T,
    authorization: Option<String>,
) -> Result<(), ChannelError>
where
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_vec(body)?;
    let mut request = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .body(payload);
    if let Some(value) = authorization {
        request = request.header(AUTHORIZATION, value);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ChannelError::Status {
            channel,
            status: status.as_u16(),
        });
    }
    Ok(())
}

fn alert_summary(alert: &Alert) -> String {
    format!("Session Continuity Alert: {}", alert.title)
}

// ---------------------------------------------------------------------------
// Chat (Slack-compatible incoming webhook)

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub color: String,
    pub attachments: Vec<ChatAttachment>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatAttachment {
    pub title: String,
    pub text: String,
    pub color: String,
    pub fields: Vec<ChatField>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

pub struct SlackChannel {
    client: Client,
    webhook_url: String,
}

impl SlackChannel {
    pub fn new(client: Client, webhook_url: impl Into<String>) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
        }
    }

    pub fn message_for(alert: &Alert) -> ChatMessage {
        let color = alert.level.vocabulary().chat_color.to_string();
        let field = |title: &str, value: String| ChatField {
            title: title.to_string(),
            value,
            short: true,
        };

        ChatMessage {
            color: color.clone(),
            attachments: vec![ChatAttachment {
                title: alert_summary(alert),
                text: alert.message.clone(),
                color,
                fields: vec![
                    field("Level", alert.level.to_string()),
                    field("Component", alert.component.clone()),
                    field(
                        "Time",
                        alert.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
                    ),
                ],
            }],
        }
    }
}

#[async_trait]
impl NotificationChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), ChannelError> {
        post_json(
            &self.client,
            self.name(),
            &self.webhook_url,
            &Self::message_for(alert),
            None,
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Generic webhook

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub alert_id: String,
    pub title: String,
    pub message: String,
    pub level: String,
    pub component: String,
    pub timestamp: String,
    pub source: String,
}

pub struct WebhookChannel {
    client: Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Each delivery carries its own freshly generated identifier
    pub fn payload_for(alert: &Alert) -> WebhookPayload {
        WebhookPayload {
            alert_id: Uuid::new_v4().to_string(),
            title: alert.title.clone(),
            message: alert.message.clone(),
            level: alert.level.to_string(),
            component: alert.component.clone(),
            timestamp: alert.timestamp.to_rfc3339(),
            source: ALERT_SOURCE.to_string(),
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), ChannelError> {
        post_json(
            &self.client,
            self.name(),
            &self.url,
            &Self::payload_for(alert),
            None,
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Incident management, events style (PagerDuty v2)

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PagerDutyEvent {
    pub routing_key: String,
    pub event_action: String,
    pub payload: PagerDutyPayload,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PagerDutyPayload {
    pub summary: String,
    pub source: String,
    pub severity: String,
    pub component: String,
    pub custom_details: PagerDutyDetails,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PagerDutyDetails {
    pub message: String,
    pub timestamp: String,
    pub level: String,
}

pub struct PagerDutyChannel {
    client: Client,
    routing_key: String,
    endpoint: String,
}

impl PagerDutyChannel {
    pub fn new(client: Client, routing_key: impl Into<String>) -> Self {
        Self {
            client,
            routing_key: routing_key.into(),
            endpoint: PAGERDUTY_EVENTS_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn event_for(&self, alert: &Alert) -> PagerDutyEvent {
        PagerDutyEvent {
            routing_key: self.routing_key.clone(),
            event_action: "trigger".to_string(),
            payload: PagerDutyPayload {
                summary: alert_summary(alert),
                source: ALERT_SOURCE.to_string(),
                severity: alert.level.vocabulary().events_severity.to_string(),
                component: alert.component.clone(),
                custom_details: PagerDutyDetails {
                    message: alert.message.clone(),
                    timestamp: alert.timestamp.to_rfc3339(),
                    level: alert.level.to_string(),
                },
            },
        }
    }
}

#[async_trait]
impl NotificationChannel for PagerDutyChannel {
    fn name(&self) -> &'static str {
        "pagerduty"
    }

    fn accepts(&self, alert: &Alert) -> bool {
        alert.level == AlertLevel::Critical
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), ChannelError> {
        post_json(
            &self.client,
            self.name(),
            &self.endpoint,
            &self.event_for(alert),
            None,
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Incident management, alerts style (OpsGenie v2)

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OpsGenieAlert {
    pub message: String,
    pub description: String,
    pub priority: String,
    pub source: String,
    pub details: OpsGenieDetails,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OpsGenieDetails {
    pub component: String,
    pub level: String,
    pub timestamp: String,
}

pub struct OpsGenieChannel {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl OpsGenieChannel {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            endpoint: OPSGENIE_ALERTS_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn alert_for(alert: &Alert) -> OpsGenieAlert {
        OpsGenieAlert {
            message: alert_summary(alert),
            description: alert.message.clone(),
            priority: alert.level.vocabulary().alerts_priority.to_string(),
            source: ALERT_SOURCE.to_string(),
            details: OpsGenieDetails {
                component: alert.component.clone(),
                level: alert.level.to_string(),
                timestamp: alert.timestamp.to_rfc3339(),
            },
            tags: vec![
                MONITOR_COMPONENT.to_string(),
                alert.component.clone(),
                alert.level.as_str().to_lowercase(),
            ],
        }
    }
}

#[async_trait]
impl NotificationChannel for OpsGenieChannel {
    fn name(&self) -> &'static str {
        "opsgenie"
    }

    fn accepts(&self, alert: &Alert) -> bool {
        alert.level == AlertLevel::Critical
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), ChannelError> {
        post_json(
            &self.client,
            self.name(),
            &self.endpoint,
            &Self::alert_for(alert),
            Some(format!("GenieKey {}", self.api_key)),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Email

pub struct EmailChannel {
    sender: Arc<dyn EmailSender>,
}

impl EmailChannel {
    pub fn new(sender: Arc<dyn EmailSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), ChannelError> {
        self.sender
            .send(&alert_summary(alert), &alert.message)
            .await
    }
}

/// Channels enabled by the configuration, in a stable order
pub fn build_channels(
    config: &AlertingConfig,
    client: Client,
    email_sender: Arc<dyn EmailSender>,
) -> Vec<Arc<dyn NotificationChannel>> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();

    if let Some(url) = non_empty(&config.slack_webhook_url) {
        channels.push(Arc::new(SlackChannel::new(client.clone(), url)));
    }
    if config.email_enabled {
        channels.push(Arc::new(EmailChannel::new(email_sender)));
    }
    if let Some(url) = non_empty(&config.webhook_url) {
        channels.push(Arc::new(WebhookChannel::new(client.clone(), url)));
    }
    if let Some(key) = non_empty(&config.pagerduty_key) {
        channels.push(Arc::new(PagerDutyChannel::new(client.clone(), key)));
    }
    if let Some(key) = non_empty(&config.opsgenie_key) {
        channels.push(Arc::new(OpsGenieChannel::new(client, key)));
    }

    debug!(
        channels = ?channels.iter().map(|c| c.name()).collect::<Vec<_>>(),
        "Notification channels configured"
    );
    channels
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
