use super::HealthStatus;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const MAX_RECENT_EVENTS: usize = 100;
pub const MAX_ALERT_HISTORY: usize = 1000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitoringEventType {
    Info,
    Warning,
    Error,
    StatusChange,
    Alert,
}

/// Status pair carried by `STATUS_CHANGE` events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: HealthStatus,
    pub to: HealthStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringEvent {
    #[serde(rename = "type")]
    pub event_type: MonitoringEventType,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<StatusTransition>,
}

impl MonitoringEvent {
    pub fn new(event_type: MonitoringEventType, message: impl Into<String>) -> Self {
        Self {
            event_type,
            message: message.into(),
            timestamp: Utc::now(),
            component: None,
            transition: None,
        }
    }

    pub fn status_change(from: HealthStatus, to: HealthStatus) -> Self {
        Self {
            transition: Some(StatusTransition { from, to }),
            ..Self::new(
                MonitoringEventType::StatusChange,
                format!("System status changed from {from} to {to}"),
            )
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Append-only log that keeps the newest `capacity` entries. Append and trim
/// happen under one lock so concurrent appenders never overshoot the cap.
#[derive(Debug)]
pub struct BoundedLog<T> {
    entries: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> BoundedLog<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, entry: T) {
        let mut entries = self.entries.lock();
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Newest `limit` entries, oldest first
    pub fn recent(&self, limit: usize) -> Vec<T> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Drop every entry for which `keep` is false, returning how many went
    pub fn retain<F>(&self, keep: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(keep);
        before - entries.len()
    }

    /// Apply `update` to the newest entry matching `predicate`
    pub fn update_last<P, U, R>(&self, predicate: P, update: U) -> Option<R>
    where
        P: Fn(&T) -> bool,
        U: FnOnce(&mut T) -> R,
    {
        let mut entries = self.entries.lock();
        entries.iter_mut().rev().find(|e| predicate(&**e)).map(update)
    }

    pub fn count_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&T) -> bool,
    {
        self.entries.lock().iter().filter(|e| predicate(*e)).count()
    }
}

/// Ring buffer of the most recent monitoring events
#[derive(Debug)]
pub struct EventLog {
    events: BoundedLog<MonitoringEvent>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: BoundedLog::new(MAX_RECENT_EVENTS),
        }
    }

    pub fn record(&self, event: MonitoringEvent) {
        self.events.push(event);
    }

    pub fn recent(&self, limit: usize) -> Vec<MonitoringEvent> {
        self.events.recent(limit)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn count_since(&self, event_type: MonitoringEventType, since: DateTime<Utc>) -> usize {
        self.events
            .count_where(|e| e.event_type == event_type && e.timestamp > since)
    }
}
