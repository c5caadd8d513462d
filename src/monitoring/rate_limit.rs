use super::Alert;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

/// Per-key cooldown for outgoing alerts.
///
/// The key is `component:title:level`. Within the cooldown window a repeated
/// alert is suppressed and the stored timestamp is left alone, so the window
/// is measured from the last alert that actually went out.
#[derive(Debug)]
pub struct AlertRateLimiter {
    window: Duration,
    last_fired: DashMap<String, DateTime<Utc>>,
}

impl AlertRateLimiter {
    pub fn new(rate_limit_minutes: u32) -> Self {
        Self {
            window: Duration::minutes(i64::from(rate_limit_minutes)),
            last_fired: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_rate_limited(&self, alert: &Alert) -> bool {
        self.is_rate_limited_at(alert, Utc::now())
    }

    /// Check-and-set against an explicit clock. The entry guard holds the
    /// key's shard lock across the comparison and the update.
    pub fn is_rate_limited_at(&self, alert: &Alert, now: DateTime<Utc>) -> bool {
        let key = alert.rate_limit_key();
        match self.last_fired.entry(key) {
            Entry::Occupied(mut entry) => {
                if now - *entry.get() < self.window {
                    debug!(key = %entry.key(), "Alert suppressed by rate limit");
                    true
                } else {
                    entry.insert(now);
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                false
            }
        }
    }

    /// Forget keys last fired before `cutoff`
    pub fn purge_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.last_fired.len();
        self.last_fired.retain(|_, fired_at| *fired_at >= cutoff);
        before.saturating_sub(self.last_fired.len())
    }

    pub fn len(&self) -> usize {
        self.last_fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_fired.is_empty()
    }
}
