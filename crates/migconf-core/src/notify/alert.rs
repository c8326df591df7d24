use crate::errors::CoreResult;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    LinkExpired,
    LinkExpiring,
    EmailFailed,
    StalePending,
    RemindersExhausted,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::LinkExpired => "link_expired",
            Condition::LinkExpiring => "link_expiring",
            Condition::EmailFailed => "email_failed",
            Condition::StalePending => "stale_pending",
            Condition::RemindersExhausted => "reminders_exhausted",
        }
    }

    /// Conditions whose dedup keys are dropped when a link is regenerated.
    pub const LINK: &'static [Condition] = &[
        Condition::LinkExpired,
        Condition::LinkExpiring,
        Condition::RemindersExhausted,
    ];
}

/// Identity of an alert for deduplication purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub value: String,
    pub condition: Condition,
    pub conference_id: Option<String>,
}

impl DedupKey {
    /// Key tied to one link of a conference. A sweep that read the previous
    /// link cannot suppress alerts for the regenerated one.
    pub fn for_link(
        condition: Condition,
        conference_id: &str,
        link_expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            value: format!(
                "{}:{}:{}",
                condition.as_str(),
                conference_id,
                link_expires_at.to_rfc3339()
            ),
            condition,
            conference_id: Some(conference_id.to_string()),
        }
    }

    pub fn email_failure(conference_id: &str, entry_id: &str) -> Self {
        Self {
            value: format!("{}:{}:{}", Condition::EmailFailed.as_str(), conference_id, entry_id),
            condition: Condition::EmailFailed,
            conference_id: Some(conference_id.to_string()),
        }
    }

    pub fn stale_day(day: NaiveDate) -> Self {
        Self {
            value: format!("{}:{}", Condition::StalePending.as_str(), day.format("%Y-%m-%d")),
            condition: Condition::StalePending,
            conference_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub key: String,
    pub severity: Severity,
    pub condition: Condition,
    pub conference_id: Option<String>,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Destination of raised alerts (alert center, toast feed, log).
pub trait AlertSink: Send + Sync {
    fn raise(&self, alert: &Alert) -> CoreResult<()>;
}

/// Emits alerts as structured log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AlertSink for TracingSink {
    fn raise(&self, alert: &Alert) -> CoreResult<()> {
        match alert.severity {
            Severity::Error => tracing::error!(
                event = "migconf.alert.raised",
                key = %alert.key,
                conference_id = alert.conference_id.as_deref().unwrap_or(""),
                "{}: {}", alert.title, alert.message
            ),
            Severity::Warning => tracing::warn!(
                event = "migconf.alert.raised",
                key = %alert.key,
                conference_id = alert.conference_id.as_deref().unwrap_or(""),
                "{}: {}", alert.title, alert.message
            ),
            Severity::Info => tracing::info!(
                event = "migconf.alert.raised",
                key = %alert.key,
                conference_id = alert.conference_id.as_deref().unwrap_or(""),
                "{}: {}", alert.title, alert.message
            ),
        }
        Ok(())
    }
}

/// Keeps raised alerts in memory, newest last.
#[derive(Debug, Default)]
pub struct CollectingSink {
    alerts: Mutex<Vec<Alert>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn count(&self, condition: Condition) -> usize {
        self.alerts()
            .iter()
            .filter(|a| a.condition == condition)
            .count()
    }
}

impl AlertSink for CollectingSink {
    fn raise(&self, alert: &Alert) -> CoreResult<()> {
        if let Ok(mut a) = self.alerts.lock() {
            a.push(alert.clone());
        }
        Ok(())
    }
}

/// Fans one alert out to several sinks; a failing sink does not stop the rest.
pub struct FanoutSink {
    sinks: Vec<std::sync::Arc<dyn AlertSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn AlertSink>>) -> Self {
        Self { sinks }
    }
}

impl AlertSink for FanoutSink {
    fn raise(&self, alert: &Alert) -> CoreResult<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.raise(alert) {
                tracing::warn!(event = "migconf.alert.sink_failed", key = %alert.key, error = %e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
