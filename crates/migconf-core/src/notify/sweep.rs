use crate::config::{NotificationSettings, ReminderSettings};
use crate::errors::CoreResult;
use crate::mailer::Mailer;
use crate::model::{Conference, ConferenceStatus, EmailKind, EmailStatus};
use crate::notify::alert::{Alert, AlertSink, Condition, DedupKey, Severity};
use crate::notify::ledger::DedupLedger;
use crate::storage::Store;
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    pub conferences: usize,
    pub alerts_raised: usize,
    /// Old failed emails recorded without an alert.
    pub silenced: usize,
    pub reminders_sent: usize,
    pub reminders_failed: usize,
    /// Alerts the sink rejected; their keys are released for the next sweep.
    pub sink_failures: usize,
}

/// Derives alerts and reminders from the conference set. Every alert goes
/// through the dedup ledger first, so concurrent or repeated sweeps raise
/// each condition once.
#[derive(Clone)]
pub struct NotificationEngine {
    store: Store,
    ledger: Arc<dyn DedupLedger>,
    sink: Arc<dyn AlertSink>,
    mailer: Option<Mailer>,
    settings: NotificationSettings,
    reminders: ReminderSettings,
    // Serialises reminder sending between overlapping sweeps.
    reminder_lock: Arc<tokio::sync::Mutex<()>>,
}

impl NotificationEngine {
    pub fn new(
        store: Store,
        ledger: Arc<dyn DedupLedger>,
        sink: Arc<dyn AlertSink>,
        settings: NotificationSettings,
    ) -> Self {
        Self {
            store,
            ledger,
            sink,
            mailer: None,
            settings,
            reminders: ReminderSettings {
                enabled: false,
                ..ReminderSettings::default()
            },
            reminder_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn with_reminders(mut self, mailer: Mailer, reminders: ReminderSettings) -> Self {
        self.mailer = Some(mailer);
        self.reminders = reminders;
        self
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> CoreResult<SweepReport> {
        let conferences = self.store.list_conferences()?;
        let mut report = SweepReport {
            conferences: conferences.len(),
            ..SweepReport::default()
        };

        let mut stale = 0usize;
        for conf in &conferences {
            self.check_link(conf, now, &mut report)?;
            self.check_emails(conf, now, &mut report)?;
            if conf.status == ConferenceStatus::Pending
                && now - conf.created_at > self.settings.stale_threshold()
            {
                stale += 1;
            }
        }

        if stale > 0 {
            let key = DedupKey::stale_day(now.date_naive());
            let message = format!(
                "{} conference(s) pending for more than {}h",
                stale, self.settings.stale_pending_hours
            );
            self.raise_once(&key, Severity::Info, "Stale conferences", message, now, &mut report)?;
        }

        if self.reminders.enabled && self.mailer.is_some() {
            let _guard = self.reminder_lock.lock().await;
            // Reload: another sweep may have sent reminders while we waited.
            let conferences = self.store.list_conferences()?;
            for conf in &conferences {
                if let Err(e) = self.remind(conf, now, &mut report).await {
                    report.reminders_failed += 1;
                    tracing::warn!(
                        event = "migconf.notify.reminder_failed",
                        conference_id = %conf.id,
                        error = %e,
                    );
                }
            }
        }

        tracing::info!(
            event = "migconf.notify.sweep",
            conferences = report.conferences,
            alerts = report.alerts_raised,
            silenced = report.silenced,
            reminders = report.reminders_sent,
            sink_failures = report.sink_failures,
        );
        Ok(report)
    }

    fn check_link(
        &self,
        conf: &Conference,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> CoreResult<()> {
        if conf.status == ConferenceStatus::Completed {
            return Ok(());
        }
        let remaining = conf.link_expires_at - now;
        if remaining <= Duration::zero() {
            let key = DedupKey::for_link(Condition::LinkExpired, &conf.id, conf.link_expires_at);
            let message = format!(
                "The access link of conference '{}' expired at {}",
                conf.id,
                conf.link_expires_at.to_rfc3339()
            );
            self.raise_once(&key, Severity::Error, "Access link expired", message, now, report)?;
        } else if remaining <= self.settings.warning_window() {
            let key = DedupKey::for_link(Condition::LinkExpiring, &conf.id, conf.link_expires_at);
            let message = format!(
                "The access link of conference '{}' expires in {}h",
                conf.id,
                remaining.num_hours()
            );
            self.raise_once(&key, Severity::Warning, "Access link expiring", message, now, report)?;
        }
        Ok(())
    }

    fn check_emails(
        &self,
        conf: &Conference,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> CoreResult<()> {
        let window = self.settings.email_failure_window();
        for entry in conf
            .email_history
            .iter()
            .filter(|e| e.status == EmailStatus::Failed)
        {
            let key = DedupKey::email_failure(&conf.id, &entry.id);
            if now - entry.sent_at <= window {
                let message = format!(
                    "{} email to {} failed: {}",
                    entry.kind.as_str(),
                    entry.to,
                    entry.error.as_deref().unwrap_or("unknown error")
                );
                self.raise_once(&key, Severity::Error, "Email delivery failed", message, now, report)?;
            } else if self.ledger.insert_if_absent(&key, now)? {
                report.silenced += 1;
            }
        }
        Ok(())
    }

    async fn remind(
        &self,
        conf: &Conference,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> CoreResult<()> {
        let Some(mailer) = &self.mailer else {
            return Ok(());
        };
        if conf.is_finished() || conf.link_expires_at <= now || conf.contact_address().is_none() {
            return Ok(());
        }
        let last_attempt = conf
            .email_history
            .iter()
            .filter(|e| matches!(e.kind, EmailKind::ConferenceLink | EmailKind::Reminder))
            .filter(|e| e.status != EmailStatus::Pending)
            .map(|e| e.sent_at)
            .max();
        let Some(last_attempt) = last_attempt else {
            return Ok(());
        };
        if now - last_attempt < Duration::hours(self.reminders.after_hours) {
            return Ok(());
        }

        let sent = conf
            .email_history
            .iter()
            .filter(|e| e.kind == EmailKind::Reminder && e.status == EmailStatus::Sent)
            .count();
        if sent >= self.reminders.max_reminders as usize {
            let key = DedupKey::for_link(
                Condition::RemindersExhausted,
                &conf.id,
                conf.link_expires_at,
            );
            let message = format!(
                "Conference '{}' is still open after {} reminder(s)",
                conf.id, sent
            );
            return self.raise_once(&key, Severity::Warning, "Reminders exhausted", message, now, report);
        }

        let entry = mailer.send_reminder(&conf.id, now).await?;
        if entry.status == EmailStatus::Sent {
            report.reminders_sent += 1;
        } else {
            report.reminders_failed += 1;
        }
        Ok(())
    }

    fn raise_once(
        &self,
        key: &DedupKey,
        severity: Severity,
        title: &str,
        message: String,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> CoreResult<()> {
        if !self.ledger.insert_if_absent(key, now)? {
            return Ok(());
        }
        let alert = Alert {
            key: key.value.clone(),
            severity,
            condition: key.condition,
            conference_id: key.conference_id.clone(),
            title: title.to_string(),
            message,
            created_at: now,
        };
        if let Err(e) = self.sink.raise(&alert) {
            // Release the key so a later sweep retries the alert.
            self.ledger.remove(&key.value)?;
            report.sink_failures += 1;
            tracing::warn!(
                event = "migconf.notify.sink_failed",
                key = %key.value,
                error = %e,
            );
            return Ok(());
        }
        report.alerts_raised += 1;
        Ok(())
    }

    /// Sweeps every `interval_seconds` and whenever `changes` is signalled,
    /// until `shutdown` resolves. Sweep errors are logged and the loop goes on.
    pub async fn run<F>(&self, changes: Arc<Notify>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let period = std::time::Duration::from_secs(self.settings.interval_seconds.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
                _ = changes.notified() => {}
            }
            if let Err(e) = self.sweep(Utc::now()).await {
                tracing::error!(event = "migconf.notify.sweep_failed", error = %e);
            }
        }
        tracing::info!(event = "migconf.notify.stopped");
    }
}

/// Polls the store's change marker and signals `changes` whenever it moves,
/// so writes from other processes trigger a sweep before the next tick.
pub fn spawn_change_poller(
    store: Store,
    changes: Arc<Notify>,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    let mut last = match store.last_change() {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(event = "migconf.notify.poll_failed", error = %e);
            None
        }
    };
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.last_change() {
                Ok(current) if current != last => {
                    last = current;
                    changes.notify_one();
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(event = "migconf.notify.poll_failed", error = %e),
            }
        }
    })
}
