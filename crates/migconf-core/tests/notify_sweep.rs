mod common;

use chrono::{DateTime, Duration, Utc};
use common::*;
use migconf_core::config::{NotificationSettings, ReminderSettings};
use migconf_core::errors::{CoreError, CoreResult};
use migconf_core::link;
use migconf_core::mailer::Mailer;
use migconf_core::model::{ConnectionKind, DbConnection, EmailStatus};
use migconf_core::notify::{
    spawn_change_poller, Alert, AlertSink, CollectingSink, Condition, DedupKey, DedupLedger,
    NotificationEngine,
};
use migconf_core::providers::email::RecordingSender;
use migconf_core::storage::Store;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn notifier(store: &Store, sink: &Arc<CollectingSink>) -> NotificationEngine {
    NotificationEngine::new(
        store.clone(),
        Arc::new(store.clone()),
        sink.clone(),
        NotificationSettings::default(),
    )
}

#[tokio::test]
async fn expiration_alerts_fire_once_per_link() -> anyhow::Result<()> {
    let store = seeded_store("unused.db");
    let engine = sqlite_engine(&store);
    engine.create_conference(new_conference(client_figures()), t0())?;
    let sink = Arc::new(CollectingSink::new());
    let n = notifier(&store, &sink);

    n.sweep(t0() + Duration::days(6) + Duration::hours(1)).await?;
    n.sweep(t0() + Duration::days(6) + Duration::hours(2)).await?;
    assert_eq!(sink.count(Condition::LinkExpiring), 1);
    assert_eq!(sink.count(Condition::LinkExpired), 0);

    n.sweep(t0() + Duration::days(7)).await?;
    n.sweep(t0() + Duration::days(7) + Duration::hours(1)).await?;
    assert_eq!(sink.count(Condition::LinkExpired), 1);

    // A new link re-arms both link alerts.
    let regenerated_at = t0() + Duration::days(7) + Duration::hours(1);
    engine.regenerate_link("conf-1", regenerated_at)?;
    n.sweep(regenerated_at + Duration::hours(1)).await?;
    assert_eq!(sink.count(Condition::LinkExpired), 1);

    n.sweep(regenerated_at + Duration::days(6) + Duration::hours(2)).await?;
    assert_eq!(sink.count(Condition::LinkExpiring), 2);
    n.sweep(regenerated_at + Duration::days(7)).await?;
    assert_eq!(sink.count(Condition::LinkExpired), 2);
    Ok(())
}

/// Regenerates the link of the conference right before the first expiry
/// key is recorded, as a concurrent admin action would.
struct RegenerateBeforeInsert {
    store: Store,
    at: DateTime<Utc>,
    fired: AtomicBool,
}

impl DedupLedger for RegenerateBeforeInsert {
    fn insert_if_absent(&self, key: &DedupKey, now: DateTime<Utc>) -> CoreResult<bool> {
        if key.condition == Condition::LinkExpired && !self.fired.swap(true, Ordering::SeqCst) {
            link::regenerate(&self.store, &self.store, "conf-1", 7, self.at)?;
        }
        self.store.insert_if_absent(key, now)
    }

    fn contains(&self, key: &str) -> CoreResult<bool> {
        self.store.contains(key)
    }

    fn remove(&self, key: &str) -> CoreResult<bool> {
        self.store.remove(key)
    }

    fn clear(&self, conference_id: &str, conditions: &[Condition]) -> CoreResult<usize> {
        self.store.clear(conference_id, conditions)
    }
}

#[tokio::test]
async fn regeneration_during_a_sweep_keeps_the_new_link_armed() -> anyhow::Result<()> {
    let store = seeded_store("unused.db");
    let engine = sqlite_engine(&store);
    engine.create_conference(new_conference(client_figures()), t0())?;
    let sink = Arc::new(CollectingSink::new());
    let regenerated_at = t0() + Duration::days(8);
    let n = NotificationEngine::new(
        store.clone(),
        Arc::new(RegenerateBeforeInsert {
            store: store.clone(),
            at: regenerated_at,
            fired: AtomicBool::new(false),
        }),
        sink.clone(),
        NotificationSettings::default(),
    );

    // The sweep read the old link; its key lands after the regeneration.
    n.sweep(regenerated_at).await?;
    assert_eq!(sink.count(Condition::LinkExpired), 1);
    let conf = store.load_conference("conf-1")?;
    assert_eq!(conf.link_expires_at, regenerated_at + Duration::days(7));

    n.sweep(conf.link_expires_at + Duration::hours(1)).await?;
    assert_eq!(sink.count(Condition::LinkExpired), 2);
    Ok(())
}

/// Rejects the first alert of one conference, then delivers normally.
struct FlakySink {
    inner: CollectingSink,
    conference_id: &'static str,
    failed: AtomicBool,
}

impl AlertSink for FlakySink {
    fn raise(&self, alert: &Alert) -> CoreResult<()> {
        if alert.conference_id.as_deref() == Some(self.conference_id)
            && !self.failed.swap(true, Ordering::SeqCst)
        {
            return Err(CoreError::Storage("alert center unavailable".into()));
        }
        self.inner.raise(alert)
    }
}

#[tokio::test]
async fn sink_failure_is_retried_and_does_not_stop_the_sweep() -> anyhow::Result<()> {
    let store = seeded_store("unused.db");
    let engine = sqlite_engine(&store);
    engine.create_conference(new_conference(client_figures()), t0())?;
    let mut other = new_conference(client_figures());
    other.id = Some("conf-2".into());
    engine.create_conference(other, t0())?;
    let sink = Arc::new(FlakySink {
        inner: CollectingSink::new(),
        conference_id: "conf-1",
        failed: AtomicBool::new(false),
    });
    let n = NotificationEngine::new(
        store.clone(),
        Arc::new(store.clone()),
        sink.clone(),
        NotificationSettings::default(),
    );

    let at = t0() + Duration::days(8);
    let report = n.sweep(at).await?;
    assert_eq!(report.sink_failures, 1);
    let expired = |sink: &FlakySink| -> Vec<Option<String>> {
        sink.inner
            .alerts()
            .into_iter()
            .filter(|a| a.condition == Condition::LinkExpired)
            .map(|a| a.conference_id)
            .collect()
    };
    assert_eq!(expired(&sink), vec![Some("conf-2".to_string())]);

    n.sweep(at + Duration::minutes(1)).await?;
    n.sweep(at + Duration::minutes(2)).await?;
    let mut delivered = expired(&sink);
    delivered.sort();
    assert_eq!(
        delivered,
        vec![Some("conf-1".to_string()), Some("conf-2".to_string())]
    );
    Ok(())
}

#[tokio::test]
async fn concurrent_sweeps_raise_each_alert_once() -> anyhow::Result<()> {
    let store = seeded_store("unused.db");
    let engine = sqlite_engine(&store);
    engine.create_conference(new_conference(client_figures()), t0())?;
    let sink = Arc::new(CollectingSink::new());
    let n = notifier(&store, &sink);

    let at = t0() + Duration::days(8);
    let (a, b) = tokio::join!(n.sweep(at), n.sweep(at));
    assert_eq!(a?.alerts_raised + b?.alerts_raised, 2);
    assert_eq!(sink.count(Condition::LinkExpired), 1);
    assert_eq!(sink.count(Condition::StalePending), 1);
    Ok(())
}

#[tokio::test]
async fn stale_pending_summary_is_daily() -> anyhow::Result<()> {
    let store = seeded_store("unused.db");
    let engine = sqlite_engine(&store);
    engine.create_conference(new_conference(client_figures()), t0())?;
    let mut other = new_conference(client_figures());
    other.id = Some("conf-2".into());
    engine.create_conference(other, t0())?;
    let sink = Arc::new(CollectingSink::new());
    let n = notifier(&store, &sink);

    n.sweep(t0() + Duration::hours(47)).await?;
    assert_eq!(sink.count(Condition::StalePending), 0);

    n.sweep(t0() + Duration::hours(49)).await?;
    n.sweep(t0() + Duration::hours(50)).await?;
    let stale: Vec<_> = sink
        .alerts()
        .into_iter()
        .filter(|a| a.condition == Condition::StalePending)
        .collect();
    assert_eq!(stale.len(), 1);
    assert!(stale[0].message.starts_with("2 conference(s)"));
    assert_eq!(stale[0].key, "stale_pending:2024-02-03");

    n.sweep(t0() + Duration::hours(73)).await?;
    assert_eq!(sink.count(Condition::StalePending), 2);
    Ok(())
}

#[tokio::test]
async fn failed_emails_alert_only_while_recent() -> anyhow::Result<()> {
    let store = seeded_store("unused.db");
    let engine = sqlite_engine(&store);
    engine.create_conference(new_conference(client_figures()), t0())?;
    let mailer = Mailer::new(store.clone(), Arc::new(RecordingSender::failing()), "https://x.test");
    let sink = Arc::new(CollectingSink::new());
    let n = notifier(&store, &sink);

    let entry = mailer
        .send_conference_link("conf-1", "ana@client.com", t0())
        .await?;
    assert_eq!(entry.status, EmailStatus::Failed);
    assert!(entry.error.unwrap_or_default().contains("transport unavailable"));

    // Too old to alert about: recorded silently.
    let report = n.sweep(t0() + Duration::minutes(10)).await?;
    assert_eq!(report.silenced, 1);
    assert_eq!(sink.count(Condition::EmailFailed), 0);

    let retry_at = t0() + Duration::minutes(10);
    mailer
        .send_conference_link("conf-1", "ana@client.com", retry_at)
        .await?;
    n.sweep(retry_at + Duration::minutes(1)).await?;
    n.sweep(retry_at + Duration::minutes(2)).await?;
    assert_eq!(sink.count(Condition::EmailFailed), 1);

    // The conference itself is untouched by delivery failures.
    let conf = store.load_conference("conf-1")?;
    assert_eq!(conf.email_history.len(), 2);
    assert_eq!(conf.items.len(), 4);
    Ok(())
}

#[tokio::test]
async fn reminders_escalate_then_stop() -> anyhow::Result<()> {
    let store = seeded_store("unused.db");
    let engine = sqlite_engine(&store);
    engine.create_conference(new_conference(client_figures()), t0())?;
    let sender = Arc::new(RecordingSender::new());
    let mailer = Mailer::new(store.clone(), sender.clone(), "https://x.test/");
    let sink = Arc::new(CollectingSink::new());
    let n = notifier(&store, &sink).with_reminders(
        mailer.clone(),
        ReminderSettings {
            enabled: true,
            after_hours: 48,
            max_reminders: 1,
        },
    );

    mailer
        .send_conference_link("conf-1", "ana@client.com", t0())
        .await?;
    assert!(sender.sent()[0].text.contains("https://x.test/c/"));

    assert_eq!(n.sweep(t0() + Duration::hours(1)).await?.reminders_sent, 0);
    assert_eq!(n.sweep(t0() + Duration::hours(49)).await?.reminders_sent, 1);
    assert_eq!(n.sweep(t0() + Duration::hours(50)).await?.reminders_sent, 0);
    assert_eq!(sender.sent().len(), 2);
    assert_eq!(sender.sent()[1].to, "ana@client.com");

    n.sweep(t0() + Duration::hours(98)).await?;
    n.sweep(t0() + Duration::hours(99)).await?;
    assert_eq!(sink.count(Condition::RemindersExhausted), 1);
    assert_eq!(sender.sent().len(), 2);
    Ok(())
}

#[tokio::test]
async fn deletion_drops_dedup_keys() -> anyhow::Result<()> {
    let store = seeded_store("unused.db");
    let engine = sqlite_engine(&store);
    engine.create_conference(new_conference(client_figures()), t0())?;
    let sink = Arc::new(CollectingSink::new());
    let n = notifier(&store, &sink);

    n.sweep(t0() + Duration::days(8)).await?;
    let expires_at = store.load_conference("conf-1")?.link_expires_at;
    let key = DedupKey::for_link(Condition::LinkExpired, "conf-1", expires_at);
    assert!(store.contains(&key.value)?);
    assert!(engine.delete_conference("conf-1")?);
    assert!(!store.contains(&key.value)?);
    assert!(!engine.delete_conference("conf-1")?);
    Ok(())
}

#[tokio::test]
async fn watch_loop_sweeps_on_change() -> anyhow::Result<()> {
    let store = seeded_store("unused.db");
    let engine = sqlite_engine(&store);
    let sink = Arc::new(CollectingSink::new());
    let n = notifier(&store, &sink);

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let changes = engine.changes();
    let task = tokio::spawn(async move {
        n.run(changes, async {
            stopped.await.ok();
        })
        .await
    });

    // Already expired when created: the change signal triggers a sweep.
    engine.create_conference(
        new_conference(client_figures()),
        Utc::now() - Duration::days(8),
    )?;
    let mut waited = 0;
    while sink.count(Condition::LinkExpired) == 0 && waited < 100 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        waited += 1;
    }
    assert_eq!(sink.count(Condition::LinkExpired), 1);

    stop.send(()).ok();
    task.await?;
    Ok(())
}

#[tokio::test]
async fn poller_signals_writes_from_another_handle() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db = dir.path().join("migconf.db");
    let watcher = Store::open(&db)?;
    watcher.init_schema()?;
    watcher.save_template(&retail_template())?;
    watcher.save_connection(&DbConnection {
        id: "main".into(),
        name: "Migrated".into(),
        kind: ConnectionKind::Sqlite,
        path: "unused.db".into(),
    })?;
    let changes = Arc::new(tokio::sync::Notify::new());
    let poller = spawn_change_poller(
        watcher.clone(),
        changes.clone(),
        std::time::Duration::from_millis(20),
    );

    // A second process writes through its own connection.
    let writer = Store::open(&db)?;
    let engine = sqlite_engine(&writer);
    engine.create_conference(new_conference(client_figures()), t0())?;

    let signalled =
        tokio::time::timeout(std::time::Duration::from_secs(2), changes.notified()).await;
    poller.abort();
    assert!(signalled.is_ok());
    Ok(())
}
