mod common;

use common::*;
use migconf_core::model::{ConferenceStatus, DbConnection};
use migconf_core::notify::{Alert, AlertSink, Condition, Severity};
use migconf_core::storage::Store;

#[test]
fn records_survive_reopen() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db = dir.path().join("state").join("migconf.db");

    {
        let store = Store::open(&db)?;
        store.init_schema()?;
        store.save_template(&retail_template())?;
        store.save_connection(&DbConnection {
            id: "main".into(),
            name: "Migrated".into(),
            kind: Default::default(),
            path: "target.db".into(),
        })?;
        let engine = sqlite_engine(&store);
        engine.create_conference(new_conference(client_figures()), t0())?;
        store.raise(&Alert {
            key: "link_expired:conf-1".into(),
            severity: Severity::Error,
            condition: Condition::LinkExpired,
            conference_id: Some("conf-1".into()),
            title: "Access link expired".into(),
            message: "expired".into(),
            created_at: t0(),
        })?;
    }

    let store = Store::open(&db)?;
    store.init_schema()?;
    let stats = store.stats()?;
    assert_eq!(stats.templates, 1);
    assert_eq!(stats.connections, 1);
    assert_eq!(stats.conferences, 1);
    assert_eq!(stats.alerts, 1);

    let conf = store.load_conference("conf-1")?;
    assert_eq!(conf.status, ConferenceStatus::Pending);
    assert_eq!(conf.items.len(), 4);
    assert_eq!(
        store.find_conference_by_token(&conf.link_token)?.map(|c| c.id),
        Some("conf-1".to_string())
    );
    assert_eq!(store.template_usage("retail")?, 1);
    assert_eq!(
        store.template_fingerprint("retail")?,
        conf.template_fingerprint
    );

    let alerts = store.list_alerts(10)?;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].condition, Condition::LinkExpired);
    assert_eq!(alerts[0].created_at, t0());
    Ok(())
}

#[test]
fn update_is_all_or_nothing() -> anyhow::Result<()> {
    let store = seeded_store("unused.db");
    let engine = sqlite_engine(&store);
    engine.create_conference(new_conference(client_figures()), t0())?;

    let res: Result<(), _> = store.update_conference("conf-1", |c| {
        c.client_name = "changed".into();
        Err(migconf_core::errors::CoreError::Config("abort".into()))
    });
    assert!(res.is_err());
    assert_eq!(store.load_conference("conf-1")?.client_name, "ACME");
    Ok(())
}
