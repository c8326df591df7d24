#![allow(dead_code)]

use async_trait::async_trait;
use migconf_core::engine::{ConferenceEngine, EngineSettings, NewConference};
use migconf_core::model::*;
pub use migconf_core::model::Store as Store_;
use migconf_core::providers::query::{QueryExecutor, QueryParams, SqliteQueryExecutor};
use migconf_core::storage::Store;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::Connection;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap()
}

fn item(id: &str, query: &str, rule: ValidationRule, auto_resolve: bool) -> TemplateItem {
    TemplateItem {
        id: id.into(),
        title: id.replace('_', " "),
        query: query.into(),
        scope: Scope::Global,
        validation_rule: rule,
        expected_input_binding: None,
        auto_resolve,
    }
}

/// Three items: a global row check, a global orphan check that needs a human
/// decision, and a per-store revenue check against a client figure.
pub fn retail_template() -> ChecklistTemplate {
    let mut revenue = item(
        "revenue",
        "SELECT COALESCE(SUM(amount), 0) FROM sales \
         WHERE store_id = :store_id AND sold_on BETWEEN :date_start AND :date_end",
        ValidationRule::NumberMatchesExpectedWithTolerance { tolerance: 0.01 },
        true,
    );
    revenue.scope = Scope::PerStore;
    revenue.expected_input_binding = Some("revenue".into());

    ChecklistTemplate {
        id: "retail".into(),
        name: "Retail".into(),
        description: None,
        version: "1.0.0".into(),
        sections: vec![
            TemplateSection {
                id: "sales".into(),
                title: "Sales".into(),
                order: 2,
                items: vec![revenue],
            },
            TemplateSection {
                id: "catalog".into(),
                title: "Catalog".into(),
                order: 1,
                items: vec![
                    item(
                        "products_exist",
                        "SELECT id FROM products",
                        ValidationRule::MustReturnRows,
                        true,
                    ),
                    item(
                        "orphan_prices",
                        "SELECT p.id FROM prices p LEFT JOIN products x ON x.id = p.product_id \
                         WHERE x.id IS NULL",
                        ValidationRule::MustReturnNoRows,
                        false,
                    ),
                ],
            },
        ],
        expected_inputs: vec![ExpectedInput {
            key: "revenue".into(),
            label: "Revenue".into(),
            scope: Scope::PerStore,
            kind: InputKind::Currency,
            required: true,
        }],
        created_at: None,
        updated_at: None,
    }
}

pub fn stores() -> Vec<Store_> {
    vec![
        Store_ {
            id: "s1".into(),
            store_id: "001".into(),
            name: "Centro".into(),
        },
        Store_ {
            id: "s2".into(),
            store_id: "002".into(),
            name: "Norte".into(),
        },
    ]
}


pub fn january() -> DateRange {
    DateRange {
        start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    }
}

/// Migrated database the checklist queries run against.
pub fn target_db(dir: &Path) -> String {
    let path = dir.join("target.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE products (id INTEGER PRIMARY KEY);
         CREATE TABLE prices (id INTEGER PRIMARY KEY, product_id INTEGER);
         CREATE TABLE sales (store_id TEXT, amount REAL, sold_on TEXT);
         INSERT INTO products VALUES (1), (2);
         INSERT INTO prices VALUES (10, 1), (11, 2);
         INSERT INTO sales VALUES ('001', 100.0, '2024-01-05'), ('001', 50.5, '2024-01-20'),
                                  ('002', 200.0, '2024-01-10'), ('002', 999.0, '2024-02-03');",
    )
    .unwrap();
    path.to_string_lossy().into_owned()
}

pub fn seeded_store(target_path: &str) -> Store {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    store.save_template(&retail_template()).unwrap();
    store
        .save_connection(&DbConnection {
            id: "main".into(),
            name: "Migrated".into(),
            kind: ConnectionKind::Sqlite,
            path: target_path.into(),
        })
        .unwrap();
    store
}

pub fn sqlite_engine(store: &Store) -> ConferenceEngine {
    ConferenceEngine::new(
        store.clone(),
        Arc::new(SqliteQueryExecutor::new(store.clone())),
        Arc::new(store.clone()),
        EngineSettings::default(),
    )
}

pub fn new_conference(values: BTreeMap<String, serde_json::Value>) -> NewConference {
    NewConference {
        id: Some("conf-1".into()),
        client_name: "ACME".into(),
        template_id: "retail".into(),
        connection_id: "main".into(),
        stores: stores(),
        period: Some(january()),
        expected_input_values: values,
    }
}

pub fn client_figures() -> BTreeMap<String, serde_json::Value> {
    let mut values = BTreeMap::new();
    values.insert("revenue#s1".into(), json!(150.5));
    values.insert("revenue#s2".into(), json!("R$ 201,00"));
    values
}

/// Executor whose calls block until the test hands them a result, in call
/// order. Each call announces itself on `started`.
pub struct ScriptedExecutor {
    pending: Mutex<Vec<oneshot::Receiver<anyhow::Result<QueryResult>>>>,
    started: mpsc::UnboundedSender<String>,
}

impl ScriptedExecutor {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                pending: Mutex::new(Vec::new()),
                started: tx,
            },
            rx,
        )
    }

    /// Queues a slot for the next call and returns its completion handle.
    pub fn slot(&self) -> oneshot::Sender<anyhow::Result<QueryResult>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().push(rx);
        tx
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        _connection_id: &str,
        sql: &str,
        _params: &QueryParams,
    ) -> anyhow::Result<QueryResult> {
        let rx = {
            let mut pending = self.pending.lock().unwrap();
            if pending.is_empty() {
                anyhow::bail!("no scripted result left");
            }
            pending.remove(0)
        };
        let _ = self.started.send(sql.to_string());
        rx.await.map_err(|_| anyhow::anyhow!("script dropped"))?
    }
}
