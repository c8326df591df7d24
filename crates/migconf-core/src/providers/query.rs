use crate::errors::CoreError;
use crate::model::QueryResult;
use crate::sql;
use crate::storage::Store;
use anyhow::Context;
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::collections::BTreeMap;

pub type QueryParams = BTreeMap<String, serde_json::Value>;

/// Runs a checklist query against the database behind `connection_id`.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        connection_id: &str,
        sql: &str,
        params: &QueryParams,
    ) -> anyhow::Result<QueryResult>;
}

/// Executes against SQLite files registered as connections in the store.
/// Files are opened read-only.
pub struct SqliteQueryExecutor {
    store: Store,
    max_rows: usize,
}

impl SqliteQueryExecutor {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            max_rows: 10_000,
        }
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows.max(1);
        self
    }
}

#[async_trait]
impl QueryExecutor for SqliteQueryExecutor {
    async fn execute(
        &self,
        connection_id: &str,
        sql_text: &str,
        params: &QueryParams,
    ) -> anyhow::Result<QueryResult> {
        sql::ensure_select_only(sql_text).map_err(CoreError::QueryExecution)?;
        let target = self.store.load_connection(connection_id)?;
        let path = target.path.clone();
        let sql_text = sql_text.to_string();
        let params = params.clone();
        let max_rows = self.max_rows;

        tokio::task::spawn_blocking(move || run_sqlite(&path, &sql_text, &params, max_rows))
            .await
            .context("query task panicked")?
    }
}

fn run_sqlite(
    path: &str,
    sql_text: &str,
    params: &QueryParams,
    max_rows: usize,
) -> anyhow::Result<QueryResult> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("failed to open target database {}", path))?;

    let mut stmt = conn.prepare(sql_text).context("failed to prepare query")?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    // Bind only the placeholders the statement declares.
    let mut bound: Vec<(String, rusqlite::types::Value)> = Vec::new();
    for (name, value) in params {
        let placeholder = format!(":{}", name);
        if stmt.parameter_index(&placeholder)?.is_some() {
            bound.push((placeholder, to_sql_value(value)));
        }
    }
    let named: Vec<(&str, &dyn rusqlite::ToSql)> = bound
        .iter()
        .map(|(n, v)| (n.as_str(), v as &dyn rusqlite::ToSql))
        .collect();

    let mut rows = stmt.query(named.as_slice()).context("query failed")?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        if out.len() >= max_rows {
            anyhow::bail!("query returned more than {} rows", max_rows);
        }
        let mut cells = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            cells.push(from_sql_value(row.get_ref(i)?));
        }
        out.push(cells);
    }
    Ok(QueryResult::new(columns, out))
}

fn to_sql_value(v: &serde_json::Value) -> rusqlite::types::Value {
    use rusqlite::types::Value;
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

fn from_sql_value(v: ValueRef<'_>) -> serde_json::Value {
    match v {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::json!(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(hex::encode(b)),
    }
}
