use crate::errors::{CoreError, CoreResult};
use crate::fingerprint::template_fingerprint;
use crate::model::{ChecklistTemplate, Conference, DbConnection};
use crate::notify::alert::{Alert, AlertSink, Condition, DedupKey};
use crate::notify::ledger::DedupLedger;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Keyed-record store. Records are kept as JSON bodies; the columns next to
/// them exist for lookups only.
#[derive(Clone)]
pub struct Store {
    pub conn: Arc<Mutex<Connection>>,
}

pub struct StoreStats {
    pub templates: u64,
    pub conferences: u64,
    pub connections: u64,
    pub alerts: u64,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("failed to open sqlite db")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
            .context("failed to configure sqlite db")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        use anyhow::Context;
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> CoreResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    fn lock(&self) -> CoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Storage("store lock poisoned".into()))
    }

    pub fn stats(&self) -> CoreResult<StoreStats> {
        let conn = self.lock()?;
        let count = |table: &str| -> CoreResult<u64> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
            Ok(n as u64)
        };
        Ok(StoreStats {
            templates: count("templates")?,
            conferences: count("conferences")?,
            connections: count("connections")?,
            alerts: count("alerts")?,
        })
    }

    // --- templates ---

    pub fn save_template(&self, t: &ChecklistTemplate) -> CoreResult<()> {
        let body = serde_json::to_string(t)?;
        let fingerprint = template_fingerprint(t);
        let updated = t.updated_at.unwrap_or_else(Utc::now).to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO templates (id, version, fingerprint, body_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               version = excluded.version,
               fingerprint = excluded.fingerprint,
               body_json = excluded.body_json,
               updated_at = excluded.updated_at",
            params![t.id, t.version, fingerprint, body, updated],
        )?;
        Ok(())
    }

    pub fn load_template(&self, id: &str) -> CoreResult<ChecklistTemplate> {
        let conn = self.lock()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body_json FROM templates WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        let body = body.ok_or_else(|| CoreError::not_found("template", id))?;
        Ok(serde_json::from_str(&body)?)
    }

    pub fn list_templates(&self) -> CoreResult<Vec<ChecklistTemplate>> {
        self.list_bodies("SELECT body_json FROM templates ORDER BY id")
    }

    /// Fingerprint recorded for a stored template.
    pub fn template_fingerprint(&self, id: &str) -> CoreResult<Option<String>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT fingerprint FROM templates WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?)
    }

    /// Number of conferences instantiated from a template.
    pub fn template_usage(&self, id: &str) -> CoreResult<u64> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM conferences WHERE template_id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        Ok(n as u64)
    }

    // --- connections ---

    pub fn save_connection(&self, c: &DbConnection) -> CoreResult<()> {
        let body = serde_json::to_string(c)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO connections (id, body_json) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET body_json = excluded.body_json",
            params![c.id, body],
        )?;
        Ok(())
    }

    pub fn load_connection(&self, id: &str) -> CoreResult<DbConnection> {
        let conn = self.lock()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body_json FROM connections WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        let body = body.ok_or_else(|| CoreError::not_found("connection", id))?;
        Ok(serde_json::from_str(&body)?)
    }

    pub fn list_connections(&self) -> CoreResult<Vec<DbConnection>> {
        self.list_bodies("SELECT body_json FROM connections ORDER BY id")
    }

    // --- conferences ---

    pub fn save_conference(&self, c: &Conference) -> CoreResult<()> {
        let conn = self.lock()?;
        write_conference(&conn, c)
    }

    pub fn load_conference(&self, id: &str) -> CoreResult<Conference> {
        let conn = self.lock()?;
        read_conference(&conn, id)?.ok_or_else(|| CoreError::not_found("conference", id))
    }

    pub fn list_conferences(&self) -> CoreResult<Vec<Conference>> {
        self.list_bodies("SELECT body_json FROM conferences ORDER BY created_at, id")
    }

    pub fn find_conference_by_token(&self, token: &str) -> CoreResult<Option<Conference>> {
        let conn = self.lock()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body_json FROM conferences WHERE link_token = ?1",
                params![token],
                |r| r.get(0),
            )
            .optional()?;
        match body {
            Some(b) => Ok(Some(serde_json::from_str(&b)?)),
            None => Ok(None),
        }
    }

    /// Load-modify-save of one conference under the store lock. The record is
    /// written only when `f` succeeds.
    pub fn update_conference<T, F>(&self, id: &str, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Conference) -> CoreResult<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut conf =
            read_conference(&tx, id)?.ok_or_else(|| CoreError::not_found("conference", id))?;
        let out = f(&mut conf)?;
        write_conference(&tx, &conf)?;
        tx.commit()?;
        Ok(out)
    }

    /// Marker that moves whenever a conference is written or deleted. Watchers
    /// poll it to notice changes made by other processes.
    pub fn last_change(&self) -> CoreResult<Option<String>> {
        let conn = self.lock()?;
        let (count, latest): (i64, Option<String>) = conn.query_row(
            "SELECT COUNT(*), MAX(updated_at) FROM conferences",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok(latest.map(|ts| format!("{}@{}", count, ts)))
    }

    /// Deletes a conference together with its dedup keys.
    pub fn delete_conference(&self, id: &str) -> CoreResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let n = tx.execute("DELETE FROM conferences WHERE id = ?1", params![id])?;
        tx.execute(
            "DELETE FROM notified_keys WHERE conference_id = ?1",
            params![id],
        )?;
        tx.commit()?;
        Ok(n > 0)
    }

    // --- alerts ---

    pub fn list_alerts(&self, limit: u32) -> CoreResult<Vec<Alert>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key, severity, condition, conference_id, title, message, created_at
             FROM alerts ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            let severity: String = row.get(1)?;
            let condition: String = row.get(2)?;
            let created_at: String = row.get(6)?;
            Ok((
                row.get::<_, String>(0)?,
                severity,
                condition,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                created_at,
            ))
        })?;

        let mut alerts = Vec::new();
        for r in rows {
            let (key, severity, condition, conference_id, title, message, created_at) = r?;
            alerts.push(Alert {
                key,
                severity: serde_json::from_value(serde_json::Value::String(severity))?,
                condition: serde_json::from_value(serde_json::Value::String(condition))?,
                conference_id,
                title,
                message,
                created_at: parse_ts(&created_at)?,
            });
        }
        Ok(alerts)
    }

    fn list_bodies<T: serde::de::DeserializeOwned>(&self, sql: &str) -> CoreResult<Vec<T>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for body in rows {
            out.push(serde_json::from_str(&body?)?);
        }
        Ok(out)
    }
}

fn read_conference(conn: &Connection, id: &str) -> CoreResult<Option<Conference>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body_json FROM conferences WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .optional()?;
    match body {
        Some(b) => Ok(Some(serde_json::from_str(&b)?)),
        None => Ok(None),
    }
}

fn write_conference(conn: &Connection, c: &Conference) -> CoreResult<()> {
    let body = serde_json::to_string(c)?;
    conn.execute(
        "INSERT INTO conferences
           (id, template_id, status, link_token, link_expires_at, body_json, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
           status = excluded.status,
           link_token = excluded.link_token,
           link_expires_at = excluded.link_expires_at,
           body_json = excluded.body_json,
           updated_at = excluded.updated_at",
        params![
            c.id,
            c.template_id,
            c.status.as_str(),
            c.link_token,
            c.link_expires_at.to_rfc3339(),
            body,
            c.created_at.to_rfc3339(),
            c.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn parse_ts(s: &str) -> CoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| CoreError::Storage(format!("bad timestamp {}: {}", s, e)))
}

impl DedupLedger for Store {
    fn insert_if_absent(&self, key: &DedupKey, now: DateTime<Utc>) -> CoreResult<bool> {
        let conn = self.lock()?;
        let n = conn.execute(
            "INSERT OR IGNORE INTO notified_keys (key, conference_id, condition, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                key.value,
                key.conference_id,
                key.condition.as_str(),
                now.to_rfc3339()
            ],
        )?;
        Ok(n == 1)
    }

    fn contains(&self, key: &str) -> CoreResult<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM notified_keys WHERE key = ?1",
                params![key],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn remove(&self, key: &str) -> CoreResult<bool> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM notified_keys WHERE key = ?1", params![key])?;
        Ok(n > 0)
    }

    fn clear(&self, conference_id: &str, conditions: &[Condition]) -> CoreResult<usize> {
        let conn = self.lock()?;
        if conditions.is_empty() {
            return Ok(conn.execute(
                "DELETE FROM notified_keys WHERE conference_id = ?1",
                params![conference_id],
            )?);
        }
        let mut n = 0;
        for c in conditions {
            n += conn.execute(
                "DELETE FROM notified_keys WHERE conference_id = ?1 AND condition = ?2",
                params![conference_id, c.as_str()],
            )?;
        }
        Ok(n)
    }
}

impl AlertSink for Store {
    fn raise(&self, alert: &Alert) -> CoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO alerts (key, severity, condition, conference_id, title, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                alert.key,
                alert.severity.as_str(),
                alert.condition.as_str(),
                alert.conference_id,
                alert.title,
                alert.message,
                alert.created_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }
}
