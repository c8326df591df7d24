use crate::errors::CoreError;
use crate::model::ChecklistTemplate;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MigconfConfig {
    #[serde(default, rename = "configVersion", alias = "version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<PathBuf>,
    #[serde(default)]
    pub link: LinkSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub reminders: ReminderSettings,
    #[serde(default)]
    pub email: EmailSettings,
    #[serde(default)]
    pub query: QuerySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkSettings {
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            ttl_days: default_ttl_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationSettings {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_expiry_warning_hours")]
    pub expiry_warning_hours: i64,
    #[serde(default = "default_email_failure_window_minutes")]
    pub email_failure_window_minutes: i64,
    #[serde(default = "default_stale_pending_hours")]
    pub stale_pending_hours: i64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            expiry_warning_hours: default_expiry_warning_hours(),
            email_failure_window_minutes: default_email_failure_window_minutes(),
            stale_pending_hours: default_stale_pending_hours(),
        }
    }
}

impl NotificationSettings {
    pub fn warning_window(&self) -> Duration {
        Duration::hours(self.expiry_warning_hours)
    }

    pub fn email_failure_window(&self) -> Duration {
        Duration::minutes(self.email_failure_window_minutes)
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::hours(self.stale_pending_hours)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_reminder_after_hours")]
    pub after_hours: i64,
    #[serde(default = "default_max_reminders")]
    pub max_reminders: u32,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            after_hours: default_reminder_after_hours(),
            max_reminders: default_max_reminders(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_from")]
    pub from: String,
    /// Name of the environment variable holding the backend API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_base_url")]
    pub public_base_url: String,
    #[serde(default = "default_email_timeout")]
    pub timeout_seconds: u64,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            from: default_from(),
            api_key_env: None,
            public_base_url: default_base_url(),
            timeout_seconds: default_email_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuerySettings {
    #[serde(default = "default_query_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            timeout_seconds: default_query_timeout(),
            parallel: default_parallel(),
            max_rows: default_max_rows(),
        }
    }
}

fn default_ttl_days() -> u32 {
    7
}
fn default_interval_seconds() -> u64 {
    300
}
fn default_expiry_warning_hours() -> i64 {
    24
}
fn default_email_failure_window_minutes() -> i64 {
    5
}
fn default_stale_pending_hours() -> i64 {
    48
}
fn default_true() -> bool {
    true
}
fn default_reminder_after_hours() -> i64 {
    48
}
fn default_max_reminders() -> u32 {
    3
}
fn default_from() -> String {
    "conferencia@localhost".into()
}
fn default_base_url() -> String {
    "http://localhost:8080".into()
}
fn default_email_timeout() -> u64 {
    15
}
fn default_query_timeout() -> u64 {
    30
}
fn default_parallel() -> usize {
    4
}
fn default_max_rows() -> usize {
    10_000
}

impl MigconfConfig {
    /// Applies `MIGCONF_*` environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("MIGCONF_DB") {
            if !v.trim().is_empty() {
                self.db = Some(PathBuf::from(v));
            }
        }
        if let Ok(v) = std::env::var("MIGCONF_EMAIL_ENDPOINT") {
            if !v.trim().is_empty() {
                self.email.endpoint = Some(v);
            }
        }
        if let Ok(v) = std::env::var("MIGCONF_LINK_TTL_DAYS") {
            if let Ok(n) = v.parse() {
                self.link.ttl_days = n;
            }
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.db
            .clone()
            .unwrap_or_else(|| PathBuf::from(".migconf/migconf.db"))
    }

    fn check(&self) -> Result<(), CoreError> {
        if self.link.ttl_days == 0 {
            return Err(CoreError::Config("link.ttl_days must be at least 1".into()));
        }
        if self.notifications.interval_seconds == 0 {
            return Err(CoreError::Config(
                "notifications.interval_seconds must be positive".into(),
            ));
        }
        if self.notifications.expiry_warning_hours <= 0
            || self.notifications.email_failure_window_minutes <= 0
            || self.notifications.stale_pending_hours <= 0
        {
            return Err(CoreError::Config(
                "notification windows must be positive".into(),
            ));
        }
        if self.query.parallel == 0 || self.query.timeout_seconds == 0 {
            return Err(CoreError::Config(
                "query.parallel and query.timeout_seconds must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Deserializes YAML and collects the paths of keys the target type ignored.
fn parse_yaml<T: serde::de::DeserializeOwned>(
    raw: &str,
) -> Result<(T, HashSet<String>), CoreError> {
    let mut ignored = HashSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);
    let value: T = serde_ignored::deserialize(deserializer, |path| {
        ignored.insert(path.to_string());
    })
    .map_err(|e| CoreError::Config(format!("failed to parse YAML: {}", e)))?;
    Ok((value, ignored))
}

fn meaningful(ignored: &HashSet<String>) -> Vec<String> {
    let mut keys: Vec<String> = ignored
        .iter()
        .filter(|k| !k.starts_with('_') && !k.starts_with("x-") && *k != "definitions")
        .cloned()
        .collect();
    keys.sort();
    keys
}

/// Loads the engine config. A missing file yields defaults plus env overrides.
pub fn load_config(path: &Path, strict: bool) -> Result<MigconfConfig, CoreError> {
    let mut cfg = if path.exists() {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("failed to read config {}: {}", path.display(), e))
        })?;
        let (cfg, ignored): (MigconfConfig, _) = parse_yaml(&raw)?;
        let unknown = meaningful(&ignored);
        if !unknown.is_empty() {
            if strict {
                return Err(CoreError::Config(format!(
                    "Unknown fields detected in strict mode: {:?} (file: {})",
                    unknown,
                    path.display()
                )));
            }
            tracing::warn!(
                event = "migconf.config.unknown_fields",
                fields = ?unknown,
                file = %path.display(),
            );
        }
        cfg
    } else {
        MigconfConfig::default()
    };

    if cfg.version != 0 && cfg.version != SUPPORTED_CONFIG_VERSION {
        return Err(CoreError::Config(format!(
            "unsupported config version {} (supported: {})",
            cfg.version, SUPPORTED_CONFIG_VERSION
        )));
    }

    cfg.apply_env();
    cfg.check()?;
    Ok(cfg)
}

/// Reads a template authored as YAML (JSON is valid YAML too). Unknown keys
/// are always rejected.
pub fn load_template(path: &Path) -> Result<ChecklistTemplate, CoreError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        CoreError::Config(format!("failed to read template {}: {}", path.display(), e))
    })?;
    let (t, ignored): (ChecklistTemplate, _) = parse_yaml(&raw)?;
    let unknown = meaningful(&ignored);
    if !unknown.is_empty() {
        return Err(CoreError::Config(format!(
            "Unknown template fields: {:?} (file: {})",
            unknown,
            path.display()
        )));
    }
    Ok(t)
}

pub const SAMPLE_CONFIG: &str = r#"configVersion: 1
db: .migconf/migconf.db
link:
  ttl_days: 7
notifications:
  interval_seconds: 300
  expiry_warning_hours: 24
  email_failure_window_minutes: 5
  stale_pending_hours: 48
reminders:
  enabled: true
  after_hours: 48
  max_reminders: 3
email:
  # endpoint: https://mail.example.com/api/send
  from: conferencia@example.com
  public_base_url: http://localhost:8080
query:
  timeout_seconds: 30
  parallel: 4
"#;

pub const SAMPLE_TEMPLATE: &str = r#"id: retail-basic
name: Retail migration basics
version: 1.0.0
expectedInputs:
  - key: revenue
    label: Revenue for the period
    scope: per_store
    type: currency
    required: true
sections:
  - id: catalog
    title: Catalog
    order: 1
    items:
      - id: products_exist
        title: Products were migrated
        query: SELECT id FROM products LIMIT 1
        validationRule:
          type: must_return_rows
      - id: orphan_prices
        title: No price without product
        query: SELECT p.id FROM prices p LEFT JOIN products x ON x.id = p.product_id WHERE x.id IS NULL
        validationRule:
          type: must_return_no_rows
        autoResolve: true
  - id: sales
    title: Sales
    order: 2
    items:
      - id: revenue_matches
        title: Revenue matches the figure supplied by the client
        query: SELECT COALESCE(SUM(amount), 0) FROM sales WHERE store_id = :store_id AND sold_on BETWEEN :date_start AND :date_end
        scope: per_store
        validationRule:
          type: number_matches_expected_with_tolerance
          tolerance: 0.01
        expectedInputBinding: revenue
        autoResolve: true
"#;

pub fn write_sample_config(path: &Path) -> Result<(), CoreError> {
    std::fs::write(path, SAMPLE_CONFIG)
        .map_err(|e| CoreError::Config(format!("failed to write sample config: {}", e)))
}

pub fn write_sample_template(path: &Path) -> Result<(), CoreError> {
    std::fs::write(path, SAMPLE_TEMPLATE)
        .map_err(|e| CoreError::Config(format!("failed to write sample template: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_parses_strictly() {
        let (cfg, ignored): (MigconfConfig, _) = parse_yaml(SAMPLE_CONFIG).unwrap();
        assert!(meaningful(&ignored).is_empty());
        assert_eq!(cfg.link.ttl_days, 7);
        assert_eq!(cfg.notifications.interval_seconds, 300);
        assert!(cfg.check().is_ok());
    }

    #[test]
    fn sample_template_is_valid() {
        let (t, ignored): (ChecklistTemplate, _) = parse_yaml(SAMPLE_TEMPLATE).unwrap();
        assert!(meaningful(&ignored).is_empty());
        let report = crate::template::check(&t);
        assert!(report.is_ok(), "{:?}", report.diagnostics);
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let (cfg, _): (MigconfConfig, _) = parse_yaml("link:\n  ttl_days: 3\n").unwrap();
        assert_eq!(cfg.link.ttl_days, 3);
        assert_eq!(cfg.notifications.expiry_warning_hours, 24);
        assert_eq!(cfg.reminders.max_reminders, 3);
    }

    #[test]
    fn strict_mode_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migconf.yaml");
        std::fs::write(&path, "link:\n  ttl_days: 3\n  ttl_hours: 4\n").unwrap();
        assert!(load_config(&path, true).is_err());
        assert!(load_config(&path, false).is_ok());
    }

    #[test]
    fn zero_ttl_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migconf.yaml");
        std::fs::write(&path, "link:\n  ttl_days: 0\n").unwrap();
        assert!(load_config(&path, false).is_err());
    }
}
