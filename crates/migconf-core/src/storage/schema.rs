pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS templates (
  id TEXT PRIMARY KEY,
  version TEXT NOT NULL,
  fingerprint TEXT NOT NULL,
  body_json TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS connections (
  id TEXT PRIMARY KEY,
  body_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conferences (
  id TEXT PRIMARY KEY,
  template_id TEXT NOT NULL,
  status TEXT NOT NULL,
  link_token TEXT NOT NULL UNIQUE,
  link_expires_at TEXT NOT NULL,
  body_json TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notified_keys (
  key TEXT PRIMARY KEY,
  conference_id TEXT,
  condition TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS alerts (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  key TEXT NOT NULL,
  severity TEXT NOT NULL,
  condition TEXT NOT NULL,
  conference_id TEXT,
  title TEXT NOT NULL,
  message TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notified_keys_conference ON notified_keys(conference_id);
CREATE INDEX IF NOT EXISTS idx_conferences_status ON conferences(status);
"#;
