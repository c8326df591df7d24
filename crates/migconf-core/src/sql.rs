//! Read-only guard and parameter discovery for checklist queries.

use regex::Regex;
use std::sync::OnceLock;

pub const PARAM_STORE_ID: &str = "store_id";
pub const PARAM_DATE_START: &str = "date_start";
pub const PARAM_DATE_END: &str = "date_end";
pub const PARAM_EXPECTED: &str = "expected";

const FORBIDDEN: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "MERGE",
    "GRANT", "REVOKE", "ATTACH", "DETACH", "PRAGMA", "VACUUM", "EXEC", "EXECUTE", "CALL",
];

fn forbidden_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternation = FORBIDDEN.join("|");
        Regex::new(&format!(r"(?i)\b({})\b", alternation)).expect("static regex")
    })
}

fn param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("static regex"))
}

/// Removes string literals and comments so keyword checks only see SQL.
fn strip_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                for n in chars.by_ref() {
                    if n == c {
                        break;
                    }
                }
                out.push_str(" '' ");
            }
            '-' if chars.peek() == Some(&'-') => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        break;
                    }
                }
                out.push(' ');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Accepts a single `SELECT` (optionally introduced by `WITH`) and nothing else.
pub fn ensure_select_only(sql: &str) -> Result<(), String> {
    let cleaned = strip_literals(sql);
    let body = cleaned.trim().trim_end_matches(';').trim();
    if body.is_empty() {
        return Err("query is empty".into());
    }
    if body.contains(';') {
        return Err("query must be a single statement".into());
    }
    let first = body
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    if first != "SELECT" && first != "WITH" {
        return Err(format!("query must start with SELECT, found {}", first));
    }
    if let Some(m) = forbidden_re().find(body) {
        return Err(format!(
            "query contains forbidden keyword {}",
            m.as_str().to_ascii_uppercase()
        ));
    }
    Ok(())
}

/// Named `:param` placeholders referenced outside string literals.
pub fn referenced_params(sql: &str) -> Vec<String> {
    let cleaned = strip_literals(sql);
    let mut names: Vec<String> = param_re()
        .captures_iter(&cleaned)
        .map(|c| c[1].to_string())
        .collect();
    names.sort();
    names.dedup();
    names
}
