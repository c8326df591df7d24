pub mod diagnostic;

use diagnostic::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid template: {}", summarize(.0))]
    InvalidTemplate(Vec<Diagnostic>),

    #[error("query execution failed: {0}")]
    QueryExecution(String),

    #[error("access link not found")]
    LinkNotFound,

    #[error("access link expired")]
    LinkExpired,

    /// Public-facing collapse of `LinkNotFound` and `LinkExpired`.
    #[error("link not found or expired")]
    LinkUnavailable,

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid transition for item {item}: {reason}")]
    InvalidTransition { item: String, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid_transition(item: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidTransition {
            item: item.into(),
            reason: reason.into(),
        }
    }

    /// Maps link errors to the uniform signal exposed to remote clients.
    pub fn into_public(self) -> Self {
        match self {
            CoreError::LinkNotFound | CoreError::LinkExpired => CoreError::LinkUnavailable,
            other => other,
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CoreError::InvalidTemplate(d) => d,
            _ => &[],
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Storage(format!("record encoding: {}", e))
    }
}

fn summarize(diags: &[Diagnostic]) -> String {
    diags
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Finds a `CoreError` inside an `anyhow` chain, the way CLI commands pick
/// exit codes.
pub fn try_map_error(e: &anyhow::Error) -> Option<&CoreError> {
    e.chain().find_map(|c| c.downcast_ref::<CoreError>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_errors_collapse_at_public_boundary() {
        assert!(matches!(
            CoreError::LinkExpired.into_public(),
            CoreError::LinkUnavailable
        ));
        assert!(matches!(
            CoreError::LinkNotFound.into_public(),
            CoreError::LinkUnavailable
        ));
        assert_eq!(
            CoreError::LinkExpired.into_public().to_string(),
            CoreError::LinkNotFound.into_public().to_string()
        );
    }

    #[test]
    fn invalid_template_message_lists_errors_only() {
        let err = CoreError::InvalidTemplate(vec![
            Diagnostic::new(diagnostic::codes::E_TPL_BINDING_MISSING, "item q1 needs a binding"),
            Diagnostic::new(diagnostic::codes::W_TPL_INPUT_UNUSED, "input x unused"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("q1 needs a binding"));
        assert!(!msg.contains("unused"));
    }

    #[test]
    fn core_error_found_through_anyhow_context() {
        let e = anyhow::Error::new(CoreError::LinkNotFound).context("resolving link");
        assert!(matches!(try_map_error(&e), Some(CoreError::LinkNotFound)));
    }
}
