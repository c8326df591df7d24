use serde::{Deserialize, Serialize};

pub mod codes {
    pub const E_CFG_PARSE: &str = "E_CFG_PARSE";
    pub const E_TPL_VERSION: &str = "E_TPL_VERSION";
    pub const E_TPL_EMPTY: &str = "E_TPL_EMPTY";
    pub const E_TPL_SECTION_ORDER: &str = "E_TPL_SECTION_ORDER";
    pub const E_TPL_DUPLICATE_ID: &str = "E_TPL_DUPLICATE_ID";
    pub const E_TPL_DUPLICATE_INPUT: &str = "E_TPL_DUPLICATE_INPUT";
    pub const E_TPL_QUERY: &str = "E_TPL_QUERY";
    pub const E_TPL_BINDING_MISSING: &str = "E_TPL_BINDING_MISSING";
    pub const E_TPL_BINDING_UNKNOWN: &str = "E_TPL_BINDING_UNKNOWN";
    pub const E_TPL_SCOPE_MISMATCH: &str = "E_TPL_SCOPE_MISMATCH";
    pub const E_TPL_BINDING_TYPE: &str = "E_TPL_BINDING_TYPE";
    pub const E_TPL_TOLERANCE: &str = "E_TPL_TOLERANCE";
    pub const E_TPL_STORE_ID: &str = "E_TPL_STORE_ID";
    pub const E_TPL_ITEM_ID: &str = "E_TPL_ITEM_ID";
    pub const W_TPL_BINDING_UNUSED: &str = "W_TPL_BINDING_UNUSED";
    pub const W_TPL_STORE_PARAM: &str = "W_TPL_STORE_PARAM";
    pub const W_TPL_INPUT_UNUSED: &str = "W_TPL_INPUT_UNUSED";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnostic {
    pub code: String,
    pub severity: String,
    pub message: String,
    pub source: String,
    #[serde(default)]
    pub context: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fix_steps: Vec<String>,
}

impl Diagnostic {
    /// Severity is derived from the code prefix: `W_` codes are warnings.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let severity = if code.starts_with("W_") { "warn" } else { "error" };
        Self {
            code,
            severity: severity.to_string(),
            message: message.into(),
            source: "migconf".to_string(),
            context: serde_json::json!({}),
            fix_steps: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_fix_step(mut self, step: impl Into<String>) -> Self {
        self.fix_steps.push(step.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == "error"
    }

    pub fn format_terminal(&self) -> String {
        let mut out = format!("[{}] {} ({})", self.code, self.message, self.source);
        for step in &self.fix_steps {
            out.push_str(&format!("\n  fix: {}", step));
        }
        out
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}
