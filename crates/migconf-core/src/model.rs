use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistTemplate {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: String,
    #[serde(default)]
    pub sections: Vec<TemplateSection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_inputs: Vec<ExpectedInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ChecklistTemplate {
    /// Sections in evaluation order (ascending `order`).
    pub fn ordered_sections(&self) -> Vec<&TemplateSection> {
        let mut sections: Vec<&TemplateSection> = self.sections.iter().collect();
        sections.sort_by_key(|s| s.order);
        sections
    }

    pub fn items(&self) -> impl Iterator<Item = &TemplateItem> {
        self.sections.iter().flat_map(|s| s.items.iter())
    }

    pub fn find_item(&self, id: &str) -> Option<&TemplateItem> {
        self.items().find(|i| i.id == id)
    }

    pub fn find_input(&self, key: &str) -> Option<&ExpectedInput> {
        self.expected_inputs.iter().find(|i| i.key == key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSection {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub order: i32,
    #[serde(default)]
    pub items: Vec<TemplateItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateItem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub query: String,
    #[serde(default)]
    pub scope: Scope,
    pub validation_rule: ValidationRule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_input_binding: Option<String>,
    #[serde(default)]
    pub auto_resolve: bool,
}

impl TemplateItem {
    /// Binding name, treating an empty string as absent.
    pub fn binding(&self) -> Option<&str> {
        self.expected_input_binding
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    Global,
    PerStore,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedInput {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub scope: Scope,
    #[serde(rename = "type")]
    pub kind: InputKind,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Number,
    Currency,
    Text,
}

impl InputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::Number => "number",
            InputKind::Currency => "currency",
            InputKind::Text => "text",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ValidationRule {
    SingleNumberRequired,
    MustReturnRows,
    MustReturnNoRows,
    NumberEqualsExpected,
    NumberMatchesExpectedWithTolerance { tolerance: f64 },
}

impl ValidationRule {
    pub fn name(&self) -> &'static str {
        match self {
            ValidationRule::SingleNumberRequired => "single_number_required",
            ValidationRule::MustReturnRows => "must_return_rows",
            ValidationRule::MustReturnNoRows => "must_return_no_rows",
            ValidationRule::NumberEqualsExpected => "number_equals_expected",
            ValidationRule::NumberMatchesExpectedWithTolerance { .. } => {
                "number_matches_expected_with_tolerance"
            }
        }
    }

    pub fn needs_expected(&self) -> bool {
        matches!(
            self,
            ValidationRule::NumberEqualsExpected
                | ValidationRule::NumberMatchesExpectedWithTolerance { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub id: String,
    pub store_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conference {
    pub id: String,
    #[serde(default)]
    pub client_name: String,
    pub template_id: String,
    pub template: ChecklistTemplate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_fingerprint: Option<String>,
    pub connection_id: String,
    pub stores: Vec<Store>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<DateRange>,
    #[serde(default)]
    pub expected_input_values: BTreeMap<String, serde_json::Value>,
    pub items: Vec<ConferenceItem>,
    pub status: ConferenceStatus,
    pub link_token: String,
    pub link_expires_at: DateTime<Utc>,
    #[serde(default)]
    pub email_history: Vec<EmailHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Conference {
    pub fn item(&self, id: &str) -> Option<&ConferenceItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn item_mut(&mut self, id: &str) -> Option<&mut ConferenceItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    pub fn store(&self, id: &str) -> Option<&Store> {
        self.stores.iter().find(|s| s.id == id)
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            ConferenceStatus::Completed | ConferenceStatus::Divergent
        )
    }

    /// Address of the most recent conference-link email, used for reminders.
    pub fn contact_address(&self) -> Option<&str> {
        self.email_history
            .iter()
            .rev()
            .find(|e| e.kind == EmailKind::ConferenceLink)
            .map(|e| e.to.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConferenceStatus {
    Pending,
    InProgress,
    Completed,
    Divergent,
}

impl ConferenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConferenceStatus::Pending => "pending",
            ConferenceStatus::InProgress => "in_progress",
            ConferenceStatus::Completed => "completed",
            ConferenceStatus::Divergent => "divergent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceItem {
    pub id: String,
    pub template_item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
    pub status: ItemStatus,
    /// Latest classification produced by query execution. `status` equals it
    /// unless a human decision is recorded, in which case the decision wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_status: Option<ItemStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_result: Option<QueryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_response: Option<UserResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
}

impl ConferenceItem {
    pub fn new(id: String, template_item_id: String, store_id: Option<String>) -> Self {
        Self {
            id,
            template_item_id,
            store_id,
            status: ItemStatus::Pending,
            auto_status: None,
            query_result: None,
            validation_reason: None,
            last_error: None,
            user_response: None,
            observation: None,
            executed_at: None,
            responded_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    AutoOk,
    Warn,
    Fail,
    Divergent,
    Correct,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::AutoOk => "auto_ok",
            ItemStatus::Warn => "warn",
            ItemStatus::Fail => "fail",
            ItemStatus::Divergent => "divergent",
            ItemStatus::Correct => "correct",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserResponse {
    Correct,
    Divergent,
}

impl UserResponse {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "correct" => Some(UserResponse::Correct),
            "divergent" => Some(UserResponse::Divergent),
            _ => None,
        }
    }
}

/// Rows returned by a checklist query. Cells keep their JSON shape so numeric
/// strings can be coerced by the rule that reads them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn scalar(column: &str, value: serde_json::Value) -> Self {
        Self {
            columns: vec![column.to_string()],
            rows: vec![vec![value]],
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailHistoryEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EmailKind,
    pub to: String,
    pub status: EmailStatus,
    pub sent_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    ConferenceLink,
    Reminder,
    Completion,
}

impl EmailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailKind::ConferenceLink => "conference_link",
            EmailKind::Reminder => "reminder",
            EmailKind::Completion => "completion",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Sent,
    Failed,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DbConnection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: ConnectionKind,
    pub path: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    #[default]
    Sqlite,
}
