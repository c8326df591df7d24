pub mod console;

use crate::engine::aggregate::{progress, resolution, Progress, Resolution};
use crate::model::{Conference, ConferenceStatus, ItemStatus, UserResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Flattened view of a conference for terminals and JSON output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceReport {
    pub conference_id: String,
    pub client_name: String,
    pub template_id: String,
    pub status: ConferenceStatus,
    pub progress: Progress,
    pub link_expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub items: Vec<ItemRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRow {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    pub status: ItemStatus,
    pub needs_decision: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_response: Option<UserResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ConferenceReport {
    pub fn from_conference(conf: &Conference) -> Self {
        let items = conf
            .items
            .iter()
            .map(|i| {
                let title = conf
                    .template
                    .find_item(&i.template_item_id)
                    .map(|t| t.title.clone())
                    .unwrap_or_default();
                let store = i
                    .store_id
                    .as_deref()
                    .and_then(|s| conf.store(s))
                    .map(|s| s.name.clone());
                ItemRow {
                    id: i.id.clone(),
                    title,
                    store,
                    status: i.status,
                    needs_decision: resolution(i) == Resolution::Unresolved,
                    user_response: i.user_response,
                    detail: i
                        .last_error
                        .clone()
                        .or_else(|| i.validation_reason.clone())
                        .or_else(|| i.observation.clone()),
                }
            })
            .collect();
        Self {
            conference_id: conf.id.clone(),
            client_name: conf.client_name.clone(),
            template_id: conf.template_id.clone(),
            status: conf.status,
            progress: progress(&conf.items),
            link_expires_at: conf.link_expires_at,
            completed_at: conf.completed_at,
            items,
        }
    }
}
