//! Per-item state machine.
//!
//! ```text
//! pending --execute--> auto_ok | warn | divergent | fail
//! auto_ok | warn | divergent | fail --decision--> correct | divergent
//! ```
//! Executions may repeat from any state. A recorded human decision is kept
//! across re-executions and wins over the automatic classification until the
//! caller clears it explicitly.

use crate::errors::{CoreError, CoreResult};
use crate::model::{ConferenceItem, ItemStatus, QueryResult, UserResponse};
use crate::validation::{Outcome, Validation};
use chrono::{DateTime, Utc};

pub fn classify(validation: &Validation, auto_resolve: bool) -> ItemStatus {
    match validation.outcome {
        Outcome::Pass if auto_resolve => ItemStatus::AutoOk,
        Outcome::Pass => ItemStatus::Warn,
        Outcome::Fail => ItemStatus::Divergent,
        Outcome::Inconclusive => ItemStatus::Warn,
    }
}

fn set_automatic(item: &mut ConferenceItem, status: ItemStatus) {
    item.auto_status = Some(status);
    if item.user_response.is_none() {
        item.status = status;
    }
}

pub fn apply_validation(
    item: &mut ConferenceItem,
    result: QueryResult,
    validation: &Validation,
    auto_resolve: bool,
    now: DateTime<Utc>,
) -> ItemStatus {
    set_automatic(item, classify(validation, auto_resolve));
    item.query_result = Some(result);
    item.validation_reason = validation.reason.clone();
    item.last_error = None;
    item.executed_at = Some(now);
    item.status
}

pub fn apply_execution_error(item: &mut ConferenceItem, error: &str, now: DateTime<Utc>) -> ItemStatus {
    set_automatic(item, ItemStatus::Fail);
    item.query_result = None;
    item.validation_reason = None;
    item.last_error = Some(error.to_string());
    item.executed_at = Some(now);
    item.status
}

pub fn record_response(
    item: &mut ConferenceItem,
    response: UserResponse,
    observation: Option<String>,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    if item.status == ItemStatus::Pending {
        return Err(CoreError::invalid_transition(
            &item.id,
            "item has not been executed yet",
        ));
    }
    if let Some(existing) = item.user_response {
        return Err(CoreError::invalid_transition(
            &item.id,
            format!(
                "a {:?} decision is already recorded; clear it before deciding again",
                existing
            ),
        ));
    }
    item.user_response = Some(response);
    item.status = match response {
        UserResponse::Correct => ItemStatus::Correct,
        UserResponse::Divergent => ItemStatus::Divergent,
    };
    item.observation = observation.filter(|o| !o.trim().is_empty());
    item.responded_at = Some(now);
    Ok(())
}

/// Drops a recorded decision; the item falls back to its automatic status.
/// Returns whether a decision was present.
pub fn clear_response(item: &mut ConferenceItem) -> bool {
    if item.user_response.take().is_none() {
        return false;
    }
    item.status = item.auto_status.unwrap_or(ItemStatus::Pending);
    item.observation = None;
    item.responded_at = None;
    true
}
