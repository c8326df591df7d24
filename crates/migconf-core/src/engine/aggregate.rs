use crate::model::{Conference, ConferenceItem, ConferenceStatus, ItemStatus, UserResponse};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Pending,
    /// Executed but awaiting a human decision or a re-execution.
    Unresolved,
    Resolved { divergent: bool },
}

pub fn resolution(item: &ConferenceItem) -> Resolution {
    match item.user_response {
        Some(UserResponse::Correct) => Resolution::Resolved { divergent: false },
        Some(UserResponse::Divergent) => Resolution::Resolved { divergent: true },
        None => match item.status {
            ItemStatus::Pending => Resolution::Pending,
            ItemStatus::AutoOk | ItemStatus::Correct => Resolution::Resolved { divergent: false },
            ItemStatus::Divergent => Resolution::Resolved { divergent: true },
            ItemStatus::Warn | ItemStatus::Fail => Resolution::Unresolved,
        },
    }
}

pub fn aggregate(items: &[ConferenceItem]) -> ConferenceStatus {
    let mut all_pending = true;
    let mut all_resolved = true;
    let mut any_divergent = false;

    for item in items {
        match resolution(item) {
            Resolution::Pending => all_resolved = false,
            Resolution::Unresolved => {
                all_pending = false;
                all_resolved = false;
            }
            Resolution::Resolved { divergent } => {
                all_pending = false;
                any_divergent |= divergent;
            }
        }
    }

    if all_pending {
        ConferenceStatus::Pending
    } else if !all_resolved {
        ConferenceStatus::InProgress
    } else if any_divergent {
        ConferenceStatus::Divergent
    } else {
        ConferenceStatus::Completed
    }
}

/// Recomputes the stored status after an item mutation and keeps
/// `completed_at` in step with it. Returns the previous status.
pub fn refresh(conf: &mut Conference, now: DateTime<Utc>) -> ConferenceStatus {
    let previous = conf.status;
    conf.status = aggregate(&conf.items);
    conf.updated_at = now;
    if conf.is_finished() {
        if !matches!(
            previous,
            ConferenceStatus::Completed | ConferenceStatus::Divergent
        ) || conf.completed_at.is_none()
        {
            conf.completed_at = Some(now);
        }
    } else {
        conf.completed_at = None;
    }
    if previous != conf.status {
        tracing::info!(
            event = "migconf.conference.status_changed",
            conference_id = %conf.id,
            from = previous.as_str(),
            to = conf.status.as_str(),
        );
    }
    previous
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Progress {
    pub total: usize,
    pub pending: usize,
    pub awaiting_decision: usize,
    pub resolved: usize,
    pub divergent: usize,
}

pub fn progress(items: &[ConferenceItem]) -> Progress {
    let mut p = Progress {
        total: items.len(),
        ..Progress::default()
    };
    for item in items {
        match resolution(item) {
            Resolution::Pending => p.pending += 1,
            Resolution::Unresolved => p.awaiting_decision += 1,
            Resolution::Resolved { divergent } => {
                p.resolved += 1;
                if divergent {
                    p.divergent += 1;
                }
            }
        }
    }
    p
}
