use super::ConferenceReport;
use crate::model::{ConferenceStatus, ItemStatus};

fn icon(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::Pending => "⏳",
        ItemStatus::AutoOk | ItemStatus::Correct => "✅",
        ItemStatus::Warn => "⚠️ ",
        ItemStatus::Fail => "💥",
        ItemStatus::Divergent => "❌",
    }
}

pub fn print_summary(report: &ConferenceReport) {
    let client = if report.client_name.is_empty() {
        String::new()
    } else {
        format!(" ({})", report.client_name)
    };
    eprintln!("\nConference {}{}", report.conference_id, client);

    for row in &report.items {
        let store = row
            .store
            .as_deref()
            .map(|s| format!(" [{}]", s))
            .unwrap_or_default();
        let decided = if row.user_response.is_some() { " (human)" } else { "" };
        eprintln!(
            "{} {:<32} {:<10}{}{}",
            icon(row.status),
            row.id,
            row.status.as_str(),
            decided,
            store
        );
        if let Some(detail) = &row.detail {
            eprintln!("    {}", detail);
        }
    }

    let p = &report.progress;
    eprintln!(
        "\nSummary: {} items, {} resolved ({} divergent), {} awaiting decision, {} pending",
        p.total, p.resolved, p.divergent, p.awaiting_decision, p.pending
    );
    let label = match report.status {
        ConferenceStatus::Pending => "PENDING",
        ConferenceStatus::InProgress => "IN PROGRESS",
        ConferenceStatus::Completed => "COMPLETED",
        ConferenceStatus::Divergent => "DIVERGENT",
    };
    eprintln!("Status: {}", label);
    eprintln!(
        "Link expires: {}",
        report.link_expires_at.format("%Y-%m-%d %H:%M UTC")
    );
}
