use super::{exit_codes, AppContext};
use crate::cli::args::{EmailArgs, EmailSub, GlobalArgs};
use chrono::Utc;
use migconf_core::model::{EmailHistoryEntry, EmailStatus};

pub async fn run(global: &GlobalArgs, args: EmailArgs) -> anyhow::Result<i32> {
    let ctx = AppContext::open(global)?;
    let mailer = ctx.mailer()?;
    let entry = match args.cmd {
        EmailSub::SendLink(a) => mailer.send_conference_link(&a.id, &a.to, Utc::now()).await?,
        EmailSub::Completion(a) => mailer.send_completion(&a.id, &a.to, Utc::now()).await?,
    };
    Ok(report(&entry))
}

fn report(entry: &EmailHistoryEntry) -> i32 {
    match entry.status {
        EmailStatus::Sent => {
            println!(
                "✅ {} email sent to {}{}",
                entry.kind.as_str(),
                entry.to,
                entry
                    .message_id
                    .as_deref()
                    .map(|m| format!(" ({})", m))
                    .unwrap_or_default()
            );
            exit_codes::OK
        }
        _ => {
            eprintln!(
                "❌ {} email to {} failed: {}",
                entry.kind.as_str(),
                entry.to,
                entry.error.as_deref().unwrap_or("unknown error")
            );
            exit_codes::DIVERGENT
        }
    }
}
