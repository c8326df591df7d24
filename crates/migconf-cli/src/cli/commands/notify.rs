use super::{exit_codes, AppContext};
use crate::cli::args::{GlobalArgs, NotifyArgs, NotifySub};
use chrono::Utc;
use migconf_core::notify::spawn_change_poller;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// How often `watch` checks the store for writes made by other processes.
const CHANGE_POLL: Duration = Duration::from_secs(2);

pub async fn run(global: &GlobalArgs, args: NotifyArgs) -> anyhow::Result<i32> {
    let ctx = AppContext::open(global)?;
    match args.cmd {
        NotifySub::Sweep => {
            let report = ctx.notifier()?.sweep(Utc::now()).await?;
            println!(
                "Swept {} conference(s): {} alert(s), {} reminder(s) sent, {} reminder(s) failed",
                report.conferences, report.alerts_raised, report.reminders_sent, report.reminders_failed
            );
            if report.sink_failures > 0 {
                eprintln!(
                    "{} alert(s) could not be recorded and will be retried",
                    report.sink_failures
                );
            }
            Ok(exit_codes::OK)
        }
        NotifySub::Watch => {
            let notifier = ctx.notifier()?;
            eprintln!(
                "Watching every {}s; Ctrl-C to stop",
                ctx.cfg.notifications.interval_seconds
            );
            tracing::info!(
                event = "migconf.notify.watching",
                interval_seconds = ctx.cfg.notifications.interval_seconds,
                reminders = ctx.cfg.reminders.enabled,
            );
            let changes = Arc::new(Notify::new());
            let poller = spawn_change_poller(ctx.store.clone(), changes.clone(), CHANGE_POLL);
            notifier
                .run(changes, async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await;
            poller.abort();
            Ok(exit_codes::OK)
        }
        NotifySub::Alerts(a) => {
            for alert in ctx.store.list_alerts(a.limit)? {
                println!(
                    "{} {:<8} {:<40} {}",
                    alert.created_at.format("%Y-%m-%d %H:%M"),
                    alert.severity.as_str(),
                    alert.key,
                    alert.message
                );
            }
            Ok(exit_codes::OK)
        }
    }
}
