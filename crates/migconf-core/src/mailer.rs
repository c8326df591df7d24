//! Conference emails: composition, delivery and the per-conference history.
//!
//! An entry is appended as `pending` before the attempt and settled to `sent`
//! or `failed` afterwards. Delivery failures are recorded and logged; they
//! never change the conference itself.

use crate::engine::aggregate::progress;
use crate::errors::{CoreError, CoreResult};
use crate::link;
use crate::model::{Conference, ConferenceStatus, EmailHistoryEntry, EmailKind, EmailStatus};
use crate::providers::email::{EmailMessage, EmailSender};
use crate::storage::Store;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Clone)]
pub struct Mailer {
    store: Store,
    sender: Arc<dyn EmailSender>,
    public_base_url: String,
}

impl Mailer {
    pub fn new(store: Store, sender: Arc<dyn EmailSender>, public_base_url: impl Into<String>) -> Self {
        Self {
            store,
            sender,
            public_base_url: public_base_url.into(),
        }
    }

    pub async fn send_conference_link(
        &self,
        conference_id: &str,
        to: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<EmailHistoryEntry> {
        let conf = self.store.load_conference(conference_id)?;
        let msg = compose_link(&conf, to, &self.public_base_url);
        self.deliver(&conf, EmailKind::ConferenceLink, msg, now).await
    }

    /// Sends a reminder to the address of the latest link email.
    pub async fn send_reminder(
        &self,
        conference_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<EmailHistoryEntry> {
        let conf = self.store.load_conference(conference_id)?;
        let to = conf.contact_address().ok_or_else(|| {
            CoreError::Config(format!(
                "conference '{}' has no link email to remind",
                conference_id
            ))
        })?;
        let msg = compose_reminder(&conf, to, &self.public_base_url);
        self.deliver(&conf, EmailKind::Reminder, msg, now).await
    }

    pub async fn send_completion(
        &self,
        conference_id: &str,
        to: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<EmailHistoryEntry> {
        let conf = self.store.load_conference(conference_id)?;
        if !conf.is_finished() {
            return Err(CoreError::Config(format!(
                "conference '{}' is {}, not finished",
                conference_id,
                conf.status.as_str()
            )));
        }
        let msg = compose_completion(&conf, to);
        self.deliver(&conf, EmailKind::Completion, msg, now).await
    }

    async fn deliver(
        &self,
        conf: &Conference,
        kind: EmailKind,
        msg: EmailMessage,
        now: DateTime<Utc>,
    ) -> CoreResult<EmailHistoryEntry> {
        check_address(&msg.to)?;
        let mut entry = EmailHistoryEntry {
            id: format!("{}-{}", kind.as_str(), &link::new_token()[..10]),
            kind,
            to: msg.to.clone(),
            status: EmailStatus::Pending,
            sent_at: now,
            message_id: None,
            error: None,
        };
        let pending = entry.clone();
        self.store.update_conference(&conf.id, |c| {
            c.email_history.push(pending);
            Ok(())
        })?;

        match self.sender.send(&msg).await {
            Ok(receipt) if receipt.success => {
                entry.status = EmailStatus::Sent;
                entry.message_id = receipt.message_id;
            }
            Ok(receipt) => {
                entry.status = EmailStatus::Failed;
                entry.error = Some(receipt.message);
            }
            Err(e) => {
                entry.status = EmailStatus::Failed;
                entry.error = Some(format!("{:#}", e));
            }
        }

        let settled = entry.clone();
        self.store.update_conference(&conf.id, |c| {
            if let Some(e) = c.email_history.iter_mut().find(|e| e.id == settled.id) {
                *e = settled;
            }
            Ok(())
        })?;

        match entry.status {
            EmailStatus::Failed => tracing::warn!(
                event = "migconf.email.failed",
                conference_id = %conf.id,
                kind = kind.as_str(),
                sender = self.sender.name(),
                error = entry.error.as_deref().unwrap_or(""),
            ),
            _ => tracing::info!(
                event = "migconf.email.sent",
                conference_id = %conf.id,
                kind = kind.as_str(),
                sender = self.sender.name(),
                message_id = entry.message_id.as_deref().unwrap_or(""),
            ),
        }
        Ok(entry)
    }
}

fn check_address(to: &str) -> CoreResult<()> {
    let to = to.trim();
    match to.split_once('@') {
        Some((user, domain)) if !user.is_empty() && domain.contains('.') && !to.contains(' ') => {
            Ok(())
        }
        _ => Err(CoreError::Config(format!("invalid email address '{}'", to))),
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn client_label(conf: &Conference) -> &str {
    if conf.client_name.trim().is_empty() {
        &conf.id
    } else {
        &conf.client_name
    }
}

pub fn compose_link(conf: &Conference, to: &str, base_url: &str) -> EmailMessage {
    let url = link::public_url(base_url, &conf.link_token);
    let client = client_label(conf);
    let expires = conf.link_expires_at.format("%Y-%m-%d %H:%M UTC");
    EmailMessage {
        to: to.trim().to_string(),
        subject: format!("Migration conference for {}", client),
        html: format!(
            "<p>The migration conference for <strong>{}</strong> is ready for review.</p>\
             <p><a href=\"{}\">Open the conference</a></p>\
             <p>This link expires on {}.</p>",
            escape(client),
            escape(&url),
            expires
        ),
        text: format!(
            "The migration conference for {} is ready for review.\n\n{}\n\nThis link expires on {}.\n",
            client, url, expires
        ),
    }
}

pub fn compose_reminder(conf: &Conference, to: &str, base_url: &str) -> EmailMessage {
    let url = link::public_url(base_url, &conf.link_token);
    let client = client_label(conf);
    let p = progress(&conf.items);
    let open = p.pending + p.awaiting_decision;
    EmailMessage {
        to: to.trim().to_string(),
        subject: format!("Reminder: migration conference for {} is waiting", client),
        html: format!(
            "<p>{} of {} items still need your review.</p>\
             <p><a href=\"{}\">Continue the conference</a></p>",
            open,
            p.total,
            escape(&url)
        ),
        text: format!(
            "{} of {} items still need your review.\n\n{}\n",
            open, p.total, url
        ),
    }
}

pub fn compose_completion(conf: &Conference, to: &str) -> EmailMessage {
    let client = client_label(conf);
    let p = progress(&conf.items);
    let outcome = match conf.status {
        ConferenceStatus::Divergent => "finished with divergences",
        _ => "completed",
    };
    EmailMessage {
        to: to.trim().to_string(),
        subject: format!("Migration conference for {} {}", client, outcome),
        html: format!(
            "<p>The migration conference for <strong>{}</strong> {}.</p>\
             <p>{} items checked, {} divergent.</p>",
            escape(client),
            outcome,
            p.total,
            p.divergent
        ),
        text: format!(
            "The migration conference for {} {}.\n{} items checked, {} divergent.\n",
            client, outcome, p.total, p.divergent
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses() {
        assert!(check_address("ana@client.com.br").is_ok());
        assert!(check_address(" ana@client.com ").is_ok());
        assert!(check_address("ana").is_err());
        assert!(check_address("@client.com").is_err());
        assert!(check_address("ana@localhost").is_err());
    }

    #[test]
    fn html_is_escaped() {
        assert_eq!(escape("<b>A&B</b>"), "&lt;b&gt;A&amp;B&lt;/b&gt;");
    }
}
