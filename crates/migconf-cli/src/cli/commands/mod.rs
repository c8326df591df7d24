pub mod conference;
pub mod connection;
pub mod email;
pub mod init;
pub mod link;
pub mod notify;
pub mod template;

use crate::cli::args::{Cli, Command, GlobalArgs};
use anyhow::Context;
use migconf_core::config::{load_config, MigconfConfig};
use migconf_core::engine::{ConferenceEngine, EngineSettings};
use migconf_core::mailer::Mailer;
use migconf_core::notify::{AlertSink, FanoutSink, NotificationEngine, TracingSink};
use migconf_core::providers::email::{EmailSender, HttpEmailSender};
use migconf_core::providers::query::SqliteQueryExecutor;
use migconf_core::storage::Store;
use std::sync::Arc;
use std::time::Duration;

pub mod exit_codes {
    pub const OK: i32 = 0;
    /// A conference ended divergent, an item failed, or a delivery failed.
    pub const DIVERGENT: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(args) => init::run(&cli.global, args),
        Command::Template(args) => template::run(&cli.global, args),
        Command::Connection(args) => connection::run(&cli.global, args),
        Command::Conference(args) => conference::run(&cli.global, args).await,
        Command::Link(args) => link::run(&cli.global, args),
        Command::Email(args) => email::run(&cli.global, args).await,
        Command::Notify(args) => notify::run(&cli.global, args).await,
    }
}

/// Config and store shared by every command.
pub struct AppContext {
    pub cfg: MigconfConfig,
    pub store: Store,
}

impl AppContext {
    pub fn open(global: &GlobalArgs) -> anyhow::Result<Self> {
        let mut cfg = load_config(&global.config, global.strict)
            .with_context(|| format!("failed to load {}", global.config.display()))?;
        if let Some(db) = &global.db {
            cfg.db = Some(db.clone());
        }
        let store = Store::open(&cfg.db_path())?;
        store.init_schema()?;
        Ok(Self { cfg, store })
    }

    pub fn engine(&self) -> ConferenceEngine {
        let executor =
            SqliteQueryExecutor::new(self.store.clone()).with_max_rows(self.cfg.query.max_rows);
        ConferenceEngine::new(
            self.store.clone(),
            Arc::new(executor),
            Arc::new(self.store.clone()),
            EngineSettings::from(&self.cfg),
        )
    }

    fn sender(&self) -> anyhow::Result<Option<Arc<dyn EmailSender>>> {
        let email = &self.cfg.email;
        let Some(endpoint) = email.endpoint.as_deref().filter(|e| !e.trim().is_empty()) else {
            return Ok(None);
        };
        let api_key = email
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok());
        let sender = HttpEmailSender::new(
            endpoint,
            email.from.clone(),
            api_key,
            Duration::from_secs(email.timeout_seconds),
        )?;
        Ok(Some(Arc::new(sender)))
    }

    pub fn mailer(&self) -> anyhow::Result<Mailer> {
        let sender = self.sender()?.ok_or_else(|| {
            anyhow::anyhow!("email.endpoint is not configured (set it in the config or MIGCONF_EMAIL_ENDPOINT)")
        })?;
        Ok(Mailer::new(
            self.store.clone(),
            sender,
            self.cfg.email.public_base_url.clone(),
        ))
    }

    /// Alerts go to the store and to the log. Reminders are sent only when an
    /// email backend is configured.
    pub fn notifier(&self) -> anyhow::Result<NotificationEngine> {
        let sinks: Vec<Arc<dyn AlertSink>> =
            vec![Arc::new(self.store.clone()), Arc::new(TracingSink)];
        let engine = NotificationEngine::new(
            self.store.clone(),
            Arc::new(self.store.clone()),
            Arc::new(FanoutSink::new(sinks)),
            self.cfg.notifications.clone(),
        );
        match self.sender()? {
            Some(sender) if self.cfg.reminders.enabled => {
                let mailer = Mailer::new(
                    self.store.clone(),
                    sender,
                    self.cfg.email.public_base_url.clone(),
                );
                Ok(engine.with_reminders(mailer, self.cfg.reminders.clone()))
            }
            _ => Ok(engine),
        }
    }
}
