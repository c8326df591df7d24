use crate::config::MigconfConfig;
use crate::engine::aggregate::{self, Progress};
use crate::engine::{item as item_sm, params};
use crate::errors::{try_map_error, CoreError, CoreResult};
use crate::expand::{self, KEY_SEPARATOR};
use crate::fingerprint::template_fingerprint;
use crate::link::{self, LinkGrant};
use crate::model::{
    Conference, ConferenceStatus, DateRange, InputKind, ItemStatus, QueryResult, Scope,
    Store as StoreEntry, TemplateItem, UserResponse,
};
use crate::notify::ledger::DedupLedger;
use crate::providers::query::QueryExecutor;
use crate::storage::Store;
use crate::template;
use crate::validation;
use crate::validation::numeric::coerce_input;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Notify, Semaphore};
use tokio::time::{timeout, Duration};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub link_ttl_days: u32,
    pub query_timeout: Duration,
    pub parallel: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            link_ttl_days: 7,
            query_timeout: Duration::from_secs(30),
            parallel: 4,
        }
    }
}

impl From<&MigconfConfig> for EngineSettings {
    fn from(cfg: &MigconfConfig) -> Self {
        Self {
            link_ttl_days: cfg.link.ttl_days,
            query_timeout: Duration::from_secs(cfg.query.timeout_seconds),
            parallel: cfg.query.parallel.max(1),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewConference {
    /// Generated when absent.
    pub id: Option<String>,
    pub client_name: String,
    pub template_id: String,
    pub connection_id: String,
    pub stores: Vec<StoreEntry>,
    pub period: Option<DateRange>,
    pub expected_input_values: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Applied {
        item_id: String,
        status: ItemStatus,
        conference_status: ConferenceStatus,
    },
    /// A newer execution or a human decision got there first; the result was
    /// dropped.
    Superseded { item_id: String },
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub conference_id: String,
    pub status: ConferenceStatus,
    pub applied: usize,
    pub superseded: usize,
    pub errors: Vec<String>,
    pub progress: Progress,
}

type GenerationKey = (String, String);

/// Drives conferences through creation, execution and human decisions.
/// Cloning is cheap; clones share the store, the generation table and the
/// change signal.
#[derive(Clone)]
pub struct ConferenceEngine {
    store: Store,
    executor: Arc<dyn QueryExecutor>,
    ledger: Arc<dyn DedupLedger>,
    settings: EngineSettings,
    // Lock order: generations, then the store connection.
    generations: Arc<Mutex<HashMap<GenerationKey, u64>>>,
    changed: Arc<Notify>,
}

impl ConferenceEngine {
    pub fn new(
        store: Store,
        executor: Arc<dyn QueryExecutor>,
        ledger: Arc<dyn DedupLedger>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            executor,
            ledger,
            settings,
            generations: Arc::new(Mutex::new(HashMap::new())),
            changed: Arc::new(Notify::new()),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Signalled after every change to the conference set.
    pub fn changes(&self) -> Arc<Notify> {
        self.changed.clone()
    }

    pub fn create_conference(&self, req: NewConference, now: DateTime<Utc>) -> CoreResult<Conference> {
        let template = self.store.load_template(&req.template_id)?;
        template::ensure_valid(&template)?;
        self.store.load_connection(&req.connection_id)?;
        if let Some(p) = &req.period {
            if p.start > p.end {
                return Err(CoreError::Config(format!(
                    "period starts after it ends ({} > {})",
                    p.start, p.end
                )));
            }
        }

        let items = expand::expand(&template, &req.stores)?;
        let grant = link::generate(self.settings.link_ttl_days, now)?;
        let id = req.id.unwrap_or_else(new_conference_id);
        match self.store.load_conference(&id) {
            Ok(_) => {
                return Err(CoreError::Config(format!(
                    "conference '{}' already exists",
                    id
                )))
            }
            Err(CoreError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let mut conf = Conference {
            id,
            client_name: req.client_name,
            template_id: template.id.clone(),
            template_fingerprint: Some(template_fingerprint(&template)),
            template,
            connection_id: req.connection_id,
            stores: req.stores,
            period: req.period,
            expected_input_values: BTreeMap::new(),
            items,
            status: ConferenceStatus::Pending,
            link_token: grant.token,
            link_expires_at: grant.expires_at,
            email_history: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        for (k, v) in req.expected_input_values {
            check_input(&conf, &k, &v)?;
            conf.expected_input_values.insert(k, v);
        }
        aggregate::refresh(&mut conf, now);
        self.store.save_conference(&conf)?;

        tracing::info!(
            event = "migconf.conference.created",
            conference_id = %conf.id,
            template_id = %conf.template_id,
            stores = conf.stores.len(),
            items = conf.items.len(),
            link_expires_at = %conf.link_expires_at.to_rfc3339(),
        );
        self.changed.notify_one();
        Ok(conf)
    }

    /// Merges client-supplied expected values and returns the required
    /// binding keys that are still missing.
    pub fn set_expected_inputs(
        &self,
        conference_id: &str,
        values: BTreeMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<String>> {
        let missing = self.store.update_conference(conference_id, |c| {
            for (k, v) in values {
                check_input(c, &k, &v)?;
                c.expected_input_values.insert(k, v);
            }
            c.updated_at = now;
            Ok(expand::missing_required_inputs(c))
        })?;
        tracing::info!(
            event = "migconf.conference.inputs_updated",
            conference_id = %conference_id,
            missing = missing.len(),
        );
        Ok(missing)
    }

    /// Runs one item's query and applies the classification, unless a newer
    /// execution or a human decision superseded it meanwhile. Query errors
    /// and timeouts put the item in `fail`; they are not returned as errors.
    pub async fn execute_item(
        &self,
        conference_id: &str,
        item_id: &str,
    ) -> CoreResult<ExecutionOutcome> {
        let conf = self.store.load_conference(conference_id)?;
        let item = conf
            .item(item_id)
            .ok_or_else(|| CoreError::not_found("item", item_id))?
            .clone();
        let tpl_item = conf
            .template
            .find_item(&item.template_item_id)
            .ok_or_else(|| CoreError::not_found("template item", &item.template_item_id))?
            .clone();
        let (query_params, expected) = params::build_params(&conf, &tpl_item, &item)?;
        let ticket = self.take_ticket(conference_id, item_id)?;

        tracing::debug!(
            event = "migconf.item.executing",
            conference_id = %conference_id,
            item_id = %item_id,
            ticket,
        );
        let started = std::time::Instant::now();
        let result = match timeout(
            self.settings.query_timeout,
            self.executor
                .execute(&conf.connection_id, &tpl_item.query, &query_params),
        )
        .await
        {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(describe(&e)),
            Err(_) => Err(format!(
                "query timed out after {:?}",
                self.settings.query_timeout
            )),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let outcome = self.apply_execution(
            conference_id,
            item_id,
            ticket,
            &tpl_item,
            expected.as_ref(),
            result,
            Utc::now(),
        )?;
        match &outcome {
            ExecutionOutcome::Applied { status, .. } => tracing::info!(
                event = "migconf.item.executed",
                conference_id = %conference_id,
                item_id = %item_id,
                status = status.as_str(),
                duration_ms,
            ),
            ExecutionOutcome::Superseded { .. } => tracing::info!(
                event = "migconf.item.result_dropped",
                conference_id = %conference_id,
                item_id = %item_id,
                ticket,
            ),
        }
        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_execution(
        &self,
        conference_id: &str,
        item_id: &str,
        ticket: u64,
        tpl_item: &TemplateItem,
        expected: Option<&serde_json::Value>,
        result: Result<QueryResult, String>,
        now: DateTime<Utc>,
    ) -> CoreResult<ExecutionOutcome> {
        let gens = self.lock_generations()?;
        let key = (conference_id.to_string(), item_id.to_string());
        if gens.get(&key).copied() != Some(ticket) {
            return Ok(ExecutionOutcome::Superseded {
                item_id: item_id.to_string(),
            });
        }

        let (status, conference_status) = self.store.update_conference(conference_id, |c| {
            let item = c
                .item_mut(item_id)
                .ok_or_else(|| CoreError::not_found("item", item_id))?;
            let previous = item.status;
            let status = match result {
                Ok(rows) => {
                    let v = validation::validate(&tpl_item.validation_rule, &rows, expected);
                    item_sm::apply_validation(item, rows, &v, tpl_item.auto_resolve, now)
                }
                Err(msg) => {
                    tracing::warn!(
                        event = "migconf.item.query_failed",
                        conference_id = %conference_id,
                        item_id = %item_id,
                        error = %msg,
                    );
                    item_sm::apply_execution_error(item, &msg, now)
                }
            };
            if previous != status {
                tracing::info!(
                    event = "migconf.item.status_changed",
                    conference_id = %conference_id,
                    item_id = %item_id,
                    from = previous.as_str(),
                    to = status.as_str(),
                );
            }
            aggregate::refresh(c, now);
            Ok((status, c.status))
        })?;
        drop(gens);

        self.changed.notify_one();
        Ok(ExecutionOutcome::Applied {
            item_id: item_id.to_string(),
            status,
            conference_status,
        })
    }

    /// Executes every item of a conference, at most `parallel` at a time.
    pub async fn execute_all(&self, conference_id: &str) -> CoreResult<RunSummary> {
        let conf = self.store.load_conference(conference_id)?;
        let sem = Arc::new(Semaphore::new(self.settings.parallel.max(1)));
        let mut handles = Vec::with_capacity(conf.items.len());

        for item in &conf.items {
            let permit = sem
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| CoreError::Storage("execution pool closed".into()))?;
            let this = self.clone();
            let conference_id = conference_id.to_string();
            let item_id = item.id.clone();
            let h = tokio::spawn(async move {
                let _permit = permit;
                this.execute_item(&conference_id, &item_id).await
            });
            handles.push((item.id.clone(), h));
        }

        let mut applied = 0;
        let mut superseded = 0;
        let mut errors = Vec::new();
        for (item_id, h) in handles {
            match h.await {
                Ok(Ok(ExecutionOutcome::Applied { .. })) => applied += 1,
                Ok(Ok(ExecutionOutcome::Superseded { .. })) => superseded += 1,
                Ok(Err(e)) => {
                    tracing::warn!(
                        event = "migconf.item.execution_error",
                        conference_id = %conference_id,
                        item_id = %item_id,
                        error = %e,
                    );
                    errors.push(format!("{}: {}", item_id, e));
                }
                Err(e) => errors.push(format!("{}: join error: {}", item_id, e)),
            }
        }

        let conf = self.store.load_conference(conference_id)?;
        Ok(RunSummary {
            conference_id: conf.id.clone(),
            status: conf.status,
            applied,
            superseded,
            errors,
            progress: aggregate::progress(&conf.items),
        })
    }

    /// Records a human decision. In-flight executions of the item are
    /// superseded.
    pub fn respond(
        &self,
        conference_id: &str,
        item_id: &str,
        response: UserResponse,
        observation: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<ConferenceStatus> {
        let mut gens = self.lock_generations()?;
        let status = self.store.update_conference(conference_id, |c| {
            let item = c
                .item_mut(item_id)
                .ok_or_else(|| CoreError::not_found("item", item_id))?;
            item_sm::record_response(item, response, observation, now)?;
            aggregate::refresh(c, now);
            Ok(c.status)
        })?;
        *gens
            .entry((conference_id.to_string(), item_id.to_string()))
            .or_insert(0) += 1;
        drop(gens);

        tracing::info!(
            event = "migconf.item.decided",
            conference_id = %conference_id,
            item_id = %item_id,
            response = ?response,
            conference_status = status.as_str(),
        );
        self.changed.notify_one();
        Ok(status)
    }

    pub fn clear_response(
        &self,
        conference_id: &str,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<ConferenceStatus> {
        let _gens = self.lock_generations()?;
        let (cleared, status) = self.store.update_conference(conference_id, |c| {
            let item = c
                .item_mut(item_id)
                .ok_or_else(|| CoreError::not_found("item", item_id))?;
            let cleared = item_sm::clear_response(item);
            aggregate::refresh(c, now);
            Ok((cleared, c.status))
        })?;
        if cleared {
            tracing::info!(
                event = "migconf.item.decision_cleared",
                conference_id = %conference_id,
                item_id = %item_id,
            );
            self.changed.notify_one();
        }
        Ok(status)
    }

    pub fn regenerate_link(&self, conference_id: &str, now: DateTime<Utc>) -> CoreResult<LinkGrant> {
        let grant = link::regenerate(
            &self.store,
            self.ledger.as_ref(),
            conference_id,
            self.settings.link_ttl_days,
            now,
        )?;
        self.changed.notify_one();
        Ok(grant)
    }

    /// Deletes a conference and every dedup key recorded for it.
    pub fn delete_conference(&self, conference_id: &str) -> CoreResult<bool> {
        let mut gens = self.lock_generations()?;
        let deleted = self.store.delete_conference(conference_id)?;
        gens.retain(|(c, _), _| c != conference_id);
        drop(gens);
        let cleared = self.ledger.clear(conference_id, &[])?;
        if deleted {
            tracing::info!(
                event = "migconf.conference.deleted",
                conference_id = %conference_id,
                cleared_keys = cleared,
            );
            self.changed.notify_one();
        }
        Ok(deleted)
    }

    fn lock_generations(&self) -> CoreResult<MutexGuard<'_, HashMap<GenerationKey, u64>>> {
        self.generations
            .lock()
            .map_err(|_| CoreError::Storage("generation table poisoned".into()))
    }

    fn take_ticket(&self, conference_id: &str, item_id: &str) -> CoreResult<u64> {
        let mut gens = self.lock_generations()?;
        let g = gens
            .entry((conference_id.to_string(), item_id.to_string()))
            .or_insert(0);
        *g += 1;
        Ok(*g)
    }
}

fn new_conference_id() -> String {
    let token = link::new_token();
    format!("conf-{}", &token[..12])
}

/// Accepts `input` for global inputs and `input#store` for per-store ones.
/// Number and currency inputs take numeric figures; null or blank clears.
fn check_input(conf: &Conference, key: &str, value: &serde_json::Value) -> CoreResult<()> {
    let (base, store) = match key.split_once(KEY_SEPARATOR) {
        Some((b, s)) => (b, Some(s)),
        None => (key, None),
    };
    let input = conf
        .template
        .find_input(base)
        .ok_or_else(|| CoreError::Config(format!("unknown expected input '{}'", base)))?;
    let blank = match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        _ => false,
    };
    if input.kind != InputKind::Text && !blank && coerce_input(value, input.kind).is_none() {
        return Err(CoreError::Config(format!(
            "expected input '{}' takes a {} value, got {}",
            key,
            input.kind.as_str(),
            value
        )));
    }
    match (input.scope, store) {
        (Scope::Global, None) => Ok(()),
        (Scope::PerStore, Some(s)) if conf.store(s).is_some() => Ok(()),
        (Scope::PerStore, Some(s)) => Err(CoreError::Config(format!(
            "expected input '{}' names unknown store '{}'",
            key, s
        ))),
        (Scope::PerStore, None) => Err(CoreError::Config(format!(
            "expected input '{}' is per store; use '{}{}<store>'",
            base, base, KEY_SEPARATOR
        ))),
        (Scope::Global, Some(_)) => Err(CoreError::Config(format!(
            "expected input '{}' is global and takes no store suffix",
            base
        ))),
    }
}

fn describe(e: &anyhow::Error) -> String {
    match try_map_error(e) {
        Some(CoreError::QueryExecution(msg)) => msg.clone(),
        Some(other) => other.to_string(),
        None => format!("{:#}", e),
    }
}
