use super::{exit_codes, AppContext};
use crate::cli::args::{ConferenceArgs, ConferenceSub, CreateArgs, GlobalArgs, InputsArgs, RunArgs};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use migconf_core::engine::{ExecutionOutcome, NewConference};
use migconf_core::expand::missing_required_inputs;
use migconf_core::link::public_url;
use migconf_core::model::{Conference, ConferenceStatus, DateRange, ItemStatus, Store, UserResponse};
use migconf_core::report::{console, ConferenceReport};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

pub async fn run(global: &GlobalArgs, args: ConferenceArgs) -> anyhow::Result<i32> {
    let ctx = AppContext::open(global)?;
    match args.cmd {
        ConferenceSub::Create(a) => create(&ctx, a),
        ConferenceSub::Inputs(a) => inputs(&ctx, a),
        ConferenceSub::Run(a) => execute(&ctx, a).await,
        ConferenceSub::Respond(a) => {
            let response = UserResponse::parse(&a.response).ok_or_else(|| {
                anyhow::anyhow!("unknown response '{}': use correct or divergent", a.response)
            })?;
            let status = ctx
                .engine()
                .respond(&a.id, &a.item, response, a.observation, Utc::now())?;
            println!("✅ {} marked {:?}; conference is {}", a.item, response, status.as_str());
            Ok(exit_codes::OK)
        }
        ConferenceSub::Clear(a) => {
            let status = ctx.engine().clear_response(&a.id, &a.item, Utc::now())?;
            println!("✅ Decision on {} cleared; conference is {}", a.item, status.as_str());
            Ok(exit_codes::OK)
        }
        ConferenceSub::Status(a) => {
            let conf = ctx.store.load_conference(&a.id)?;
            let report = ConferenceReport::from_conference(&conf);
            if a.format == "json" {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                console::print_summary(&report);
                let missing = missing_required_inputs(&conf);
                if !missing.is_empty() {
                    eprintln!("Missing client figures: {}", missing.join(", "));
                }
            }
            Ok(exit_codes::OK)
        }
        ConferenceSub::List => {
            for c in ctx.store.list_conferences()? {
                println!(
                    "{:<20} {:<12} {:<20} {}",
                    c.id,
                    c.status.as_str(),
                    c.template_id,
                    c.client_name
                );
            }
            Ok(exit_codes::OK)
        }
        ConferenceSub::Delete(a) => {
            if ctx.engine().delete_conference(&a.id)? {
                println!("✅ Conference '{}' deleted", a.id);
                Ok(exit_codes::OK)
            } else {
                eprintln!("Conference '{}' not found", a.id);
                Ok(exit_codes::CONFIG_ERROR)
            }
        }
    }
}

fn create(ctx: &AppContext, a: CreateArgs) -> anyhow::Result<i32> {
    let stores = a
        .stores
        .iter()
        .map(|s| parse_store(s))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let period = match (&a.period_start, &a.period_end) {
        (Some(s), Some(e)) => Some(DateRange {
            start: parse_date(s)?,
            end: parse_date(e)?,
        }),
        (None, None) => None,
        _ => anyhow::bail!("--period-start and --period-end go together"),
    };
    let req = NewConference {
        id: a.id,
        client_name: a.client,
        template_id: a.template,
        connection_id: a.connection,
        stores,
        period,
        expected_input_values: collect_inputs(&a.inputs, a.inputs_file.as_deref())?,
    };

    let conf = ctx.engine().create_conference(req, Utc::now())?;
    println!("✅ Conference '{}' created with {} items", conf.id, conf.items.len());
    print_link(ctx, &conf);
    let missing = missing_required_inputs(&conf);
    if !missing.is_empty() {
        println!("Missing client figures: {}", missing.join(", "));
    }
    Ok(exit_codes::OK)
}

fn inputs(ctx: &AppContext, a: InputsArgs) -> anyhow::Result<i32> {
    let values = collect_inputs(&a.inputs, a.inputs_file.as_deref())?;
    let missing = ctx.engine().set_expected_inputs(&a.id, values, Utc::now())?;
    if missing.is_empty() {
        println!("✅ All required client figures supplied");
    } else {
        println!("Missing client figures: {}", missing.join(", "));
    }
    Ok(exit_codes::OK)
}

async fn execute(ctx: &AppContext, a: RunArgs) -> anyhow::Result<i32> {
    let engine = ctx.engine();
    match &a.item {
        Some(item) => match engine.execute_item(&a.id, item).await? {
            ExecutionOutcome::Applied {
                status,
                conference_status,
                ..
            } => println!(
                "{}: {} (conference {})",
                item,
                status.as_str(),
                conference_status.as_str()
            ),
            ExecutionOutcome::Superseded { .. } => {
                println!("{}: result superseded by a newer run or decision", item)
            }
        },
        None => {
            let summary = engine.execute_all(&a.id).await?;
            for e in &summary.errors {
                eprintln!("error: {}", e);
            }
            if !summary.errors.is_empty() {
                return Ok(exit_codes::DIVERGENT);
            }
        }
    }

    let conf = ctx.store.load_conference(&a.id)?;
    console::print_summary(&ConferenceReport::from_conference(&conf));
    Ok(exit_code_for(&conf))
}

fn exit_code_for(conf: &Conference) -> i32 {
    let failed = conf.items.iter().any(|i| i.status == ItemStatus::Fail);
    if failed || conf.status == ConferenceStatus::Divergent {
        exit_codes::DIVERGENT
    } else {
        exit_codes::OK
    }
}

pub fn print_link(ctx: &AppContext, conf: &Conference) {
    println!(
        "Link: {} (expires {})",
        public_url(&ctx.cfg.email.public_base_url, &conf.link_token),
        conf.link_expires_at.format("%Y-%m-%d %H:%M UTC")
    );
}

fn parse_store(raw: &str) -> anyhow::Result<Store> {
    let mut parts = raw.splitn(3, ':');
    let id = parts.next().unwrap_or_default().trim();
    let store_id = parts.next().map(str::trim).unwrap_or_default();
    if id.is_empty() || store_id.is_empty() {
        anyhow::bail!("store '{}' must look like key:store_id[:name]", raw);
    }
    let name = parts.next().map(str::trim).filter(|n| !n.is_empty());
    Ok(Store {
        id: id.to_string(),
        store_id: store_id.to_string(),
        name: name.unwrap_or(id).to_string(),
    })
}

fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", raw))
}

/// Plain numbers become JSON numbers; everything else stays text so the
/// validator can read formatted figures such as "R$ 1.234,56".
fn parse_value(raw: &str) -> Value {
    let raw = raw.trim();
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ Value::Number(_)) => v,
        _ => Value::String(raw.to_string()),
    }
}

fn collect_inputs(pairs: &[String], file: Option<&Path>) -> anyhow::Result<BTreeMap<String, Value>> {
    let mut values = BTreeMap::new();
    if let Some(path) = file {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let from_file: BTreeMap<String, Value> = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        values.extend(from_file);
    }
    for pair in pairs {
        let (k, v) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("input '{}' must look like key=value", pair))?;
        values.insert(k.trim().to_string(), parse_value(v));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stores_parse() {
        let s = parse_store("s1:001:Loja Centro").unwrap();
        assert_eq!((s.id.as_str(), s.store_id.as_str(), s.name.as_str()), ("s1", "001", "Loja Centro"));
        assert_eq!(parse_store("s2:002").unwrap().name, "s2");
        assert!(parse_store("s3").is_err());
    }

    #[test]
    fn input_values_keep_formatting() {
        assert_eq!(parse_value("150.5"), json!(150.5));
        assert_eq!(parse_value("R$ 1.234,56"), json!("R$ 1.234,56"));
        let v = collect_inputs(&["revenue#s1=10".into()], None).unwrap();
        assert_eq!(v["revenue#s1"], json!(10));
        assert!(collect_inputs(&["revenue".into()], None).is_err());
    }
}
