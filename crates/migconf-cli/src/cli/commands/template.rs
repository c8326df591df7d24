use super::{exit_codes, AppContext};
use crate::cli::args::{GlobalArgs, TemplateFileArgs, TemplateSub};
use migconf_core::config::load_template;
use migconf_core::errors::diagnostic::{codes, Diagnostic};
use migconf_core::fingerprint::template_fingerprint;
use migconf_core::template::{check, TemplateReport};
use serde_json::json;

pub fn run(global: &GlobalArgs, args: crate::cli::args::TemplateArgs) -> anyhow::Result<i32> {
    match args.cmd {
        TemplateSub::Validate(a) => validate(a),
        TemplateSub::Import(a) => import(global, a),
        TemplateSub::List => list(global),
    }
}

fn load_and_check(args: &TemplateFileArgs) -> (Option<migconf_core::model::ChecklistTemplate>, TemplateReport) {
    match load_template(&args.file) {
        Ok(t) => {
            let report = check(&t);
            (Some(t), report)
        }
        Err(e) => {
            let diag = Diagnostic::new(codes::E_CFG_PARSE, format!("Failed to load template: {}", e))
                .with_source("template")
                .with_context(json!({ "file": args.file }));
            (
                None,
                TemplateReport {
                    diagnostics: vec![diag],
                },
            )
        }
    }
}

fn validate(args: TemplateFileArgs) -> anyhow::Result<i32> {
    let (_, report) = load_and_check(&args);
    print_report(&report, &args.format);
    if report.is_ok() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::CONFIG_ERROR)
    }
}

fn import(global: &GlobalArgs, args: TemplateFileArgs) -> anyhow::Result<i32> {
    let (template, report) = load_and_check(&args);
    let template = match template {
        Some(t) if report.is_ok() => t,
        _ => {
            print_report(&report, &args.format);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    for w in report.warnings() {
        eprintln!("{}", w.format_terminal());
    }

    let ctx = AppContext::open(global)?;
    let previous = ctx.store.template_fingerprint(&template.id)?;
    let fingerprint = template_fingerprint(&template);
    ctx.store.save_template(&template)?;

    match previous {
        Some(prev) if prev != fingerprint => {
            let usage = ctx.store.template_usage(&template.id)?;
            println!(
                "✅ Template '{}' updated (v{}); {} existing conference(s) keep their snapshot",
                template.id, template.version, usage
            );
        }
        Some(_) => println!("✅ Template '{}' unchanged", template.id),
        None => println!("✅ Template '{}' imported (v{})", template.id, template.version),
    }
    Ok(exit_codes::OK)
}

fn list(global: &GlobalArgs) -> anyhow::Result<i32> {
    let ctx = AppContext::open(global)?;
    let templates = ctx.store.list_templates()?;
    if templates.is_empty() {
        println!("No templates. Import one with: migconf template import --file <path>");
        return Ok(exit_codes::OK);
    }
    for t in templates {
        let items = t.items().count();
        let usage = ctx.store.template_usage(&t.id)?;
        println!(
            "{:<24} v{:<8} {:>3} items  {:>3} conferences  {}",
            t.id,
            t.version,
            items,
            usage,
            &template_fingerprint(&t)[..12]
        );
    }
    Ok(exit_codes::OK)
}

fn print_report(report: &TemplateReport, format: &str) {
    if format == "json" {
        let errors: Vec<&Diagnostic> = report.errors().collect();
        let warnings: Vec<&Diagnostic> = report.warnings().collect();
        let output = json!({
            "schema_version": 1,
            "ok": errors.is_empty(),
            "errors": errors,
            "warnings": warnings,
            "summary": { "diagnostic_count": report.diagnostics.len() }
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_else(|_| output.to_string())
        );
        return;
    }

    if report.diagnostics.is_empty() {
        println!("✅ Template is valid");
        return;
    }
    for d in &report.diagnostics {
        println!("{}", d.format_terminal());
    }
    let errors = report.errors().count();
    let warnings = report.warnings().count();
    if errors == 0 {
        println!("✅ Template is valid ({} warning(s))", warnings);
    } else {
        println!("❌ {} error(s), {} warning(s)", errors, warnings);
    }
}
