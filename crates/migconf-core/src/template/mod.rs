//! Structural checks run when a template is saved.
//!
//! `check` collects every problem as a [`Diagnostic`]; `ensure_valid` turns
//! the error-severity ones into [`CoreError::InvalidTemplate`], which blocks
//! the save.

use crate::errors::diagnostic::{codes, Diagnostic};
use crate::errors::{CoreError, CoreResult};
use crate::expand::KEY_SEPARATOR;
use crate::model::{ChecklistTemplate, InputKind, Scope, TemplateItem, ValidationRule};
use crate::sql;
use regex::Regex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

#[derive(Debug, Clone, Default)]
pub struct TemplateReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl TemplateReport {
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }

    pub fn is_ok(&self) -> bool {
        self.errors().next().is_none()
    }
}

fn semver_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("static regex"))
}

pub fn check(t: &ChecklistTemplate) -> TemplateReport {
    let mut diags = Vec::new();

    if !semver_re().is_match(t.version.trim()) {
        diags.push(
            Diagnostic::new(
                codes::E_TPL_VERSION,
                format!("template version '{}' is not X.Y.Z", t.version),
            )
            .with_source("template")
            .with_fix_step("Use a semantic version such as 1.0.0"),
        );
    }

    if t.items().next().is_none() {
        diags.push(
            Diagnostic::new(codes::E_TPL_EMPTY, "template has no checklist items")
                .with_source("template"),
        );
    }

    let mut orders: HashMap<i32, &str> = HashMap::new();
    let mut section_ids = HashSet::new();
    for s in &t.sections {
        if let Some(prev) = orders.insert(s.order, &s.id) {
            diags.push(
                Diagnostic::new(
                    codes::E_TPL_SECTION_ORDER,
                    format!(
                        "sections '{}' and '{}' share order {}",
                        prev, s.id, s.order
                    ),
                )
                .with_source("template")
                .with_context(json!({ "order": s.order })),
            );
        }
        if !section_ids.insert(s.id.as_str()) {
            diags.push(
                Diagnostic::new(
                    codes::E_TPL_DUPLICATE_ID,
                    format!("section id '{}' is used more than once", s.id),
                )
                .with_source("template"),
            );
        }
    }

    let mut input_keys = HashSet::new();
    for input in &t.expected_inputs {
        if !input_keys.insert(input.key.as_str()) {
            diags.push(
                Diagnostic::new(
                    codes::E_TPL_DUPLICATE_INPUT,
                    format!("expected input key '{}' is declared more than once", input.key),
                )
                .with_source("template"),
            );
        }
    }

    let mut item_ids = HashSet::new();
    let mut bound_keys = HashSet::new();
    for item in t.items() {
        if !item_ids.insert(item.id.as_str()) {
            diags.push(
                Diagnostic::new(
                    codes::E_TPL_DUPLICATE_ID,
                    format!("item id '{}' is used more than once", item.id),
                )
                .with_source("template"),
            );
        }
        if item.id.trim().is_empty() || item.id.contains(KEY_SEPARATOR) {
            diags.push(
                Diagnostic::new(
                    codes::E_TPL_ITEM_ID,
                    format!(
                        "item id '{}' must be non-empty and must not contain '{}'",
                        item.id, KEY_SEPARATOR
                    ),
                )
                .with_source("template"),
            );
        }
        if let Some(b) = item.binding() {
            bound_keys.insert(b.to_string());
        }
        check_item(t, item, &mut diags);
    }

    for input in &t.expected_inputs {
        if !bound_keys.contains(&input.key) {
            diags.push(
                Diagnostic::new(
                    codes::W_TPL_INPUT_UNUSED,
                    format!("expected input '{}' is not bound by any item", input.key),
                )
                .with_source("template"),
            );
        }
    }

    TemplateReport { diagnostics: diags }
}

fn check_item(t: &ChecklistTemplate, item: &TemplateItem, diags: &mut Vec<Diagnostic>) {
    let ctx = json!({ "item": item.id, "rule": item.validation_rule.name() });

    if let Err(reason) = sql::ensure_select_only(&item.query) {
        diags.push(
            Diagnostic::new(
                codes::E_TPL_QUERY,
                format!("item '{}': {}", item.id, reason),
            )
            .with_source("template")
            .with_context(ctx.clone())
            .with_fix_step("Checklist queries must be a single read-only SELECT"),
        );
    }

    if let ValidationRule::NumberMatchesExpectedWithTolerance { tolerance } = item.validation_rule
    {
        if !(tolerance > 0.0 && tolerance <= 1.0) {
            diags.push(
                Diagnostic::new(
                    codes::E_TPL_TOLERANCE,
                    format!(
                        "item '{}': tolerance {} must be a fraction in (0, 1]",
                        item.id, tolerance
                    ),
                )
                .with_source("template")
                .with_context(ctx.clone())
                .with_fix_step("Express tolerance as a fraction, e.g. 0.01 for 1%"),
            );
        }
    }

    match (item.validation_rule.needs_expected(), item.binding()) {
        (true, None) => diags.push(
            Diagnostic::new(
                codes::E_TPL_BINDING_MISSING,
                format!(
                    "item '{}' uses {} but declares no expectedInputBinding",
                    item.id,
                    item.validation_rule.name()
                ),
            )
            .with_source("template")
            .with_context(ctx.clone()),
        ),
        (needs, Some(binding)) => match t.find_input(binding) {
            None => diags.push(
                Diagnostic::new(
                    codes::E_TPL_BINDING_UNKNOWN,
                    format!(
                        "item '{}' binds unknown expected input '{}'",
                        item.id, binding
                    ),
                )
                .with_source("template")
                .with_context(ctx.clone()),
            ),
            Some(input) => {
                if item.scope == Scope::Global && input.scope == Scope::PerStore {
                    diags.push(
                        Diagnostic::new(
                            codes::E_TPL_SCOPE_MISMATCH,
                            format!(
                                "global item '{}' cannot bind per-store input '{}'",
                                item.id, binding
                            ),
                        )
                        .with_source("template")
                        .with_context(ctx.clone()),
                    );
                }
                if needs && input.kind == InputKind::Text {
                    diags.push(
                        Diagnostic::new(
                            codes::E_TPL_BINDING_TYPE,
                            format!(
                                "item '{}' compares numbers but binds text input '{}'",
                                item.id, binding
                            ),
                        )
                        .with_source("template")
                        .with_context(ctx.clone())
                        .with_fix_step("Declare the input as number or currency"),
                    );
                }
                if !needs {
                    diags.push(
                        Diagnostic::new(
                            codes::W_TPL_BINDING_UNUSED,
                            format!(
                                "item '{}' binds '{}' but {} ignores expected values",
                                item.id,
                                binding,
                                item.validation_rule.name()
                            ),
                        )
                        .with_source("template")
                        .with_context(ctx.clone()),
                    );
                }
            }
        },
        (false, None) => {}
    }

    if item.scope == Scope::PerStore
        && !sql::referenced_params(&item.query)
            .iter()
            .any(|p| p == sql::PARAM_STORE_ID)
    {
        diags.push(
            Diagnostic::new(
                codes::W_TPL_STORE_PARAM,
                format!(
                    "per-store item '{}' never references :{}",
                    item.id,
                    sql::PARAM_STORE_ID
                ),
            )
            .with_source("template")
            .with_context(ctx),
        );
    }
}

pub fn ensure_valid(t: &ChecklistTemplate) -> CoreResult<()> {
    let report = check(t);
    if report.is_ok() {
        return Ok(());
    }
    Err(CoreError::InvalidTemplate(
        report.errors().cloned().collect(),
    ))
}
