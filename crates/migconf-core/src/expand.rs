//! Expansion of a template into the concrete items of a conference.

use crate::errors::diagnostic::{codes, Diagnostic};
use crate::errors::{CoreError, CoreResult};
use crate::model::{ChecklistTemplate, Conference, ConferenceItem, Scope, Store};
use std::collections::HashSet;

/// Separator of composite keys (`item#store`, `binding#store`).
pub const KEY_SEPARATOR: char = '#';

pub fn composite_key(base: &str, store_id: &str) -> String {
    format!("{}{}{}", base, KEY_SEPARATOR, store_id)
}

/// Key under which a conference stores the value for `binding`. Per-store
/// inputs are keyed by store; global inputs by the binding alone.
pub fn binding_key(binding: &str, input_scope: Scope, store_id: Option<&str>) -> String {
    match (input_scope, store_id) {
        (Scope::PerStore, Some(store)) => composite_key(binding, store),
        _ => binding.to_string(),
    }
}

pub fn expand(template: &ChecklistTemplate, stores: &[Store]) -> CoreResult<Vec<ConferenceItem>> {
    let mut diags = Vec::new();
    for item in template.items() {
        if item.validation_rule.needs_expected() && item.binding().is_none() {
            diags.push(
                Diagnostic::new(
                    codes::E_TPL_BINDING_MISSING,
                    format!(
                        "item '{}' uses {} but declares no expectedInputBinding",
                        item.id,
                        item.validation_rule.name()
                    ),
                )
                .with_source("expand"),
            );
        }
    }
    let mut seen = HashSet::new();
    for s in stores {
        if s.id.trim().is_empty() || s.id.contains(KEY_SEPARATOR) {
            diags.push(
                Diagnostic::new(
                    codes::E_TPL_STORE_ID,
                    format!("store id '{}' must be non-empty and free of '{}'", s.id, KEY_SEPARATOR),
                )
                .with_source("expand"),
            );
        } else if !seen.insert(s.id.as_str()) {
            diags.push(
                Diagnostic::new(
                    codes::E_TPL_STORE_ID,
                    format!("store id '{}' appears more than once", s.id),
                )
                .with_source("expand"),
            );
        }
    }
    if !diags.is_empty() {
        return Err(CoreError::InvalidTemplate(diags));
    }

    let mut out = Vec::new();
    for section in template.ordered_sections() {
        for item in &section.items {
            match item.scope {
                Scope::Global => {
                    out.push(ConferenceItem::new(item.id.clone(), item.id.clone(), None));
                }
                Scope::PerStore => {
                    for store in stores {
                        out.push(ConferenceItem::new(
                            composite_key(&item.id, &store.id),
                            item.id.clone(),
                            Some(store.id.clone()),
                        ));
                    }
                }
            }
        }
    }
    Ok(out)
}

/// Binding keys the client still has to supply for required inputs.
pub fn missing_required_inputs(conf: &Conference) -> Vec<String> {
    let mut missing = Vec::new();
    for input in conf.template.expected_inputs.iter().filter(|i| i.required) {
        let keys: Vec<String> = match input.scope {
            Scope::Global => vec![input.key.clone()],
            Scope::PerStore => conf
                .stores
                .iter()
                .map(|s| composite_key(&input.key, &s.id))
                .collect(),
        };
        for key in keys {
            let supplied = conf
                .expected_input_values
                .get(&key)
                .is_some_and(|v| !v.is_null() && v.as_str().map_or(true, |s| !s.trim().is_empty()));
            if !supplied {
                missing.push(key);
            }
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemStatus, TemplateItem, TemplateSection, ValidationRule};

    fn item(id: &str, scope: Scope) -> TemplateItem {
        TemplateItem {
            id: id.into(),
            title: String::new(),
            query: "SELECT 1 WHERE :store_id IS NOT NULL".into(),
            scope,
            validation_rule: ValidationRule::MustReturnRows,
            expected_input_binding: None,
            auto_resolve: false,
        }
    }

    fn store(id: &str) -> Store {
        Store {
            id: id.into(),
            store_id: format!("ext-{}", id),
            name: format!("Store {}", id),
        }
    }

    fn template() -> ChecklistTemplate {
        ChecklistTemplate {
            id: "t".into(),
            name: "t".into(),
            description: None,
            version: "1.0.0".into(),
            sections: vec![
                TemplateSection {
                    id: "late".into(),
                    title: String::new(),
                    order: 2,
                    items: vec![item("c", Scope::Global)],
                },
                TemplateSection {
                    id: "early".into(),
                    title: String::new(),
                    order: 1,
                    items: vec![item("a", Scope::Global), item("b", Scope::PerStore)],
                },
            ],
            expected_inputs: vec![],
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn counts_and_ids() {
        let stores = vec![store("1"), store("2"), store("3")];
        let items = expand(&template(), &stores).unwrap();
        // 2 global + 1 per-store x 3 stores
        assert_eq!(items.len(), 5);
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b#1", "b#2", "b#3", "c"]);
        let unique: HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len());
        assert!(items.iter().all(|i| i.status == ItemStatus::Pending
            && i.query_result.is_none()
            && i.user_response.is_none()
            && i.observation.is_none()));
        assert_eq!(items[1].store_id.as_deref(), Some("1"));
    }

    #[test]
    fn no_stores_drops_per_store_items() {
        let items = expand(&template(), &[]).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn deterministic() {
        let stores = vec![store("x"), store("y")];
        assert_eq!(
            expand(&template(), &stores).unwrap(),
            expand(&template(), &stores).unwrap()
        );
    }

    #[test]
    fn missing_binding_is_invalid_template() {
        let mut t = template();
        t.sections[0].items[0].validation_rule =
            ValidationRule::NumberMatchesExpectedWithTolerance { tolerance: 0.1 };
        let err = expand(&t, &[store("1")]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTemplate(_)));
    }

    #[test]
    fn duplicate_store_ids_rejected() {
        let err = expand(&template(), &[store("1"), store("1")]).unwrap_err();
        assert_eq!(err.diagnostics()[0].code, codes::E_TPL_STORE_ID);
        assert!(expand(&template(), &[store("a#b")]).is_err());
    }

    #[test]
    fn binding_keys() {
        assert_eq!(binding_key("rev", Scope::Global, Some("1")), "rev");
        assert_eq!(binding_key("rev", Scope::PerStore, Some("1")), "rev#1");
        assert_eq!(binding_key("rev", Scope::PerStore, None), "rev");
    }
}
