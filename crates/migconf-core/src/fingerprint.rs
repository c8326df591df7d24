use crate::model::ChecklistTemplate;
use sha2::{Digest, Sha256};

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Fingerprint of the parts of a template that affect evaluation.
///
/// Name, description and timestamps are cosmetic and excluded, so renaming a
/// template keeps its fingerprint while editing a query or rule changes it.
pub fn template_fingerprint(t: &ChecklistTemplate) -> String {
    let mut parts = vec![format!("id={}", t.id), format!("version={}", t.version)];

    for section in t.ordered_sections() {
        parts.push(format!("section={}@{}", section.id, section.order));
        for item in &section.items {
            let rule = serde_json::to_string(&item.validation_rule).unwrap_or_default();
            parts.push(format!(
                "item={}|scope={:?}|rule={}|binding={}|auto={}|query={}",
                item.id,
                item.scope,
                rule,
                item.binding().unwrap_or(""),
                item.auto_resolve,
                item.query.trim()
            ));
        }
    }

    let mut inputs: Vec<String> = t
        .expected_inputs
        .iter()
        .map(|i| format!("input={}|{:?}|{:?}|{}", i.key, i.scope, i.kind, i.required))
        .collect();
    inputs.sort();
    parts.extend(inputs);

    sha256_hex(&parts.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Scope, TemplateItem, TemplateSection, ValidationRule};

    fn template() -> ChecklistTemplate {
        ChecklistTemplate {
            id: "t".into(),
            name: "Original".into(),
            description: None,
            version: "1.0.0".into(),
            sections: vec![TemplateSection {
                id: "s".into(),
                title: String::new(),
                order: 1,
                items: vec![TemplateItem {
                    id: "q".into(),
                    title: String::new(),
                    query: "SELECT 1".into(),
                    scope: Scope::Global,
                    validation_rule: ValidationRule::MustReturnRows,
                    expected_input_binding: None,
                    auto_resolve: false,
                }],
            }],
            expected_inputs: vec![],
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn cosmetic_edits_keep_fingerprint() {
        let a = template();
        let mut b = template();
        b.name = "Renamed".into();
        b.description = Some("new words".into());
        assert_eq!(template_fingerprint(&a), template_fingerprint(&b));
    }

    #[test]
    fn query_edits_change_fingerprint() {
        let a = template();
        let mut b = template();
        b.sections[0].items[0].query = "SELECT 2".into();
        assert_ne!(template_fingerprint(&a), template_fingerprint(&b));
    }
}
