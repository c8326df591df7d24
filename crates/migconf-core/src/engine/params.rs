use crate::errors::{CoreError, CoreResult};
use crate::expand::binding_key;
use crate::model::{Conference, ConferenceItem, TemplateItem};
use crate::providers::query::QueryParams;
use crate::sql::{PARAM_DATE_END, PARAM_DATE_START, PARAM_EXPECTED, PARAM_STORE_ID};
use crate::validation::numeric::coerce_input;
use serde_json::{Number, Value};

/// Value the client supplied for the item's binding, if any. Blank strings
/// and nulls count as not supplied. Figures of number and currency inputs
/// come back as JSON numbers read according to the input type.
pub fn resolve_expected(
    conf: &Conference,
    template_item: &TemplateItem,
    item: &ConferenceItem,
) -> Option<Value> {
    let binding = template_item.binding()?;
    let input = conf.template.find_input(binding);
    let scope = input.map(|i| i.scope).unwrap_or(template_item.scope);
    let key = binding_key(binding, scope, item.store_id.as_deref());
    let raw = match conf.expected_input_values.get(&key) {
        None | Some(Value::Null) => return None,
        Some(Value::String(s)) if s.trim().is_empty() => return None,
        Some(v) => v,
    };
    let coerced = input
        .and_then(|i| coerce_input(raw, i.kind))
        .and_then(Number::from_f64)
        .map(Value::Number);
    Some(coerced.unwrap_or_else(|| raw.clone()))
}

/// Parameters offered to the item's query. The executor binds the subset the
/// statement declares.
pub fn build_params(
    conf: &Conference,
    template_item: &TemplateItem,
    item: &ConferenceItem,
) -> CoreResult<(QueryParams, Option<Value>)> {
    let mut params = QueryParams::new();

    if let Some(store_key) = item.store_id.as_deref() {
        let store = conf
            .store(store_key)
            .ok_or_else(|| CoreError::not_found("store", store_key))?;
        params.insert(PARAM_STORE_ID.into(), Value::String(store.store_id.clone()));
    }

    if let Some(period) = &conf.period {
        params.insert(
            PARAM_DATE_START.into(),
            Value::String(period.start.format("%Y-%m-%d").to_string()),
        );
        params.insert(
            PARAM_DATE_END.into(),
            Value::String(period.end.format("%Y-%m-%d").to_string()),
        );
    }

    let expected = resolve_expected(conf, template_item, item);
    if let Some(v) = &expected {
        params.insert(PARAM_EXPECTED.into(), v.clone());
    }
    Ok((params, expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use chrono::{NaiveDate, Utc};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn conference(values: BTreeMap<String, Value>) -> Conference {
        let item = TemplateItem {
            id: "rev".into(),
            title: String::new(),
            query: "SELECT 1".into(),
            scope: Scope::PerStore,
            validation_rule: ValidationRule::NumberEqualsExpected,
            expected_input_binding: Some("revenue".into()),
            auto_resolve: true,
        };
        let template = ChecklistTemplate {
            id: "t".into(),
            name: "t".into(),
            description: None,
            version: "1.0.0".into(),
            sections: vec![TemplateSection {
                id: "s".into(),
                title: String::new(),
                order: 1,
                items: vec![item],
            }],
            expected_inputs: vec![ExpectedInput {
                key: "revenue".into(),
                label: String::new(),
                scope: Scope::PerStore,
                kind: InputKind::Currency,
                required: true,
            }],
            created_at: None,
            updated_at: None,
        };
        let now = Utc::now();
        Conference {
            id: "c".into(),
            client_name: "ACME".into(),
            template_id: "t".into(),
            template,
            template_fingerprint: None,
            connection_id: "main".into(),
            stores: vec![Store {
                id: "s1".into(),
                store_id: "0042".into(),
                name: "Centro".into(),
            }],
            period: Some(DateRange {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            }),
            expected_input_values: values,
            items: vec![],
            status: ConferenceStatus::Pending,
            link_token: "tok".into(),
            link_expires_at: now,
            email_history: vec![],
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[test]
    fn binds_business_store_id_and_period() {
        let mut values = BTreeMap::new();
        values.insert("revenue#s1".into(), json!("1.234,50"));
        let conf = conference(values);
        let ti = conf.template.find_item("rev").unwrap().clone();
        let item = ConferenceItem::new("rev#s1".into(), "rev".into(), Some("s1".into()));

        let (params, expected) = build_params(&conf, &ti, &item).unwrap();
        assert_eq!(params[PARAM_STORE_ID], json!("0042"));
        assert_eq!(params[PARAM_DATE_START], json!("2024-01-01"));
        assert_eq!(params[PARAM_DATE_END], json!("2024-01-31"));
        assert_eq!(expected, Some(json!(1234.5)));
        assert_eq!(params[PARAM_EXPECTED], json!(1234.5));
    }

    #[test]
    fn currency_figures_read_dot_groups_as_thousands() {
        let mut values = BTreeMap::new();
        values.insert("revenue#s1".into(), json!("1.234"));
        let conf = conference(values);
        let ti = conf.template.find_item("rev").unwrap().clone();
        let item = ConferenceItem::new("rev#s1".into(), "rev".into(), Some("s1".into()));
        let (_, expected) = build_params(&conf, &ti, &item).unwrap();
        assert_eq!(expected, Some(json!(1234.0)));
    }

    #[test]
    fn blank_expected_is_unresolved() {
        let mut values = BTreeMap::new();
        values.insert("revenue#s1".into(), json!("  "));
        let conf = conference(values);
        let ti = conf.template.find_item("rev").unwrap().clone();
        let item = ConferenceItem::new("rev#s1".into(), "rev".into(), Some("s1".into()));
        let (params, expected) = build_params(&conf, &ti, &item).unwrap();
        assert!(expected.is_none());
        assert!(!params.contains_key(PARAM_EXPECTED));
    }

    #[test]
    fn unknown_store_is_not_found() {
        let conf = conference(BTreeMap::new());
        let ti = conf.template.find_item("rev").unwrap().clone();
        let item = ConferenceItem::new("rev#s9".into(), "rev".into(), Some("s9".into()));
        assert!(matches!(
            build_params(&conf, &ti, &item),
            Err(CoreError::NotFound { kind: "store", .. })
        ));
    }
}
