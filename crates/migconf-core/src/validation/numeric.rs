use crate::model::InputKind;
use serde_json::Value;

/// Reads a JSON cell as a number. Strings are accepted when they hold a
/// plain, grouped or currency-formatted number ("1.234,56", "R$ 10", "1,234.50").
pub fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Reads a client-supplied figure according to the declared input type.
/// Currency inputs read a lone "1.234" as grouping; text inputs never coerce.
pub fn coerce_input(v: &Value, kind: InputKind) -> Option<f64> {
    match (kind, v) {
        (InputKind::Text, _) => None,
        (_, Value::Number(n)) => n.as_f64(),
        (InputKind::Currency, Value::String(s)) => parse_amount(s, true),
        (InputKind::Number, Value::String(s)) => parse_amount(s, false),
        _ => None,
    }
}

pub fn parse_number(raw: &str) -> Option<f64> {
    parse_amount(raw, currency_marked(raw))
}

/// With `currency` set, a single dot followed by exactly three digits groups
/// thousands ("R$ 1.234" is 1234), as amounts rarely carry three decimals.
pub fn parse_amount(raw: &str, currency: bool) -> Option<f64> {
    let mut s: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-' | '+'))
        .collect();
    if s.is_empty() || !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    // Reject text that merely contains digits, e.g. "abc1x".
    if raw.trim().chars().any(|c| c.is_alphabetic()) && !looks_like_currency(raw) {
        return None;
    }

    let last_comma = s.rfind(',');
    let last_dot = s.rfind('.');
    s = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(c), None) => {
            let decimals = s.len() - c - 1;
            if s.matches(',').count() == 1 && decimals != 3 {
                s.replace(',', ".")
            } else {
                s.replace(',', "")
            }
        }
        (None, Some(d)) => {
            let decimals = s.len() - d - 1;
            if s.matches('.').count() > 1 || (decimals == 3 && (currency || is_grouped(&s, '.'))) {
                s.replace('.', "")
            } else {
                s
            }
        }
        (None, None) => s,
    };
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn currency_marked(raw: &str) -> bool {
    raw.contains(&['$', '€', '£'][..]) || looks_like_currency(raw)
}

fn looks_like_currency(raw: &str) -> bool {
    let letters: String = raw.chars().filter(|c| c.is_alphabetic()).collect();
    matches!(letters.to_ascii_uppercase().as_str(), "R" | "US" | "BRL" | "USD" | "EUR")
}

/// "1.234" reads as grouping only with a multi-group prefix such as "12.345.678";
/// a lone "1.234" stays a decimal.
fn is_grouped(s: &str, sep: char) -> bool {
    s.matches(sep).count() > 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_common_formats() {
        assert_eq!(parse_number("42"), Some(42.0));
        assert_eq!(parse_number("-3.5"), Some(-3.5));
        assert_eq!(parse_number("1.234,56"), Some(1234.56));
        assert_eq!(parse_number("1,234.56"), Some(1234.56));
        assert_eq!(parse_number("12,5"), Some(12.5));
        assert_eq!(parse_number("1,234"), Some(1234.0));
        assert_eq!(parse_number("1.234.567"), Some(1234567.0));
        assert_eq!(parse_number("R$ 1.234,50"), Some(1234.5));
        assert_eq!(parse_number(" 7 "), Some(7.0));
    }

    #[test]
    fn currency_reads_a_lone_dot_group_as_thousands() {
        assert_eq!(parse_number("R$ 1.234"), Some(1234.0));
        assert_eq!(parse_number("US$ 12.500"), Some(12500.0));
        assert_eq!(parse_number("BRL 2.000"), Some(2000.0));
        assert_eq!(parse_number("1.234"), Some(1.234));
        assert_eq!(parse_number("R$ 10.5"), Some(10.5));
    }

    #[test]
    fn coercion_follows_the_input_type() {
        assert_eq!(coerce_input(&json!("1.234"), InputKind::Currency), Some(1234.0));
        assert_eq!(coerce_input(&json!("1.234"), InputKind::Number), Some(1.234));
        assert_eq!(coerce_input(&json!("150,50"), InputKind::Currency), Some(150.5));
        assert_eq!(coerce_input(&json!(42), InputKind::Number), Some(42.0));
        assert_eq!(coerce_input(&json!("42"), InputKind::Text), None);
        assert_eq!(coerce_input(&json!("n/a"), InputKind::Currency), None);
        assert_eq!(coerce_input(&json!(true), InputKind::Number), None);
    }

    #[test]
    fn rejects_non_numbers() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("x1y"), None);
        assert_eq!(as_number(&json!(true)), None);
        assert_eq!(as_number(&json!(null)), None);
    }

    #[test]
    fn numbers_pass_through() {
        assert_eq!(as_number(&json!(3)), Some(3.0));
        assert_eq!(as_number(&json!(2.25)), Some(2.25));
    }
}
