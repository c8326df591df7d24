use super::numeric::as_number;
use super::single_number::scalar_of;
use super::{Validation, EPSILON};
use crate::model::QueryResult;

fn resolve_expected(expected: Option<&serde_json::Value>) -> Result<f64, Validation> {
    let Some(raw) = expected else {
        return Err(Validation::inconclusive("expected value not supplied"));
    };
    as_number(raw).ok_or_else(|| {
        Validation::inconclusive(format!("expected value {} is not numeric", raw))
    })
}

pub(super) fn equals(result: &QueryResult, expected: Option<&serde_json::Value>) -> Validation {
    let actual = match scalar_of(result) {
        Ok(n) => n,
        Err(reason) => return Validation::fail(reason),
    };
    let expected = match resolve_expected(expected) {
        Ok(n) => n,
        Err(v) => return v,
    };
    if actual == expected {
        Validation::pass()
    } else {
        Validation::fail(format!("result {} differs from expected {}", actual, expected))
    }
}

pub(super) fn within_tolerance(
    result: &QueryResult,
    expected: Option<&serde_json::Value>,
    tolerance: f64,
) -> Validation {
    if !(tolerance > 0.0 && tolerance <= 1.0) {
        return Validation::inconclusive(format!(
            "tolerance {} outside (0, 1]",
            tolerance
        ));
    }
    let actual = match scalar_of(result) {
        Ok(n) => n,
        Err(reason) => return Validation::fail(reason),
    };
    let expected = match resolve_expected(expected) {
        Ok(n) => n,
        Err(v) => return v,
    };

    let diff = (actual - expected).abs();
    if expected.abs() < EPSILON {
        return if diff <= EPSILON {
            Validation::pass()
        } else {
            Validation::fail(format!("result {} differs from expected 0", actual))
        };
    }

    let relative = diff / expected.abs().max(EPSILON);
    if relative <= tolerance {
        Validation::pass()
    } else {
        Validation::fail(format!(
            "result {} deviates {:.4}% from expected {} (tolerance {:.4}%)",
            actual,
            relative * 100.0,
            expected,
            tolerance * 100.0
        ))
    }
}
