//! Validation rules applied to checklist query results.
//!
//! Every rule is total: a result with the wrong shape produces a `Fail`
//! outcome with a reason, never an error. `Inconclusive` is reserved for the
//! cases where the rule cannot decide, such as an unresolved expected value.

mod expected;
pub mod numeric;
mod rows;
mod single_number;

use crate::model::{QueryResult, ValidationRule};
use serde::{Deserialize, Serialize};

/// Floor for the relative-difference denominator and the absolute comparison
/// used when the expected value is zero.
pub const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
    Inconclusive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Validation {
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Validation {
    pub fn pass() -> Self {
        Self {
            outcome: Outcome::Pass,
            reason: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Fail,
            reason: Some(reason.into()),
        }
    }

    pub fn inconclusive(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Inconclusive,
            reason: Some(reason.into()),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.outcome == Outcome::Pass
    }
}

pub fn validate(
    rule: &ValidationRule,
    result: &QueryResult,
    expected: Option<&serde_json::Value>,
) -> Validation {
    let v = match rule {
        ValidationRule::SingleNumberRequired => single_number::check(result),
        ValidationRule::MustReturnRows => rows::must_return_rows(result),
        ValidationRule::MustReturnNoRows => rows::must_return_no_rows(result),
        ValidationRule::NumberEqualsExpected => expected::equals(result, expected),
        ValidationRule::NumberMatchesExpectedWithTolerance { tolerance } => {
            expected::within_tolerance(result, expected, *tolerance)
        }
    };
    tracing::debug!(
        event = "migconf.validation.evaluated",
        rule = rule.name(),
        outcome = ?v.outcome,
        reason = v.reason.as_deref().unwrap_or(""),
    );
    v
}
