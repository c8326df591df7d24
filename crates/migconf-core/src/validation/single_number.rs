use super::numeric::as_number;
use super::Validation;
use crate::model::QueryResult;

/// Extracts the single numeric cell of a one-row, one-column result.
pub(super) fn scalar_of(result: &QueryResult) -> Result<f64, String> {
    let rows = result.row_count();
    if rows != 1 {
        return Err(format!(
            "expected exactly 1 row with 1 numeric column, got {} rows",
            rows
        ));
    }
    let row = &result.rows[0];
    if row.len() != 1 {
        return Err(format!(
            "expected exactly 1 row with 1 numeric column, got {} columns",
            row.len()
        ));
    }
    as_number(&row[0]).ok_or_else(|| format!("value {} is not numeric", row[0]))
}

pub(super) fn check(result: &QueryResult) -> Validation {
    match scalar_of(result) {
        Ok(_) => Validation::pass(),
        Err(reason) => Validation::fail(reason),
    }
}
