use super::Validation;
use crate::model::QueryResult;

pub(super) fn must_return_rows(result: &QueryResult) -> Validation {
    if result.row_count() >= 1 {
        Validation::pass()
    } else {
        Validation::fail("expected at least one row, query returned none")
    }
}

pub(super) fn must_return_no_rows(result: &QueryResult) -> Validation {
    match result.row_count() {
        0 => Validation::pass(),
        1 => Validation::fail("expected no rows, query returned 1 row"),
        n => Validation::fail(format!("expected no rows, query returned {} rows", n)),
    }
}
