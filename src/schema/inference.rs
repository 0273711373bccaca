//! Column type inference over raw text samples.
//!
//! Every column starts with no observed type. Each non-missing value is
//! classified on its own and folded into the running type with
//! [`ColumnType::promote`], so a column ends up with the most specific type
//! that admits every value it held.

use super::types::{Column, ColumnType, Schema};
use crate::error::{PipelineError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Markers that tabular readers treat as a missing value.
const MISSING_MARKERS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

pub fn is_missing(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || MISSING_MARKERS.contains(&trimmed)
}

/// Classify a single non-missing value.
pub fn classify_value(value: &str) -> ColumnType {
    let v = value.trim();

    if v.parse::<i64>().is_ok() {
        return ColumnType::Integer;
    }
    if v.parse::<f64>().is_ok_and(f64::is_finite) {
        return ColumnType::Float;
    }
    if v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("false") {
        return ColumnType::Boolean;
    }
    if is_datetime(v) {
        return ColumnType::Datetime;
    }
    ColumnType::String
}

/// ISO-8601 date or date-time, with or without offset.
pub fn is_datetime(value: &str) -> bool {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || DateTime::parse_from_rfc3339(value).is_ok()
        // PostgreSQL's text form of timestamptz, e.g. `2024-02-29 10:00:00+00`
        || DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%#z").is_ok()
}

#[derive(Debug, Default)]
struct ColumnAccumulator {
    observed: Option<ColumnType>,
    has_missing: bool,
}

impl ColumnAccumulator {
    fn observe(&mut self, value: Option<&str>) {
        match value {
            Some(v) if !is_missing(v) => {
                let kind = classify_value(v);
                self.observed = Some(match self.observed {
                    Some(current) => current.promote(kind),
                    None => kind,
                });
            }
            _ => self.has_missing = true,
        }
    }

    fn finish(self, name: String) -> Column {
        Column::new(
            name,
            self.observed.unwrap_or(ColumnType::String),
            self.has_missing,
        )
    }
}

/// Infer a schema from a header and raw rows.
///
/// `None` cells are treated like empty strings. `prompt_rows` limits how many
/// rows are kept as representative samples; `row_count_estimate` is recorded
/// as given.
///
/// # Errors
///
/// Returns [`PipelineError::SchemaInference`] when the header is empty, has
/// empty or duplicate names, or any row's width differs from the header.
pub fn infer_from_rows(
    header: &[String],
    rows: &[Vec<Option<String>>],
    prompt_rows: usize,
    row_count_estimate: u64,
) -> Result<Schema> {
    if header.is_empty() {
        return Err(PipelineError::SchemaInference(
            "sample has zero columns".to_owned(),
        ));
    }

    let mut accumulators: Vec<ColumnAccumulator> =
        header.iter().map(|_| ColumnAccumulator::default()).collect();

    for (row_idx, row) in rows.iter().enumerate() {
        if row.len() != header.len() {
            return Err(PipelineError::SchemaInference(format!(
                "row {} has {} values but the header has {} columns",
                row_idx + 1,
                row.len(),
                header.len()
            )));
        }
        for (acc, cell) in accumulators.iter_mut().zip(row) {
            acc.observe(cell.as_deref());
        }
    }

    let columns = accumulators
        .into_iter()
        .zip(header)
        .map(|(acc, name)| acc.finish(name.trim().to_owned()))
        .collect();

    let samples = rows
        .iter()
        .take(prompt_rows)
        .map(|row| {
            row.iter()
                .map(|cell| cell.as_ref().filter(|v| !is_missing(v)).cloned())
                .collect()
        })
        .collect();

    Schema::new(columns, samples, row_count_estimate)
}
