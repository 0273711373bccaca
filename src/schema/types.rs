//! Schema data model shared by every stage of the engine.

use crate::error::{PipelineError, Result};
use crate::lineage::hasher::hash_json;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Inferred column type.
///
/// Numeric columns follow the promotion chain integer ⊂ float ⊂ string;
/// boolean and datetime only survive when a column holds nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    String,
    Datetime,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Datetime => "datetime",
        }
    }

    /// Least upper bound of two observed types.
    pub fn promote(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Integer, Self::Float) | (Self::Float, Self::Integer) => Self::Float,
            _ => Self::String,
        }
    }

    /// Whether values of the two types may be compared or joined.
    pub fn is_comparable_with(self, other: Self) -> bool {
        (self.is_numeric() && other.is_numeric()) || self == other
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable,
        }
    }
}

/// Ordered, immutable description of a tabular source.
///
/// Input schemas carry a few representative rows and a row-count estimate;
/// schemas derived during validation carry neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SchemaRepr")]
pub struct Schema {
    columns: Vec<Column>,
    sample_rows: Vec<Vec<Option<String>>>,
    row_count_estimate: u64,
}

#[derive(Deserialize)]
struct SchemaRepr {
    columns: Vec<Column>,
    #[serde(default)]
    sample_rows: Vec<Vec<Option<String>>>,
    #[serde(default)]
    row_count_estimate: u64,
}

impl TryFrom<SchemaRepr> for Schema {
    type Error = PipelineError;

    fn try_from(repr: SchemaRepr) -> Result<Self> {
        Self::new(repr.columns, repr.sample_rows, repr.row_count_estimate)
    }
}

impl Schema {
    /// Build a schema, rejecting empty column lists and duplicate names.
    pub fn new(
        columns: Vec<Column>,
        sample_rows: Vec<Vec<Option<String>>>,
        row_count_estimate: u64,
    ) -> Result<Self> {
        if columns.is_empty() {
            return Err(PipelineError::SchemaInference(
                "a schema needs at least one column".to_owned(),
            ));
        }

        let mut seen = HashSet::new();
        for column in &columns {
            if column.name.is_empty() {
                return Err(PipelineError::SchemaInference(
                    "column names must not be empty".to_owned(),
                ));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(PipelineError::SchemaInference(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
        }

        if let Some(row) = sample_rows.iter().find(|r| r.len() != columns.len()) {
            return Err(PipelineError::SchemaInference(format!(
                "sample row has {} values but the schema has {} columns",
                row.len(),
                columns.len()
            )));
        }

        Ok(Self {
            columns,
            sample_rows,
            row_count_estimate,
        })
    }

    /// Schema produced by a transformation step. Callers guarantee unique,
    /// non-empty column lists.
    pub(crate) fn derived(columns: Vec<Column>) -> Self {
        Self {
            columns,
            sample_rows: Vec::new(),
            row_count_estimate: 0,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn sample_rows(&self) -> &[Vec<Option<String>>] {
        &self.sample_rows
    }

    pub fn row_count_estimate(&self) -> u64 {
        self.row_count_estimate
    }

    /// Content hash of the column names, types and nullability.
    ///
    /// Sample rows and the row estimate do not participate, so two samples
    /// of the same table fingerprint identically.
    pub fn fingerprint(&self) -> String {
        hash_json(&self.columns)
    }
}
