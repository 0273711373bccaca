//! Operation grammar shared by the builder, validator and renderers.
//!
//! Plans serialize as `{"operations": [...]}` with each element tagged by
//! `"op"`, the same shape the text generator is asked to emit.

use crate::lineage::hasher::hash_json;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "==", alias = "=", alias = "eq")]
    Eq,
    #[serde(rename = "!=", alias = "<>", alias = "ne")]
    Ne,
    #[serde(rename = ">", alias = "gt")]
    Gt,
    #[serde(rename = ">=", alias = "ge", alias = "gte")]
    Ge,
    #[serde(rename = "<", alias = "lt")]
    Lt,
    #[serde(rename = "<=", alias = "le", alias = "lte")]
    Le,
}

impl Comparator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    /// Whether the comparator only tests equality.
    pub fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Scalar literal on the right-hand side of a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "'{s}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Count,
    #[serde(alias = "nunique")]
    CountDistinct,
    Sum,
    #[serde(alias = "mean", alias = "average")]
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::CountDistinct => "count_distinct",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    pub column: String,
    pub function: AggregateFunction,
}

impl Aggregation {
    pub fn new(column: impl Into<String>, function: AggregateFunction) -> Self {
        Self {
            column: column.into(),
            function,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    #[serde(alias = "outer")]
    Full,
}

impl JoinKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inner => "inner",
            Self::Left => "left",
            Self::Right => "right",
            Self::Full => "full",
        }
    }

    /// Left-side rows survive without a match.
    pub fn keeps_left(self) -> bool {
        matches!(self, Self::Left | Self::Full)
    }

    /// Right-side rows survive without a match.
    pub fn keeps_right(self) -> bool {
        matches!(self, Self::Right | Self::Full)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ascending")]
    Asc,
    #[serde(alias = "descending")]
    Desc,
}

impl SortDirection {
    pub fn is_ascending(self) -> bool {
        self == Self::Asc
    }
}

/// One transformation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Keep rows where `column <comparator> value` holds. Nulls never match.
    Filter {
        column: String,
        comparator: Comparator,
        value: Literal,
    },

    /// Group by `keys` and compute named aggregates.
    GroupBy {
        keys: Vec<String>,
        aggregations: IndexMap<String, Aggregation>,
    },

    /// Join the current table with another named source.
    Join {
        right: String,
        left_key: String,
        right_key: String,
        #[serde(default)]
        kind: JoinKind,
    },

    /// Keep exactly these columns, in this order.
    Select { columns: Vec<String> },

    Sort {
        column: String,
        #[serde(default)]
        direction: SortDirection,
    },

    Limit { count: u64 },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Filter { .. } => "filter",
            Self::GroupBy { .. } => "group_by",
            Self::Join { .. } => "join",
            Self::Select { .. } => "select",
            Self::Sort { .. } => "sort",
            Self::Limit { .. } => "limit",
        }
    }

    /// Human-readable description used for artifact step lists.
    pub fn describe(&self) -> String {
        match self {
            Self::Filter {
                column,
                comparator,
                value,
            } => format!("Filter rows where {column} {comparator} {value}"),
            Self::GroupBy { keys, aggregations } => {
                let aggs: Vec<String> = aggregations
                    .iter()
                    .map(|(out, agg)| format!("{out} = {}({})", agg.function, agg.column))
                    .collect();
                format!("Group by {} computing {}", keys.join(", "), aggs.join(", "))
            }
            Self::Join {
                right,
                left_key,
                right_key,
                kind,
            } => format!(
                "{} join with {right} on {left_key} = {right_key}",
                capitalize(kind.as_str())
            ),
            Self::Select { columns } => format!("Select columns {}", columns.join(", ")),
            Self::Sort { column, direction } => match direction {
                SortDirection::Asc => format!("Sort by {column} ascending"),
                SortDirection::Desc => format!("Sort by {column} descending"),
            },
            Self::Limit { count } => format!("Keep the first {count} rows"),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Parse failure reported back to the text generator as corrective feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanParseError(pub String);

impl fmt::Display for PlanParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for PlanParseError {}

/// Ordered sequence of operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    operations: Vec<Operation>,
}

impl Plan {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<Operation> {
        self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Content hash of the serialized operation list.
    pub fn hash(&self) -> String {
        hash_json(&self.operations)
    }

    /// Parse a plan from JSON.
    ///
    /// Accepts `{"operations": [...]}` or a bare array. Errors name the
    /// offending operation so they can be fed back to the generator.
    ///
    /// # Errors
    ///
    /// Returns [`PlanParseError`] for malformed JSON, an unexpected shape, an
    /// empty operation list or any operation that does not match the grammar.
    pub fn from_json(text: &str) -> Result<Self, PlanParseError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| PlanParseError(format!("response is not valid JSON: {e}")))?;

        let items = match value {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(mut map) => match map.remove("operations") {
                Some(serde_json::Value::Array(items)) => items,
                Some(_) => {
                    return Err(PlanParseError(
                        "\"operations\" must be an array".to_owned(),
                    ));
                }
                None => {
                    return Err(PlanParseError(
                        "expected an object with an \"operations\" array".to_owned(),
                    ));
                }
            },
            _ => {
                return Err(PlanParseError(
                    "expected an object with an \"operations\" array".to_owned(),
                ));
            }
        };

        if items.is_empty() {
            return Err(PlanParseError("plan has no operations".to_owned()));
        }

        let operations = items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| {
                serde_json::from_value::<Operation>(item)
                    .map_err(|e| PlanParseError(format!("operation {}: {e}", idx + 1)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { operations })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
