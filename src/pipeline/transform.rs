//! Pure schema transforms, one per operation kind.
//!
//! These functions are the single source of truth for what each operation
//! requires and produces. The resolver, the validator and the renderers all
//! go through them, so a plan the validator accepts is one the renderers can
//! lay out column by column.

use super::grammar::{AggregateFunction, Aggregation, Comparator, JoinKind, Literal, Operation};
use crate::schema::inference::is_datetime;
use crate::schema::{Column, ColumnType, Schema};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Schemas of the sources a join may reference, by source name.
pub trait SchemaLookup {
    fn lookup(&self, source: &str) -> Option<&Schema>;

    fn source_names(&self) -> Vec<&str>;
}

impl SchemaLookup for IndexMap<String, Schema> {
    fn lookup(&self, source: &str) -> Option<&Schema> {
        self.get(source)
    }

    fn source_names(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect()
    }
}

/// Lookup for single-source requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSources;

impl SchemaLookup for NoSources {
    fn lookup(&self, _source: &str) -> Option<&Schema> {
        None
    }

    fn source_names(&self) -> Vec<&str> {
        Vec::new()
    }
}

/// Where a joined output column comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinColumn {
    pub side: JoinSide,
    /// Column name on its own side.
    pub source: String,
    /// Column name in the joined output.
    pub output: String,
}

/// Output layout of a join: left columns as-is, then right columns with
/// `_right`, `_right_2`, ... appended on collision.
pub fn join_layout(left: &Schema, right: &Schema) -> Vec<JoinColumn> {
    let mut taken: HashSet<String> = left.column_names().map(ToOwned::to_owned).collect();
    let mut layout: Vec<JoinColumn> = left
        .column_names()
        .map(|name| JoinColumn {
            side: JoinSide::Left,
            source: name.to_owned(),
            output: name.to_owned(),
        })
        .collect();

    for name in right.column_names() {
        let mut output = name.to_owned();
        if taken.contains(&output) {
            output = format!("{name}_right");
            let mut n = 2;
            while taken.contains(&output) {
                output = format!("{name}_right_{n}");
                n += 1;
            }
        }
        taken.insert(output.clone());
        layout.push(JoinColumn {
            side: JoinSide::Right,
            source: name.to_owned(),
            output,
        });
    }

    layout
}

/// Apply one operation to the current schema.
///
/// # Errors
///
/// Returns a human-readable reason when the operation does not fit the
/// schema; the caller attaches the step index.
pub fn apply_operation(
    op: &Operation,
    current: &Schema,
    sources: &dyn SchemaLookup,
) -> Result<Schema, String> {
    match op {
        Operation::Filter {
            column,
            comparator,
            value,
        } => {
            let col = require(current, column)?;
            check_filter(col, *comparator, value)?;
            Ok(current.clone())
        }
        Operation::GroupBy { keys, aggregations } => group_by(current, keys, aggregations),
        Operation::Join {
            right,
            left_key,
            right_key,
            kind,
        } => {
            let right_schema = sources.lookup(right).ok_or_else(|| {
                let known = sources.source_names();
                if known.is_empty() {
                    format!("join references unknown source '{right}' (no other sources are available)")
                } else {
                    format!(
                        "join references unknown source '{right}' (available: {})",
                        known.join(", ")
                    )
                }
            })?;
            join(current, right_schema, right, left_key, right_key, *kind)
        }
        Operation::Select { columns } => select(current, columns),
        Operation::Sort { column, .. } => {
            require(current, column)?;
            Ok(current.clone())
        }
        Operation::Limit { .. } => Ok(current.clone()),
    }
}

fn require<'a>(schema: &'a Schema, name: &str) -> Result<&'a Column, String> {
    schema.column(name).ok_or_else(|| {
        format!(
            "unknown column '{name}' (available: {})",
            schema.column_names().collect::<Vec<_>>().join(", ")
        )
    })
}

fn check_filter(col: &Column, comparator: Comparator, value: &Literal) -> Result<(), String> {
    let ok = match (col.column_type, value) {
        (ColumnType::Integer | ColumnType::Float, Literal::Integer(_)) => true,
        (ColumnType::Integer | ColumnType::Float, Literal::Float(x)) => {
            if !x.is_finite() {
                return Err("filter literal must be a finite number".to_owned());
            }
            true
        }
        (ColumnType::String, Literal::String(_)) => true,
        (ColumnType::Datetime, Literal::String(s)) => {
            if !is_datetime(s) {
                return Err(format!(
                    "column '{}' is datetime but '{s}' is not an ISO-8601 date or date-time",
                    col.name
                ));
            }
            true
        }
        (ColumnType::Boolean, Literal::Boolean(_)) => {
            if !comparator.is_equality() {
                return Err(format!(
                    "boolean column '{}' only supports == and !=",
                    col.name
                ));
            }
            true
        }
        _ => false,
    };

    if ok {
        Ok(())
    } else {
        Err(format!(
            "cannot compare {} column '{}' with {}",
            col.column_type,
            col.name,
            literal_kind(value)
        ))
    }
}

fn literal_kind(value: &Literal) -> String {
    match value {
        Literal::Boolean(b) => format!("boolean literal {b}"),
        Literal::Integer(i) => format!("integer literal {i}"),
        Literal::Float(x) => format!("float literal {x}"),
        Literal::String(s) => format!("string literal '{s}'"),
    }
}

/// Output type of an aggregate, or why the column cannot feed it.
pub fn aggregate_output(function: AggregateFunction, source: &Column) -> Result<Column, String> {
    let t = source.column_type;
    let (column_type, nullable) = match function {
        AggregateFunction::Count | AggregateFunction::CountDistinct => (ColumnType::Integer, false),
        AggregateFunction::Sum if t.is_numeric() => (t, source.nullable),
        AggregateFunction::Avg if t.is_numeric() => (ColumnType::Float, source.nullable),
        AggregateFunction::Min | AggregateFunction::Max if t != ColumnType::Boolean => {
            (t, source.nullable)
        }
        _ => {
            return Err(format!(
                "{function} cannot be applied to {t} column '{}'",
                source.name
            ));
        }
    };
    Ok(Column::new(String::new(), column_type, nullable))
}

fn group_by(
    current: &Schema,
    keys: &[String],
    aggregations: &IndexMap<String, Aggregation>,
) -> Result<Schema, String> {
    if keys.is_empty() {
        return Err("group_by needs at least one key".to_owned());
    }
    if aggregations.is_empty() {
        return Err("group_by needs at least one aggregation".to_owned());
    }

    let mut names = HashSet::new();
    let mut columns = Vec::with_capacity(keys.len() + aggregations.len());

    for key in keys {
        let col = require(current, key)?;
        if !names.insert(key.as_str()) {
            return Err(format!("group key '{key}' is listed twice"));
        }
        columns.push(col.clone());
    }

    for (out, agg) in aggregations {
        if out.is_empty() {
            return Err("aggregation output names must not be empty".to_owned());
        }
        if !names.insert(out.as_str()) {
            return Err(format!(
                "aggregation output '{out}' collides with another output column"
            ));
        }
        let source = require(current, &agg.column)?;
        let mut produced = aggregate_output(agg.function, source)?;
        produced.name.clone_from(out);
        columns.push(produced);
    }

    Ok(Schema::derived(columns))
}

fn join(
    left: &Schema,
    right: &Schema,
    right_name: &str,
    left_key: &str,
    right_key: &str,
    kind: JoinKind,
) -> Result<Schema, String> {
    let lk = require(left, left_key)?;
    let rk = right.column(right_key).ok_or_else(|| {
        format!(
            "unknown column '{right_key}' in source '{right_name}' (available: {})",
            right.column_names().collect::<Vec<_>>().join(", ")
        )
    })?;

    if !lk.column_type.is_comparable_with(rk.column_type) {
        return Err(format!(
            "join keys have incompatible types: '{left_key}' is {} but '{right_key}' is {}",
            lk.column_type, rk.column_type
        ));
    }

    let columns = join_layout(left, right)
        .into_iter()
        .map(|jc| {
            let (schema, widened) = match jc.side {
                JoinSide::Left => (left, kind.keeps_right()),
                JoinSide::Right => (right, kind.keeps_left()),
            };
            // Layout names come from the schemas themselves.
            let col = schema
                .column(&jc.source)
                .ok_or_else(|| format!("unknown column '{}'", jc.source))?;
            Ok(Column::new(
                jc.output,
                col.column_type,
                col.nullable || widened,
            ))
        })
        .collect::<Result<Vec<_>, String>>()?;

    Ok(Schema::derived(columns))
}

fn select(current: &Schema, names: &[String]) -> Result<Schema, String> {
    if names.is_empty() {
        return Err("select needs at least one column".to_owned());
    }

    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(names.len());
    for name in names {
        let col = require(current, name)?;
        if !seen.insert(name.as_str()) {
            return Err(format!("column '{name}' is selected twice"));
        }
        columns.push(col.clone());
    }

    Ok(Schema::derived(columns))
}
