//! SQL rendering as a chain of common table expressions.
//!
//! `step_0` reads the primary source and each operation that reshapes rows
//! adds one CTE on top of the previous one. A CTE does not carry order, so
//! sorts are tracked as a list of keys (newest first) and re-applied
//! wherever order matters: in `LIMIT` steps and in the final statement.
//! When a `SELECT` drops a column the order still depends on, the column is
//! carried along under a hidden `__order_<n>` alias and left out of the
//! final projection.
//!
//! Row order follows the same rules as the dataframe target. A `GROUP BY`
//! over ordered rows emits groups in first-seen order, numbered with
//! `ROW_NUMBER()` before grouping. Inner and left joins keep the left order;
//! right and full joins drop it. A `LIMIT` with no order in effect sorts by
//! every visible column first so both targets keep the same rows.
//!
//! The output runs on PostgreSQL and on SQLite 3.39 or newer.

use super::artifact::{OutputSink, PipelineArtifact, Target};
use super::{comment_text, schema_at, step_descriptions};
use crate::error::{PipelineError, Result};
use crate::pipeline::transform::{JoinSide, join_layout};
use crate::pipeline::{
    AggregateFunction, Aggregation, Comparator, JoinKind, Literal, Operation, ValidatedPlan,
};
use crate::schema::Schema;
use crate::sources::{GenerationContext, SourceBinding, SourceLocation};
use crate::utils::{quote_ident, quote_sql_str};
use indexmap::IndexMap;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
struct OrderKey {
    /// Column name in the current step, possibly a hidden alias.
    column: String,
    ascending: bool,
}

#[derive(Debug, Default)]
struct Chain {
    ctes: Vec<String>,
    order: Vec<OrderKey>,
    hidden: Vec<String>,
    next_hidden: usize,
}

impl Chain {
    fn previous(&self) -> String {
        format!("step_{}", self.ctes.len().saturating_sub(1))
    }

    fn push(&mut self, comment: Option<String>, body: String) {
        let name = format!("step_{}", self.ctes.len());
        let mut cte = String::new();
        if let Some(comment) = comment {
            cte.push_str(&format!("-- {comment}\n"));
        }
        cte.push_str(&format!("{name} AS (\n    {body}\n)"));
        self.ctes.push(cte);
    }

    fn reset_order(&mut self) {
        self.order.clear();
        self.hidden.clear();
    }

    fn order_clause(&self) -> Option<String> {
        if self.order.is_empty() {
            return None;
        }
        let keys: Vec<String> = self
            .order
            .iter()
            .map(|k| {
                let dir = if k.ascending { "ASC" } else { "DESC" };
                format!("{} {dir} NULLS LAST", quote_ident(&k.column))
            })
            .collect();
        Some(format!("ORDER BY {}", keys.join(", ")))
    }

    fn fresh_hidden(&mut self, taken: &HashSet<&str>) -> String {
        loop {
            let name = format!("__order_{}", self.next_hidden);
            self.next_hidden += 1;
            if !taken.contains(name.as_str()) && !self.hidden.contains(&name) {
                return name;
            }
        }
    }
}

pub fn render(plan: &ValidatedPlan, ctx: &GenerationContext) -> Result<PipelineArtifact> {
    let mut chain = Chain::default();
    chain.push(None, format!("SELECT * FROM {}", table_ref(&ctx.primary)));

    for (idx, op) in plan.plan().operations().iter().enumerate() {
        let before = schema_at(plan, idx)?;
        let comment = Some(format!("Step {}: {}", idx + 1, comment_text(&op.describe())));
        render_operation(&mut chain, comment, op, before, ctx)?;
    }

    let visible: Vec<String> = plan.output_schema().column_names().map(quote_ident).collect();

    let mut query = String::from("WITH\n");
    query.push_str(&chain.ctes.join(",\n"));
    query.push_str(&format!(
        "\nSELECT {} FROM {}",
        visible.join(", "),
        chain.previous()
    ));
    if let Some(order) = chain.order_clause() {
        query.push_str(&format!(" {order}"));
    }

    let statement = match &ctx.sink {
        OutputSink::Stdout => query,
        OutputSink::Table(name) => format!("CREATE TABLE {} AS\n{query}", quote_ident(name)),
        OutputSink::View(name) => format!("CREATE VIEW {} AS\n{query}", quote_ident(name)),
        OutputSink::CsvFile(_) => {
            return Err(PipelineError::CodeGeneration(
                "the SQL target cannot write CSV files; use stdout, a table or a view".to_owned(),
            ));
        }
    };

    let mut source = format!("-- Generated by plansmith from plan {}\n", plan.plan_hash());
    source.push_str(&statement);
    source.push_str(";\n");

    let read = match &ctx.primary.location {
        SourceLocation::Table { table } => format!("Read table {table}"),
        SourceLocation::CsvFile(_) => format!("Read table {}", ctx.primary.name),
    };

    Ok(PipelineArtifact {
        target: Target::Sql,
        source,
        dependencies: Vec::new(),
        steps: step_descriptions(plan, read, ctx),
        plan_hash: plan.plan_hash().to_owned(),
    })
}

/// CSV-backed sources are expected to be loaded under their source name.
fn table_ref(binding: &SourceBinding) -> String {
    match &binding.location {
        SourceLocation::Table { table } => quote_ident(table),
        SourceLocation::CsvFile(_) => quote_ident(&binding.name),
    }
}

fn sql_literal(value: &Literal) -> String {
    match value {
        Literal::Boolean(true) => "TRUE".to_owned(),
        Literal::Boolean(false) => "FALSE".to_owned(),
        Literal::Integer(i) => i.to_string(),
        Literal::Float(x) => x.to_string(),
        Literal::String(s) => quote_sql_str(s),
    }
}

fn sql_comparator(comparator: Comparator) -> &'static str {
    match comparator {
        Comparator::Eq => "=",
        Comparator::Ne => "<>",
        other => other.symbol(),
    }
}

fn aggregate_expr(agg: &Aggregation) -> String {
    let column = quote_ident(&agg.column);
    match agg.function {
        AggregateFunction::Count => format!("COUNT({column})"),
        AggregateFunction::CountDistinct => format!("COUNT(DISTINCT {column})"),
        AggregateFunction::Sum => format!("SUM({column})"),
        AggregateFunction::Avg => format!("AVG({column})"),
        AggregateFunction::Min => format!("MIN({column})"),
        AggregateFunction::Max => format!("MAX({column})"),
    }
}

fn join_keyword(kind: JoinKind) -> &'static str {
    match kind {
        JoinKind::Inner => "INNER JOIN",
        JoinKind::Left => "LEFT JOIN",
        JoinKind::Right => "RIGHT JOIN",
        JoinKind::Full => "FULL JOIN",
    }
}

fn render_operation(
    chain: &mut Chain,
    comment: Option<String>,
    op: &Operation,
    before: &Schema,
    ctx: &GenerationContext,
) -> Result<()> {
    let prev = chain.previous();
    match op {
        Operation::Filter {
            column,
            comparator,
            value,
        } => {
            chain.push(
                comment,
                format!(
                    "SELECT * FROM {prev} WHERE {} {} {}",
                    quote_ident(column),
                    sql_comparator(*comparator),
                    sql_literal(value)
                ),
            );
        }
        Operation::GroupBy { keys, aggregations } => {
            let Some(order) = chain.order_clause() else {
                chain.push(comment, group_by(&prev, keys, aggregations, None));
                return Ok(());
            };
            let taken: HashSet<&str> = before
                .column_names()
                .chain(aggregations.keys().map(String::as_str))
                .collect();
            let row = chain.fresh_hidden(&taken);
            let first_seen = chain.fresh_hidden(&taken);
            chain.push(
                comment,
                format!(
                    "SELECT *, ROW_NUMBER() OVER ({order}) AS {} FROM {prev}",
                    quote_ident(&row)
                ),
            );
            let numbered = chain.previous();
            chain.push(
                None,
                group_by(&numbered, keys, aggregations, Some((&row, &first_seen))),
            );
            chain.order = vec![OrderKey {
                column: first_seen.clone(),
                ascending: true,
            }];
            chain.hidden = vec![first_seen];
        }
        Operation::Join {
            right,
            left_key,
            right_key,
            kind,
        } => {
            let binding = ctx.binding(right).ok_or_else(|| {
                PipelineError::CodeGeneration(format!("join source '{right}' is not in context"))
            })?;
            let keeps_order = matches!(kind, JoinKind::Inner | JoinKind::Left);
            if !keeps_order {
                chain.reset_order();
            }
            let body = join(&prev, before, binding, left_key, right_key, *kind, &chain.hidden);
            chain.push(comment, body);
        }
        Operation::Select { columns } => {
            let body = select(chain, &prev, before, columns);
            chain.push(comment, body);
        }
        Operation::Sort { column, direction } => {
            chain.order.retain(|k| k.column != *column);
            chain.order.insert(
                0,
                OrderKey {
                    column: column.clone(),
                    ascending: direction.is_ascending(),
                },
            );
        }
        Operation::Limit { count } => {
            if chain.order.is_empty() {
                chain.order = before
                    .column_names()
                    .map(|column| OrderKey {
                        column: column.to_owned(),
                        ascending: true,
                    })
                    .collect();
            }
            let body = match chain.order_clause() {
                Some(order) => format!("SELECT * FROM {prev} {order} LIMIT {count}"),
                None => format!("SELECT * FROM {prev} LIMIT {count}"),
            };
            chain.push(comment, body);
        }
    }
    Ok(())
}

/// `first_seen` names a row-number column and the hidden alias that keeps
/// its minimum per group.
fn group_by(
    prev: &str,
    keys: &[String],
    aggregations: &IndexMap<String, Aggregation>,
    first_seen: Option<(&str, &str)>,
) -> String {
    let key_list: Vec<String> = keys.iter().map(|k| quote_ident(k)).collect();
    let mut projection = key_list.clone();
    projection.extend(
        aggregations
            .iter()
            .map(|(out, agg)| format!("{} AS {}", aggregate_expr(agg), quote_ident(out))),
    );
    if let Some((row, alias)) = first_seen {
        projection.push(format!("MIN({}) AS {}", quote_ident(row), quote_ident(alias)));
    }
    format!(
        "SELECT {} FROM {prev} GROUP BY {}",
        projection.join(", "),
        key_list.join(", ")
    )
}

fn join(
    prev: &str,
    left: &Schema,
    right: &SourceBinding,
    left_key: &str,
    right_key: &str,
    kind: JoinKind,
    hidden: &[String],
) -> String {
    let mut projection: Vec<String> = join_layout(left, &right.schema)
        .iter()
        .map(|jc| {
            let alias = match jc.side {
                JoinSide::Left => "l",
                JoinSide::Right => "r",
            };
            if jc.source == jc.output {
                format!("{alias}.{}", quote_ident(&jc.source))
            } else {
                format!(
                    "{alias}.{} AS {}",
                    quote_ident(&jc.source),
                    quote_ident(&jc.output)
                )
            }
        })
        .collect();
    projection.extend(hidden.iter().map(|h| format!("l.{}", quote_ident(h))));
    format!(
        "SELECT {} FROM {prev} AS l {} {} AS r ON l.{} = r.{}",
        projection.join(", "),
        join_keyword(kind),
        table_ref(right),
        quote_ident(left_key),
        quote_ident(right_key)
    )
}

/// Projection that keeps every column the current order depends on.
fn select(chain: &mut Chain, prev: &str, before: &Schema, columns: &[String]) -> String {
    let mut projection: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let taken: HashSet<&str> = before.column_names().collect();

    let mut hidden = Vec::new();
    let mut order = std::mem::take(&mut chain.order);
    for key in &mut order {
        if columns.contains(&key.column) {
            continue;
        }
        if chain.hidden.contains(&key.column) {
            projection.push(quote_ident(&key.column));
            hidden.push(key.column.clone());
            continue;
        }
        let alias = chain.fresh_hidden(&taken);
        projection.push(format!(
            "{} AS {}",
            quote_ident(&key.column),
            quote_ident(&alias)
        ));
        key.column.clone_from(&alias);
        hidden.push(alias);
    }
    chain.order = order;
    chain.hidden = hidden;

    format!("SELECT {} FROM {prev}", projection.join(", "))
}
