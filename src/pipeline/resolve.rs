//! Column-name repair for generated plans.
//!
//! References are matched against the schema in effect at each step: an
//! exact match wins, then a unique case-insensitive match, then the unique
//! nearest name within the edit-distance threshold. Anything else is left
//! untouched so the validator reports it at the right index.

use super::grammar::{Operation, Plan};
use super::transform::{SchemaLookup, apply_operation};
use crate::schema::Schema;
use crate::utils::edit_distance;

/// Pick the candidate a possibly misspelled name refers to.
pub fn resolve_name<'a>(
    name: &str,
    candidates: impl IntoIterator<Item = &'a str>,
    max_distance: usize,
) -> Option<&'a str> {
    let candidates: Vec<&str> = candidates.into_iter().collect();

    if let Some(exact) = candidates.iter().copied().find(|c| *c == name) {
        return Some(exact);
    }

    let lowered = name.to_lowercase();
    let folded: Vec<&str> = candidates
        .iter()
        .copied()
        .filter(|c| c.to_lowercase() == lowered)
        .collect();
    match folded.as_slice() {
        [only] => return Some(*only),
        [] => {}
        _ => return None,
    }

    let mut best: Option<(&str, usize)> = None;
    let mut tied = false;
    for candidate in candidates {
        let d = edit_distance(&lowered, &candidate.to_lowercase());
        if d > max_distance {
            continue;
        }
        match best {
            Some((_, bd)) if d > bd => {}
            Some((_, bd)) if d == bd => tied = true,
            _ => {
                best = Some((candidate, d));
                tied = false;
            }
        }
    }

    if tied { None } else { best.map(|(c, _)| c) }
}

/// Repair column and source references throughout a plan.
///
/// Operations after the first one that still does not fit its schema are
/// returned unchanged.
pub fn resolve_plan(
    plan: Plan,
    schema: &Schema,
    sources: &dyn SchemaLookup,
    max_distance: usize,
) -> Plan {
    let mut current = schema.clone();
    let mut resolved = Vec::with_capacity(plan.len());
    let mut ops = plan.into_operations().into_iter().enumerate();

    for (idx, op) in ops.by_ref() {
        let op = resolve_operation(op, &current, sources, max_distance, idx);
        let next = apply_operation(&op, &current, sources);
        resolved.push(op);
        match next {
            Ok(schema) => current = schema,
            Err(_) => break,
        }
    }
    resolved.extend(ops.map(|(_, op)| op));

    Plan::new(resolved)
}

fn resolve_operation(
    op: Operation,
    current: &Schema,
    sources: &dyn SchemaLookup,
    max_distance: usize,
    step: usize,
) -> Operation {
    let fix = |name: String| fix_name(name, current.column_names(), max_distance, step);

    match op {
        Operation::Filter {
            column,
            comparator,
            value,
        } => Operation::Filter {
            column: fix(column),
            comparator,
            value,
        },
        Operation::GroupBy {
            keys,
            aggregations,
        } => Operation::GroupBy {
            keys: keys.into_iter().map(fix).collect(),
            aggregations: aggregations
                .into_iter()
                .map(|(out, mut agg)| {
                    agg.column = fix(agg.column);
                    (out, agg)
                })
                .collect(),
        },
        Operation::Join {
            right,
            left_key,
            right_key,
            kind,
        } => {
            let right = fix_name(right, sources.source_names(), max_distance, step);
            let right_key = match sources.lookup(&right) {
                Some(rs) => fix_name(right_key, rs.column_names(), max_distance, step),
                None => right_key,
            };
            Operation::Join {
                right,
                left_key: fix(left_key),
                right_key,
                kind,
            }
        }
        Operation::Select { columns } => Operation::Select {
            columns: columns.into_iter().map(fix).collect(),
        },
        Operation::Sort { column, direction } => Operation::Sort {
            column: fix(column),
            direction,
        },
        Operation::Limit { count } => Operation::Limit { count },
    }
}

fn fix_name<'a>(
    name: String,
    candidates: impl IntoIterator<Item = &'a str>,
    max_distance: usize,
    step: usize,
) -> String {
    match resolve_name(&name, candidates, max_distance) {
        Some(found) if found != name => {
            tracing::debug!(step = step + 1, from = %name, to = found, "Resolved reference");
            found.to_owned()
        }
        _ => name,
    }
}
