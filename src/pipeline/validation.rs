//! Plan validation.
//!
//! Walks the operations in order, threading the schema through each step's
//! transform. The walk stops at the first operation that does not fit, so the
//! reported index is always the earliest failure.

use super::grammar::Plan;
use super::transform::{SchemaLookup, apply_operation};
use crate::error::ValidationError;
use crate::schema::Schema;

/// A plan that passed validation against a specific schema.
///
/// Only [`validate_plan`] constructs this type, and code generation accepts
/// nothing else.
#[derive(Debug, Clone)]
pub struct ValidatedPlan {
    plan: Plan,
    plan_hash: String,
    schema_fingerprint: String,
    input: Schema,
    /// `after[i]` is the schema produced by operation `i`.
    after: Vec<Schema>,
}

impl ValidatedPlan {
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn plan_hash(&self) -> &str {
        &self.plan_hash
    }

    /// Fingerprint of the schema the plan was validated against.
    pub fn schema_fingerprint(&self) -> &str {
        &self.schema_fingerprint
    }

    pub fn input_schema(&self) -> &Schema {
        &self.input
    }

    /// Schema in effect before operation `index` runs.
    pub fn schema_before(&self, index: usize) -> Option<&Schema> {
        match index.checked_sub(1) {
            None => Some(&self.input),
            Some(prev) => self.after.get(prev),
        }
    }

    pub fn output_schema(&self) -> &Schema {
        self.after.last().unwrap_or(&self.input)
    }
}

/// Validate `plan` against `schema`.
///
/// `sources` supplies the schemas of other sources a join may name.
///
/// # Errors
///
/// Returns the zero-based index and reason of the first operation that does
/// not fit the schema in effect at that point.
pub fn validate_plan(
    plan: Plan,
    schema: &Schema,
    sources: &dyn SchemaLookup,
) -> Result<ValidatedPlan, ValidationError> {
    let mut after: Vec<Schema> = Vec::with_capacity(plan.len());

    for (idx, op) in plan.operations().iter().enumerate() {
        let current = after.last().unwrap_or(schema);
        let next = apply_operation(op, current, sources)
            .map_err(|reason| ValidationError::new(idx, format!("{}: {reason}", op.kind())))?;
        after.push(next);
    }

    let validated = ValidatedPlan {
        plan_hash: plan.hash(),
        schema_fingerprint: schema.fingerprint(),
        input: schema.clone(),
        plan,
        after,
    };
    tracing::debug!(
        plan_hash = %validated.plan_hash,
        steps = validated.plan.len(),
        "Plan validated"
    );
    Ok(validated)
}
