//! Deterministic rendering of validated plans.
//!
//! A renderer reads the primary source once, applies the operations in plan
//! order and writes the result once. It sees only [`ValidatedPlan`], so a
//! plan that has not passed the validator cannot reach it.
//!
//! Both targets are written to produce the same rows for the same input:
//! null handling, grouping of null keys, join matching and sort stability
//! are spelled out explicitly in each rendering rather than left to
//! runtime defaults.

pub mod artifact;
pub mod pandas;
pub mod sql;

pub use artifact::{OutputSink, PipelineArtifact, Target};

use crate::error::{PipelineError, Result};
use crate::pipeline::ValidatedPlan;
use crate::schema::Schema;
use crate::sources::GenerationContext;

/// Render `plan` for `target`.
///
/// # Errors
///
/// Returns [`PipelineError::CodeGeneration`] when the plan was validated
/// against a different schema than the context's primary source, or when
/// the target cannot read one of the sources or write the requested sink.
pub fn render(
    plan: &ValidatedPlan,
    ctx: &GenerationContext,
    target: Target,
) -> Result<PipelineArtifact> {
    if plan.schema_fingerprint() != ctx.schema().fingerprint() {
        return Err(PipelineError::CodeGeneration(format!(
            "plan was validated against a different schema than source '{}'",
            ctx.primary.name
        )));
    }

    let artifact = match target {
        Target::DataframeScript => pandas::render(plan, ctx)?,
        Target::Sql => sql::render(plan, ctx)?,
    };

    tracing::debug!(
        target = %target,
        plan_hash = %plan.plan_hash(),
        steps = artifact.steps.len(),
        "Rendered pipeline"
    );
    Ok(artifact)
}

/// Ordered human-readable steps: the read, each operation, the write.
fn step_descriptions(plan: &ValidatedPlan, read: String, ctx: &GenerationContext) -> Vec<String> {
    let mut steps = Vec::with_capacity(plan.plan().len() + 2);
    steps.push(read);
    steps.extend(plan.plan().operations().iter().map(|op| op.describe()));
    steps.push(ctx.sink.describe());
    steps
}

/// Schema in effect before operation `index`.
fn schema_at(plan: &ValidatedPlan, index: usize) -> Result<&Schema> {
    plan.schema_before(index).ok_or_else(|| {
        PipelineError::CodeGeneration(format!("no schema recorded for step {}", index + 1))
    })
}

/// Flatten text for use in a single-line comment.
fn comment_text(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
