//! The two external operations: schema inference and pipeline generation.
//!
//! ```text
//! sample ──infer_schema──> Schema ──┐
//!                                   ├─> PlanBuilder ─> validate_plan ─> render ─> lineage
//! request ──────────────────────────┘
//! ```
//!
//! Each call works only on its arguments. The lineage store is the one piece
//! of shared state, and it is append-only.

use crate::ai::TextGenerator;
use crate::codegen::{self, PipelineArtifact, Target};
use crate::config::EngineConfig;
use crate::error::{PipelineError, Result};
use crate::lineage::{LineageRecord, LineageStore};
use crate::pipeline::{PlanBuilder, ValidatedPlan, validate_plan};
use crate::schema::{InferenceOptions, SampleInput, Schema};
use crate::sources::GenerationContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Derive a schema from a sample or a table.
///
/// # Errors
///
/// Returns [`PipelineError::SchemaInference`] for empty or malformed samples
/// and unreachable tables.
pub async fn infer_schema(input: &SampleInput, options: InferenceOptions) -> Result<Schema> {
    crate::schema::infer_schema(input, options).await
}

/// A rendered artifact plus the lineage entry written for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedPipeline {
    #[serde(flatten)]
    pub artifact: PipelineArtifact,
    pub lineage_id: Uuid,
}

pub struct PipelineEngine {
    builder: PlanBuilder,
    store: Arc<dyn LineageStore>,
}

impl PipelineEngine {
    pub fn new(builder: PlanBuilder, store: Arc<dyn LineageStore>) -> Self {
        Self { builder, store }
    }

    /// Engine configured from `config` around an existing generator.
    pub fn from_config(
        config: &EngineConfig,
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn LineageStore>,
    ) -> Self {
        let builder = PlanBuilder::new(generator)
            .with_policy(config.retry)
            .with_planning(&config.planning);
        Self::new(builder, store)
    }

    pub fn store(&self) -> &Arc<dyn LineageStore> {
        &self.store
    }

    /// Turn `request` into an artifact for `target` over the sources in
    /// `ctx`, then record its lineage.
    ///
    /// Cancellation is honoured up to the lineage write; once the write
    /// starts it completes.
    ///
    /// # Errors
    ///
    /// [`PipelineError::PlanGeneration`], [`PipelineError::Validation`],
    /// [`PipelineError::CodeGeneration`], [`PipelineError::ExternalDependency`]
    /// or [`PipelineError::Cancelled`], plus [`PipelineError::Lineage`] if the
    /// record cannot be written.
    pub async fn generate_pipeline(
        &self,
        request: &str,
        ctx: &GenerationContext,
        target: Target,
        cancel: &CancellationToken,
    ) -> Result<GeneratedPipeline> {
        tracing::info!(source = %ctx.primary.name, target = %target, "Generating pipeline");

        let candidate = self.builder.build(request, ctx, cancel).await?;
        let validated = validate_plan(candidate, ctx.schema(), ctx).map_err(|e| {
            tracing::warn!(step = e.step_index + 1, reason = %e.reason, "Plan rejected");
            PipelineError::Validation(e)
        })?;
        let artifact = codegen::render(&validated, ctx, target)?;

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let record = LineageRecord::new(&validated, &artifact);
        self.store.append(&record).await?;

        tracing::info!(
            plan_hash = %artifact.plan_hash,
            target = %target,
            lineage_id = %record.id,
            "Pipeline generated"
        );

        Ok(GeneratedPipeline {
            artifact,
            lineage_id: record.id,
        })
    }

    /// Lineage entry for an already-rendered schema, plan and target.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Lineage`] if the store cannot be read.
    pub async fn find_existing(
        &self,
        plan: &ValidatedPlan,
        target: Target,
    ) -> Result<Option<LineageRecord>> {
        self.store
            .find(plan.schema_fingerprint(), plan.plan_hash(), target)
            .await
    }
}
