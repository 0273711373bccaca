//! Lineage record data structure.

use crate::codegen::{PipelineArtifact, Target};
use crate::pipeline::ValidatedPlan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current record format version.
pub const RECORD_VERSION: u32 = 1;

/// Immutable audit entry linking a schema, a plan and the artifact rendered
/// from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageRecord {
    pub record_version: u32,

    pub id: Uuid,

    /// Fingerprint of the input schema
    pub schema_fingerprint: String,

    /// Content hash of the validated plan
    pub plan_hash: String,

    /// Fingerprint of the rendered artifact
    pub artifact_ref: String,

    pub target: Target,

    pub created_utc: DateTime<Utc>,
}

impl LineageRecord {
    pub fn new(plan: &ValidatedPlan, artifact: &PipelineArtifact) -> Self {
        Self {
            record_version: RECORD_VERSION,
            id: Uuid::new_v4(),
            schema_fingerprint: plan.schema_fingerprint().to_owned(),
            plan_hash: plan.plan_hash().to_owned(),
            artifact_ref: artifact.fingerprint(),
            target: artifact.target,
            created_utc: Utc::now(),
        }
    }

    /// Whether this record answers the same schema, plan and target.
    pub fn matches(&self, schema_fingerprint: &str, plan_hash: &str, target: Target) -> bool {
        self.schema_fingerprint == schema_fingerprint
            && self.plan_hash == plan_hash
            && self.target == target
    }
}
