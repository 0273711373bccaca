//! Plan builder: asks the text generator for a plan, feeds parse errors
//! back as corrections and repairs column references in the result.
//!
//! The builder keeps no state between calls. Each request starts from a
//! fresh conversation built from its own [`GenerationContext`].

use super::grammar::Plan;
use super::prompt;
use super::resolve::resolve_plan;
use crate::ai::{PromptMessage, RetryPolicy, TextGenerator};
use crate::config::PlanningConfig;
use crate::error::{PipelineError, Result};
use crate::sources::GenerationContext;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct PlanBuilder {
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
    max_parse_attempts: u32,
    max_edit_distance: usize,
}

impl PlanBuilder {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        let planning = PlanningConfig::default();
        Self {
            generator,
            policy: RetryPolicy::default(),
            max_parse_attempts: planning.max_parse_attempts,
            max_edit_distance: planning.max_edit_distance,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_planning(mut self, planning: &PlanningConfig) -> Self {
        self.max_parse_attempts = planning.max_parse_attempts;
        self.max_edit_distance = planning.max_edit_distance;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Produce a candidate plan for `request`.
    ///
    /// The returned plan has had its column references resolved but has not
    /// been validated.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::PlanGeneration`] when no response parses within the
    ///   parse budget
    /// - [`PipelineError::ExternalDependency`] when the generator keeps
    ///   failing or fails fatally
    /// - [`PipelineError::Cancelled`] when `cancel` fires
    pub async fn build(
        &self,
        request: &str,
        ctx: &GenerationContext,
        cancel: &CancellationToken,
    ) -> Result<Plan> {
        let max_attempts = self.max_parse_attempts.max(1);
        let mut conversation = prompt::initial_request(request, ctx);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let response = self
                .policy
                .run(cancel, || self.generator.generate(&conversation))
                .await?;

            match prompt::parse_response(&response) {
                Ok(plan) => {
                    tracing::info!(
                        attempt,
                        operations = plan.len(),
                        "Generator proposed a plan"
                    );
                    return Ok(resolve_plan(plan, ctx.schema(), ctx, self.max_edit_distance));
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max = max_attempts,
                        error = %e,
                        "Generator response did not parse"
                    );
                    conversation.messages.push(PromptMessage::assistant(response));
                    conversation
                        .messages
                        .push(PromptMessage::user(prompt::feedback_prompt(&e)));
                    last_error = e.0;
                }
            }
        }

        Err(PipelineError::PlanGeneration {
            attempts: max_attempts,
            last_error,
        })
    }
}
