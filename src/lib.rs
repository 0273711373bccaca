//! # Plansmith - Schema-Aware Pipeline Planning and Code Generation
//!
//! Plansmith turns a tabular sample and a natural-language request into a
//! validated transformation plan, then renders that plan as a pandas script
//! or a SQL query. The language model only ever proposes: every plan is
//! parsed against a fixed grammar and type-checked against the schema before
//! any code is generated.
//!
//! ## Quick Start
//!
//! ```no_run
//! use plansmith::ai::OpenAiGenerator;
//! use plansmith::codegen::Target;
//! use plansmith::config::EngineConfig;
//! use plansmith::engine::PipelineEngine;
//! use plansmith::lineage::JsonlLineageStore;
//! use plansmith::schema::{SampleInput, infer_schema};
//! use plansmith::sources::{GenerationContext, SourceBinding, SourceLocation};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> plansmith::error::Result<()> {
//! let config = EngineConfig::default();
//! let path = std::path::PathBuf::from("employees.csv");
//! let schema = infer_schema(&SampleInput::CsvFile(path.clone()), config.inference_options()).await?;
//!
//! let ctx = GenerationContext::new(SourceBinding::new(
//!     "employees",
//!     SourceLocation::CsvFile(path),
//!     schema,
//! ));
//! let engine = PipelineEngine::from_config(
//!     &config,
//!     Arc::new(OpenAiGenerator::from_env(config.ai.clone())?),
//!     Arc::new(JsonlLineageStore::new(config.resolved_lineage_path()?)),
//! );
//!
//! let generated = engine
//!     .generate_pipeline(
//!         "average salary per department for salaries above 50000",
//!         &ctx,
//!         Target::Sql,
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! println!("{}", generated.artifact.source);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`schema`]: schema model, type inference, CSV and table sampling
//! - [`sources`]: multi-source configuration and the per-request context
//! - [`pipeline`]: operation grammar, plan builder, resolver and validator
//! - [`ai`]: text-generator capability and retry policy
//! - [`codegen`]: pandas and SQL renderers
//! - [`lineage`]: fingerprints and the append-only lineage store
//! - [`engine`]: the end-to-end `generate_pipeline` flow
//! - [`config`], [`logging`], [`error`], [`utils`]: supporting pieces

#![warn(clippy::all, rust_2018_idioms)]

pub mod ai;
pub mod codegen;
pub mod config;
pub mod engine;
pub mod error;
pub mod lineage;
pub mod logging;
pub mod pipeline;
pub mod schema;
pub mod sources;
pub mod utils;
