//! Plan construction and checking.
//!
//! # Overview
//!
//! - [`grammar`]: the operation vocabulary and its JSON form
//! - [`transform`]: the schema each operation requires and produces
//! - [`resolve`]: repair of misspelled or mis-cased column references
//! - [`validation`]: the fail-fast walk that yields a [`ValidatedPlan`]
//! - [`prompt`]: prompt construction and response parsing
//! - [`builder`]: the generate, parse and retry loop around a [`crate::ai::TextGenerator`]
//!
//! # Example
//!
//! ```
//! use plansmith::pipeline::{Plan, validate_plan, NoSources};
//! use plansmith::schema::{Column, ColumnType, Schema};
//!
//! let schema = Schema::new(
//!     vec![
//!         Column::new("dept", ColumnType::String, false),
//!         Column::new("salary", ColumnType::Float, true),
//!     ],
//!     vec![],
//!     0,
//! )?;
//! let plan = Plan::from_json(r#"[{"op":"sort","column":"salary","direction":"desc"}]"#)?;
//! let validated = validate_plan(plan, &schema, &NoSources)?;
//! assert_eq!(validated.output_schema().len(), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod builder;
pub mod grammar;
pub mod prompt;
pub mod resolve;
pub mod transform;
pub mod validation;

pub use builder::PlanBuilder;
pub use grammar::{
    AggregateFunction, Aggregation, Comparator, JoinKind, Literal, Operation, Plan,
    PlanParseError, SortDirection,
};
pub use resolve::{resolve_name, resolve_plan};
pub use transform::{NoSources, SchemaLookup, apply_operation};
pub use validation::{ValidatedPlan, validate_plan};
