//! Centralized error handling for plansmith.
//!
//! Every failure surfaces as a [`PipelineError`] variant naming the stage that
//! failed, so callers can branch on the category instead of parsing messages:
//!
//! ```
//! use plansmith::error::PipelineError;
//!
//! fn describe(err: &PipelineError) -> &'static str {
//!     match err {
//!         PipelineError::SchemaInference(_) => "bad sample",
//!         PipelineError::Validation(_) => "plan rejected",
//!         PipelineError::ExternalDependency { .. } => "try again later",
//!         _ => "other",
//!     }
//! }
//! ```
//!
//! ## Context Extension Trait
//!
//! [`ResultExt`] adds `.context()` to any result whose error converts into
//! [`PipelineError`]. Unlike a stringly `Other` wrapper, the context is
//! prefixed onto the message of the original variant, so the category
//! survives:
//!
//! ```no_run
//! use plansmith::error::ResultExt as _;
//!
//! fn load() -> plansmith::error::Result<String> {
//!     std::fs::read_to_string("sources.yaml").context("Failed to read source config")
//! }
//! ```

use std::fmt;

/// A plan rejected by the validator.
///
/// `step_index` is zero-based and always names the first failing operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub step_index: usize,
    pub reason: String,
}

impl ValidationError {
    pub fn new(step_index: usize, reason: impl Into<String>) -> Self {
        Self {
            step_index,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step {}: {}", self.step_index + 1, self.reason)
    }
}

impl std::error::Error for ValidationError {}

/// Main error type for plansmith operations.
#[derive(Debug)]
pub enum PipelineError {
    /// Sample or connection could not produce a schema (never retried)
    SchemaInference(String),

    /// The text generator never produced a grammar-conformant plan
    PlanGeneration { attempts: u32, last_error: String },

    /// Plan references invalid columns or types
    Validation(ValidationError),

    /// The chosen target cannot render the plan
    CodeGeneration(String),

    /// The text generator was unreachable or timed out after retries
    ExternalDependency { attempts: u32, message: String },

    /// The originating request was abandoned
    Cancelled,

    /// Configuration files or settings are invalid
    Config(String),

    /// The lineage store could not be read or appended
    Lineage(String),

    /// I/O errors
    Io(std::io::Error),
}

impl PipelineError {
    /// Whether the caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalDependency { .. })
    }

    /// Prefix `msg` onto the message while keeping the variant.
    #[must_use]
    pub fn with_prefix(self, msg: &str) -> Self {
        match self {
            Self::SchemaInference(m) => Self::SchemaInference(format!("{msg}: {m}")),
            Self::PlanGeneration {
                attempts,
                last_error,
            } => Self::PlanGeneration {
                attempts,
                last_error: format!("{msg}: {last_error}"),
            },
            Self::Validation(e) => Self::Validation(ValidationError {
                step_index: e.step_index,
                reason: format!("{msg}: {}", e.reason),
            }),
            Self::CodeGeneration(m) => Self::CodeGeneration(format!("{msg}: {m}")),
            Self::ExternalDependency { attempts, message } => Self::ExternalDependency {
                attempts,
                message: format!("{msg}: {message}"),
            },
            Self::Cancelled => Self::Cancelled,
            Self::Config(m) => Self::Config(format!("{msg}: {m}")),
            Self::Lineage(m) => Self::Lineage(format!("{msg}: {m}")),
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), format!("{msg}: {e}"))),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaInference(msg) => write!(f, "Schema inference error: {msg}"),
            Self::PlanGeneration {
                attempts,
                last_error,
            } => write!(
                f,
                "Plan generation failed after {attempts} attempt(s): {last_error}"
            ),
            Self::Validation(e) => write!(f, "Plan validation failed: {e}"),
            Self::CodeGeneration(msg) => write!(f, "Code generation error: {msg}"),
            Self::ExternalDependency { attempts, message } => write!(
                f,
                "Text generator unavailable after {attempts} attempt(s): {message}"
            ),
            Self::Cancelled => write!(f, "Request cancelled"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Lineage(msg) => write!(f, "Lineage store error: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ValidationError> for PipelineError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(format!("YAML error: {err}"))
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::SchemaInference(err.to_string())
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        Self::SchemaInference(err.to_string())
    }
}

/// Result type alias for plansmith operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<PipelineError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_prefix(&msg.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_prefix(&f()))
    }
}
