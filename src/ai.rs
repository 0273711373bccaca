//! Text-generation capability used by the plan builder.
//!
//! The generator is treated as an untrusted proposer: it returns raw text and
//! nothing it says is acted on until the plan has been parsed and validated.

pub mod client;
pub mod retry;

pub use client::OpenAiGenerator;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A complete conversation handed to the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub system: String,
    pub messages: Vec<PromptMessage>,
}

/// Failure reported by a generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorError {
    /// The call did not finish in time.
    Timeout,
    /// Network failure, rate limit or server error worth retrying.
    Transient(String),
    /// Authentication, bad request or anything else a retry will not fix.
    Fatal(String),
}

impl GeneratorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transient(_))
    }
}

impl fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::Transient(msg) => write!(f, "transient failure: {msg}"),
            Self::Fatal(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for GeneratorError {}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &PromptRequest) -> Result<String, GeneratorError>;
}
