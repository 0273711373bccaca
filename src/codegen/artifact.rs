//! Rendered pipeline artifacts.

use crate::lineage::hasher::hash_bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Runtime a plan is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Python script built on pandas.
    #[serde(alias = "pandas", alias = "python")]
    DataframeScript,
    Sql,
}

impl Target {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DataframeScript => "dataframe_script",
            Self::Sql => "sql",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the pipeline's result goes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSink {
    /// JSON records for the dataframe target, a plain query for SQL.
    #[default]
    Stdout,
    CsvFile(PathBuf),
    Table(String),
    View(String),
}

impl OutputSink {
    pub fn describe(&self) -> String {
        match self {
            Self::Stdout => "Write the result to standard output".to_owned(),
            Self::CsvFile(path) => format!("Write the result to {}", path.display()),
            Self::Table(name) => format!("Write the result to table {name}"),
            Self::View(name) => format!("Expose the result as view {name}"),
        }
    }
}

/// Executable output of a validated plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineArtifact {
    pub target: Target,
    /// Rendered source text.
    pub source: String,
    /// Packages needed to run `source`, sorted.
    pub dependencies: Vec<String>,
    /// One line per read, operation and write, in execution order.
    pub steps: Vec<String>,
    pub plan_hash: String,
}

impl PipelineArtifact {
    /// Content hash of the target tag and rendered source.
    pub fn fingerprint(&self) -> String {
        let mut bytes = Vec::with_capacity(self.source.len() + 20);
        bytes.extend_from_slice(self.target.as_str().as_bytes());
        bytes.push(b'\n');
        bytes.extend_from_slice(self.source.as_bytes());
        hash_bytes(&bytes)
    }
}
