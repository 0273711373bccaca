//! Multi-source pipeline configuration and the per-request generation
//! context.
//!
//! A config file names every source a request may touch and the
//! relationships between them:
//!
//! ```yaml
//! sources:
//!   - name: customers
//!     kind: csv
//!     file_path: data/customers.csv
//!   - name: orders
//!     kind: postgres
//!     url: postgres://localhost/shop
//!     table: orders
//! relationships:
//!   - from: { source: orders, column: customer_id }
//!     to: { source: customers, column: id }
//! ```
//!
//! [`build_context`] infers every schema and returns a [`GenerationContext`]
//! that is threaded through planning, validation and rendering. Nothing is
//! cached between requests.

use crate::codegen::OutputSink;
use crate::error::{PipelineError, Result, ResultExt as _};
use crate::pipeline::SchemaLookup;
use crate::schema::{ConnectionDescriptor, InferenceOptions, SampleInput, Schema, infer_schema};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Csv,
    Postgres,
    Sqlite,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(alias = "id")]
    pub name: String,
    #[serde(alias = "type")]
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "table_name")]
    pub table: Option<String>,
}

impl SourceConfig {
    pub fn csv(name: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind: SourceKind::Csv,
            file_path: Some(file_path.into()),
            url: None,
            table: None,
        }
    }

    /// Sample input and rendering location for this source.
    fn resolve(&self) -> Result<(SampleInput, SourceLocation)> {
        match self.kind {
            SourceKind::Csv => {
                let path = self.file_path.clone().ok_or_else(|| {
                    PipelineError::Config(format!(
                        "CSV source '{}' must have a file_path",
                        self.name
                    ))
                })?;
                Ok((
                    SampleInput::CsvFile(path.clone()),
                    SourceLocation::CsvFile(path),
                ))
            }
            SourceKind::Postgres | SourceKind::Sqlite => {
                let (Some(url), Some(table)) = (&self.url, &self.table) else {
                    return Err(PipelineError::Config(format!(
                        "{} source '{}' must have a url and a table",
                        self.kind.as_str(),
                        self.name
                    )));
                };
                Ok((
                    SampleInput::Table(ConnectionDescriptor {
                        url: url.clone(),
                        table: table.clone(),
                    }),
                    SourceLocation::Table {
                        table: table.clone(),
                    },
                ))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub source: String,
    pub column: String,
}

/// Declared join path between two sources, offered to the generator as a
/// hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from: Endpoint,
    pub to: Endpoint,
    /// Free-form cardinality, e.g. `many_to_one`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl PipelineConfig {
    /// Load and validate a config file.
    ///
    /// `.json` is parsed as JSON and `.yaml`/`.yml` as YAML; anything else
    /// tries YAML first, then JSON. Relative CSV paths are resolved against
    /// the config file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the file cannot be read or parsed
    /// or fails [`PipelineConfig::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("cannot read {}: {e}", path.display())))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let mut config: Self = match extension.as_deref() {
            Some("json") => serde_json::from_str(&content)?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)?,
            _ => match serde_yaml::from_str(&content) {
                Ok(config) => config,
                Err(_) => serde_json::from_str(&content)?,
            },
        };

        if let Some(base) = path.parent() {
            for source in &mut config.sources {
                if let Some(file) = &source.file_path
                    && file.is_relative()
                {
                    source.file_path = Some(base.join(file));
                }
            }
        }

        config
            .validate()
            .with_context(|| format!("Invalid pipeline config {}", path.display()))?;
        Ok(config)
    }

    /// Structural checks that need no I/O.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] naming the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(PipelineError::Config(
                "config must declare at least one source".to_owned(),
            ));
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(PipelineError::Config("source names must not be empty".to_owned()));
            }
            if !names.insert(source.name.as_str()) {
                return Err(PipelineError::Config(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
            source.resolve()?;
        }

        for (idx, rel) in self.relationships.iter().enumerate() {
            for endpoint in [&rel.from, &rel.to] {
                if !names.contains(endpoint.source.as_str()) {
                    let mut known: Vec<&str> = names.iter().copied().collect();
                    known.sort_unstable();
                    return Err(PipelineError::Config(format!(
                        "relationship {} references unknown source '{}' (known: {})",
                        idx + 1,
                        endpoint.source,
                        known.join(", ")
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }
}

/// Where generated code reads a source from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceLocation {
    CsvFile(PathBuf),
    Table { table: String },
}

/// A named source with its inferred schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBinding {
    pub name: String,
    pub location: SourceLocation,
    pub schema: Schema,
}

impl SourceBinding {
    pub fn new(name: impl Into<String>, location: SourceLocation, schema: Schema) -> Self {
        Self {
            name: name.into(),
            location,
            schema,
        }
    }
}

/// Everything a single generation request needs, passed explicitly from
/// planning through rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationContext {
    pub primary: SourceBinding,
    pub secondary: IndexMap<String, SourceBinding>,
    pub relationships: Vec<Relationship>,
    pub sink: OutputSink,
}

impl GenerationContext {
    /// Single-source context writing to stdout.
    pub fn new(primary: SourceBinding) -> Self {
        Self {
            primary,
            secondary: IndexMap::new(),
            relationships: Vec::new(),
            sink: OutputSink::Stdout,
        }
    }

    #[must_use]
    pub fn with_source(mut self, binding: SourceBinding) -> Self {
        self.secondary.insert(binding.name.clone(), binding);
        self
    }

    #[must_use]
    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: OutputSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.primary.schema
    }

    /// Any source by name, the primary included.
    pub fn binding(&self, name: &str) -> Option<&SourceBinding> {
        if self.primary.name == name {
            return Some(&self.primary);
        }
        self.secondary.get(name)
    }
}

impl SchemaLookup for GenerationContext {
    fn lookup(&self, source: &str) -> Option<&Schema> {
        self.binding(source).map(|b| &b.schema)
    }

    fn source_names(&self) -> Vec<&str> {
        std::iter::once(self.primary.name.as_str())
            .chain(self.secondary.keys().map(String::as_str))
            .collect()
    }
}

/// Infer every source in `config` and assemble a context around `primary`
/// (the first source when `None`).
///
/// # Errors
///
/// [`PipelineError::Config`] for an unknown primary or a relationship column
/// missing from its source; [`PipelineError::SchemaInference`] when a source
/// cannot be sampled.
pub async fn build_context(
    config: &PipelineConfig,
    primary: Option<&str>,
    sink: OutputSink,
    options: InferenceOptions,
) -> Result<GenerationContext> {
    config.validate()?;

    let primary_name = match primary {
        Some(name) => name.to_owned(),
        None => config
            .sources
            .first()
            .map(|s| s.name.clone())
            .ok_or_else(|| PipelineError::Config("config has no sources".to_owned()))?,
    };
    if config.source(&primary_name).is_none() {
        return Err(PipelineError::Config(format!(
            "primary source '{primary_name}' is not declared"
        )));
    }

    let mut bindings = IndexMap::new();
    for source in &config.sources {
        let (input, location) = source.resolve()?;
        let schema = infer_schema(&input, options)
            .await
            .with_context(|| format!("Source '{}'", source.name))?;
        tracing::info!(
            source = %source.name,
            columns = schema.len(),
            rows = schema.row_count_estimate(),
            "Inferred source schema"
        );
        bindings.insert(
            source.name.clone(),
            SourceBinding::new(source.name.clone(), location, schema),
        );
    }

    for rel in &config.relationships {
        for endpoint in [&rel.from, &rel.to] {
            let Some(binding) = bindings.get(&endpoint.source) else {
                continue;
            };
            if !binding.schema.contains(&endpoint.column) {
                let available: Vec<&str> = binding.schema.column_names().collect();
                return Err(PipelineError::Config(format!(
                    "relationship column '{}.{}' does not exist (available: {})",
                    endpoint.source,
                    endpoint.column,
                    available.join(", ")
                )));
            }
        }
    }

    let primary = bindings
        .shift_remove(&primary_name)
        .ok_or_else(|| PipelineError::Config(format!("primary source '{primary_name}' missing")))?;

    Ok(GenerationContext {
        primary,
        secondary: bindings,
        relationships: config.relationships.clone(),
        sink,
    })
}
