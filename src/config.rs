use crate::ai::RetryPolicy;
use crate::error::{PipelineError, Result, ResultExt as _};
use crate::schema::InferenceOptions;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "plansmith";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AiConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_owned(),
            temperature: 0.0,
            max_tokens: 2000,
            api_key_env: "OPENAI_API_KEY".to_owned(),
        }
    }
}

impl AiConfig {
    /// Read the API key from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when the variable is unset, empty or
    /// still holds a template placeholder.
    pub fn api_key(&self) -> Result<SecretString> {
        let value = std::env::var(&self.api_key_env).map_err(|_err| {
            PipelineError::Config(format!(
                "environment variable {} is not set",
                self.api_key_env
            ))
        })?;
        check_api_key(&self.api_key_env, &value)?;
        Ok(SecretString::new(value.into()))
    }
}

fn check_api_key(var: &str, value: &str) -> Result<()> {
    let trimmed = value.trim();
    let lowered = trimmed.to_lowercase();
    if trimmed.is_empty() || lowered.starts_with("your_") || lowered.contains("example") {
        return Err(PipelineError::Config(format!(
            "{var} holds a placeholder, set it to a real API key"
        )));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct PlanningConfig {
    /// Generator responses allowed to fail parsing before giving up.
    pub max_parse_attempts: u32,
    /// Largest edit distance at which a column reference is repaired.
    pub max_edit_distance: usize,
    /// Sample rows embedded in the prompt.
    pub prompt_sample_rows: usize,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            max_parse_attempts: 3,
            max_edit_distance: 2,
            prompt_sample_rows: 5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct InferenceConfig {
    /// Rows read from a CSV file or table for type inference.
    pub sample_rows: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self { sample_rows: 1000 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub ai: AiConfig,
    pub retry: RetryPolicy,
    pub planning: PlanningConfig,
    pub inference: InferenceConfig,
    /// Lineage JSONL file; defaults to the app data directory.
    pub lineage_path: Option<PathBuf>,
    /// Log directory; defaults to the app data directory.
    pub log_dir: Option<PathBuf>,
}

impl EngineConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn inference_options(&self) -> InferenceOptions {
        InferenceOptions {
            sample_rows: self.inference.sample_rows,
            prompt_sample_rows: self.planning.prompt_sample_rows,
        }
    }

    /// # Errors
    ///
    /// Returns an error if no path is configured and the platform data
    /// directory cannot be determined.
    pub fn resolved_lineage_path(&self) -> Result<PathBuf> {
        match &self.lineage_path {
            Some(path) => Ok(path.clone()),
            None => Ok(app_data_dir()?.join("lineage.jsonl")),
        }
    }
}

/// Platform data directory for plansmith, e.g. `~/.local/share/plansmith`.
///
/// # Errors
///
/// Returns [`PipelineError::Config`] if the platform has no data directory.
pub fn app_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|base| base.join(APP_DIR))
        .ok_or_else(|| PipelineError::Config("Failed to determine data directory".to_owned()))
}

/// # Errors
///
/// Same as [`app_data_dir`].
pub fn get_config_path() -> Result<PathBuf> {
    Ok(app_data_dir()?.join("config.json"))
}
