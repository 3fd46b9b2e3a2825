//! Pipeline configuration record.
//!
//! [`PipelineConfig`] is validated as a whole: [`PipelineConfig::validate`]
//! collects every invalid field into one [`ConfigError`] rather than
//! stopping at the first. Runtime changes go through [`ConfigPatch`], which
//! is merged onto a copy and validated before anything is swapped in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, FieldError};

/// Supported generation models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Model {
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[serde(rename = "gpt-4.1-mini")]
    Gpt41Mini,
    #[serde(rename = "gpt-4.1")]
    Gpt41,
    #[serde(rename = "llama3.2")]
    Llama32,
    #[serde(rename = "mistral")]
    Mistral,
}

impl Model {
    pub const ALL: [Model; 6] = [
        Model::Gpt4oMini,
        Model::Gpt4o,
        Model::Gpt41Mini,
        Model::Gpt41,
        Model::Llama32,
        Model::Mistral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Gpt4oMini => "gpt-4o-mini",
            Model::Gpt4o => "gpt-4o",
            Model::Gpt41Mini => "gpt-4.1-mini",
            Model::Gpt41 => "gpt-4.1",
            Model::Llama32 => "llama3.2",
            Model::Mistral => "mistral",
        }
    }

    /// Models usually served by a local runtime, which needs no credential.
    pub fn is_local(&self) -> bool {
        matches!(self, Model::Llama32 | Model::Mistral)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Model::ALL
            .iter()
            .find(|m| m.as_str() == s)
            .copied()
            .ok_or_else(|| {
                let known: Vec<&str> = Model::ALL.iter().map(|m| m.as_str()).collect();
                format!("unknown model '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// Placeholder shown in place of a configured credential.
pub const REDACTED_CREDENTIAL: &str = "********";

fn default_model() -> Model {
    Model::Gpt4oMini
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_top_k() -> usize {
    4
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

/// The active pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_model")]
    pub model: Model,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Passed to the generation backend; not validated here since local
    /// backends need none.
    #[serde(default)]
    pub credential: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_k: default_top_k(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            credential: String::new(),
        }
    }
}

impl PipelineConfig {
    /// Check every field, reporting all violations together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        let mut reject = |field: &'static str, message: String| {
            errors.push(FieldError { field, message })
        };

        if !(0.0..=1.0).contains(&self.temperature) {
            reject(
                "temperature",
                format!("must be in [0.0, 1.0], got {}", self.temperature),
            );
        }
        if self.max_tokens == 0 {
            reject("max_tokens", "must be > 0".to_string());
        }
        if self.top_k == 0 {
            reject("top_k", "must be >= 1".to_string());
        }
        if self.chunk_size < 100 {
            reject(
                "chunk_size",
                format!("must be >= 100, got {}", self.chunk_size),
            );
        }
        if self.chunk_overlap >= self.chunk_size {
            reject(
                "chunk_overlap",
                format!(
                    "must be < chunk_size ({}), got {}",
                    self.chunk_size, self.chunk_overlap
                ),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { errors })
        }
    }

    /// Merge `patch` onto a copy and validate the result. `self` is never
    /// modified.
    pub fn merged(&self, patch: &ConfigPatch) -> Result<PipelineConfig, ConfigError> {
        let mut next = self.clone();
        let mut errors = Vec::new();

        if let Some(model) = &patch.model {
            match model.parse::<Model>() {
                Ok(m) => next.model = m,
                Err(message) => errors.push(FieldError {
                    field: "model",
                    message,
                }),
            }
        }
        if let Some(v) = patch.temperature {
            next.temperature = v;
        }
        if let Some(v) = patch.max_tokens {
            next.max_tokens = v;
        }
        if let Some(v) = patch.top_k {
            next.top_k = v;
        }
        if let Some(v) = patch.chunk_size {
            next.chunk_size = v;
        }
        if let Some(v) = patch.chunk_overlap {
            next.chunk_overlap = v;
        }
        // a redacted config echoed back must not overwrite the real credential
        if let Some(v) = patch.credential.as_ref().filter(|v| *v != REDACTED_CREDENTIAL) {
            next.credential = v.clone();
        }

        if let Err(e) = next.validate() {
            errors.extend(e.errors);
        }
        if errors.is_empty() {
            Ok(next)
        } else {
            Err(ConfigError { errors })
        }
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            credential: self.credential.clone(),
        }
    }

    /// Copy with the credential replaced by a placeholder, for display.
    pub fn redacted(&self) -> PipelineConfig {
        let mut copy = self.clone();
        if !copy.credential.is_empty() {
            copy.credential = REDACTED_CREDENTIAL.to_string();
        }
        copy
    }
}

/// A partial configuration update. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigPatch {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_k: Option<usize>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub credential: Option<String>,
}

/// Per-call settings handed to a generation backend, taken from the active
/// configuration at the start of each query.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub model: Model,
    pub temperature: f32,
    pub max_tokens: u32,
    pub credential: String,
}
