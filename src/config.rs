use anyhow::{Context, Result};
use docqa_core::config::PipelineConfig;
use docqa_core::embedding::{DEFAULT_DIMS, MIN_FEATURE_DIMS};
use serde::Deserialize;
use std::path::Path;

/// Environment variables consulted, in order, when no credential is
/// configured.
pub const CREDENTIAL_ENV_VARS: [&str; 2] = ["DOCQA_API_KEY", "OPENAI_API_KEY"];

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Base URL of an OpenAI-compatible API, without the trailing
    /// `/chat/completions`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_dims")]
    pub dims: usize,
}

fn default_dims() -> usize {
    DEFAULT_DIMS
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dims: default_dims(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Files larger than this are rejected before extraction.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if given, otherwise use defaults. Either way the credential
/// falls back to the environment.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) => load_config(p)?,
        None => Config::default(),
    };
    resolve_credential(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Fill an empty `pipeline.credential` from the first non-empty variable in
/// [`CREDENTIAL_ENV_VARS`].
pub fn resolve_credential(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if !config.pipeline.credential.is_empty() {
        return;
    }
    if let Some(value) = CREDENTIAL_ENV_VARS
        .iter()
        .filter_map(|name| lookup(name))
        .find(|v| !v.trim().is_empty())
    {
        config.pipeline.credential = value.trim().to_string();
    }
}

fn validate(config: &Config) -> Result<()> {
    config
        .pipeline
        .validate()
        .with_context(|| "Invalid [pipeline] settings")?;

    if config.backend.timeout_secs == 0 {
        anyhow::bail!("backend.timeout_secs must be > 0");
    }
    if !config.backend.base_url.starts_with("http://")
        && !config.backend.base_url.starts_with("https://")
    {
        anyhow::bail!(
            "backend.base_url must start with http:// or https://, got '{}'",
            config.backend.base_url
        );
    }
    if config.embedding.dims < MIN_FEATURE_DIMS {
        anyhow::bail!("embedding.dims must be >= {}", MIN_FEATURE_DIMS);
    }
    if config.ingest.max_file_bytes == 0 {
        anyhow::bail!("ingest.max_file_bytes must be > 0");
    }
    Ok(())
}
