//! TOML configuration.
//!
//! Every section has defaults, so an empty file is a valid configuration
//! that serves `portfolio/portfolio.json` with keyword routing and the
//! rule-based generator. See `config/folio.example.toml`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment override for [`RetrievalConfig::enable_dense`].
pub const ENABLE_DENSE_ENV: &str = "FOLIO_ENABLE_DENSE";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PortfolioConfig {
    #[serde(default = "default_portfolio_path")]
    pub path: PathBuf,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            path: default_portfolio_path(),
        }
    }
}

fn default_portfolio_path() -> PathBuf {
    PathBuf::from("portfolio/portfolio.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Try dense retrieval before keyword routing.
    #[serde(default)]
    pub enable_dense: bool,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    #[serde(default = "default_meta_path")]
    pub meta_path: PathBuf,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enable_dense: false,
            top_k: default_top_k(),
            index_path: default_index_path(),
            meta_path: default_meta_path(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_index_path() -> PathBuf {
    PathBuf::from("portfolio/folio.index")
}
fn default_meta_path() -> PathBuf {
    PathBuf::from("portfolio/folio.meta.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_embedding_timeout() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Model name used both when building and when querying the index.
    pub fn model_name(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| match self.provider.as_str() {
                "openai" => "text-embedding-3-small".to_string(),
                "ollama" => "nomic-embed-text".to_string(),
                _ => "all-minilm-l6-v2".to_string(),
            })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    /// Context longer than this is truncated before prompting a local model.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            timeout_secs: default_generation_timeout(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_generation_provider() -> String {
    "rule_based".to_string()
}
fn default_generation_timeout() -> u64 {
    120
}
fn default_max_context_chars() -> usize {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

/// Reads, parses and validates a configuration file.
///
/// [`ENABLE_DENSE_ENV`] overrides `retrieval.enable_dense` when set to
/// `true` or `false`.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;

    if let Ok(value) = std::env::var(ENABLE_DENSE_ENV) {
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => config.retrieval.enable_dense = true,
            "false" | "0" => config.retrieval.enable_dense = false,
            other => bail!("{} must be true or false, got '{}'", ENABLE_DENSE_ENV, other),
        }
    }

    Ok(config)
}

/// Parses and validates configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" | "ollama" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, ollama, or openai.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0 when set");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.timeout_secs == 0 {
        bail!("embedding.timeout_secs must be > 0");
    }

    match config.generation.provider.as_str() {
        "rule_based" | "ollama" | "openai" | "hf_inference" | "replicate" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be rule_based, ollama, openai, hf_inference or replicate.",
            other
        ),
    }
    if config.generation.timeout_secs == 0 {
        bail!("generation.timeout_secs must be > 0");
    }

    if config.server.cors_origins.is_empty() {
        bail!("server.cors_origins must list at least one origin (use \"*\" for any)");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.portfolio.path, PathBuf::from("portfolio/portfolio.json"));
        assert!(!config.retrieval.enable_dense);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.embedding.model_name(), "all-minilm-l6-v2");
        assert_eq!(config.generation.provider, "rule_based");
        assert_eq!(config.server.cors_origins, vec!["*"]);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = parse_config(
            r#"
[portfolio]
path = "data/me.json"

[retrieval]
enable_dense = true
top_k = 3

[generation]
provider = "ollama"
model = "llama3.2"
timeout_secs = 60

[server]
bind = "127.0.0.1:9000"
cors_origins = ["http://localhost:3000", "https://me.dev"]
"#,
        )
        .unwrap();
        assert_eq!(config.portfolio.path, PathBuf::from("data/me.json"));
        assert!(config.retrieval.enable_dense);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.generation.provider, "ollama");
        assert_eq!(config.generation.timeout_secs, 60);
        assert_eq!(config.server.cors_origins.len(), 2);
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let err = parse_config("[retrieval]\ntop_k = 0\n").unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn test_rejects_unknown_providers() {
        assert!(parse_config("[embedding]\nprovider = \"faiss\"\n").is_err());
        assert!(parse_config("[generation]\nprovider = \"hf_local\"\n").is_err());
        assert!(parse_config("[generation]\nprovider = \"replicate\"\n").is_ok());
    }

    #[test]
    fn test_embedding_model_defaults_per_provider() {
        let config = parse_config("[embedding]\nprovider = \"ollama\"\n").unwrap();
        assert_eq!(config.embedding.model_name(), "nomic-embed-text");
    }
}
