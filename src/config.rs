//! TOML configuration.
//!
//! Every section is optional; missing keys fall back to defaults so an
//! empty file (or [`Config::minimal`]) yields a working offline setup that
//! reads documents from `./data`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_corpus_dir")]
    pub dir: PathBuf,
    /// File-name patterns that count as documents.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            dir: default_corpus_dir(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_corpus_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_include_globs() -> Vec<String> {
    vec!["*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `auto`, `openai`, or `offline`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Optional deadline for the whole upstream request. Unset means none.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Pause between fragments emitted by the offline backend.
    #[serde(default = "default_fragment_delay_ms")]
    pub fragment_delay_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: None,
            fragment_delay_ms: default_fragment_delay_ms(),
        }
    }
}

fn default_provider() -> String {
    "auto".to_string()
}
fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    500
}
fn default_fragment_delay_ms() -> u64 {
    10
}

impl GenerationConfig {
    /// Reads the API key from the configured environment variable.
    /// Empty values count as unset.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Config {
    /// All-defaults configuration, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Checks value ranges that serde cannot express.
pub fn validate(config: &Config) -> Result<()> {
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.corpus.include_globs.is_empty() {
        anyhow::bail!("corpus.include_globs must name at least one pattern");
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        anyhow::bail!("generation.temperature must be in [0.0, 2.0]");
    }

    if config.generation.max_tokens == 0 {
        anyhow::bail!("generation.max_tokens must be > 0");
    }

    match config.generation.provider.as_str() {
        "auto" | "openai" | "offline" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be auto, openai, or offline.",
            other
        ),
    }

    Ok(())
}
