//! TOML configuration parsing.
//!
//! Per-model chunking parameters live in `[models.<name>]` tables; when the
//! section is omitted the three stock models are used.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::Language;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    pub db: DbConfig,
    #[serde(default = "default_models")]
    pub models: BTreeMap<String, ModelConfig>,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Verse table JSON.
    pub verses: PathBuf,
    /// Where `<level>_records.json` files are read and written.
    pub records_dir: PathBuf,
    #[serde(default = "default_book")]
    pub book: String,
}

fn default_book() -> String {
    "Genesis".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SplitterKind {
    #[default]
    Character,
    Sentence,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub language: Language,
    /// Target chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    #[serde(default)]
    pub splitter: SplitterKind,
    /// Overrides `[embedding].model` for this model.
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
}

impl ModelConfig {
    /// Record field embedded for this model: Hebrew models embed `hebrew`,
    /// English models embed `text`.
    pub fn text_field(&self) -> &'static str {
        match self.language {
            Language::Hebrew => "hebrew",
            Language::English => "text",
        }
    }
}

/// Stock models. Chunk sizes target roughly half to three quarters of each
/// model's maximum sequence length.
pub fn default_models() -> BTreeMap<String, ModelConfig> {
    let mut models = BTreeMap::new();
    models.insert(
        "berit".to_string(),
        ModelConfig {
            language: Language::Hebrew,
            chunk_size: 180,
            chunk_overlap: 30,
            splitter: SplitterKind::Character,
            embedding_model: None,
            dims: None,
        },
    );
    models.insert(
        "hebrew_st".to_string(),
        ModelConfig {
            language: Language::Hebrew,
            chunk_size: 600,
            chunk_overlap: 120,
            splitter: SplitterKind::Character,
            embedding_model: None,
            dims: None,
        },
    );
    models.insert(
        "english_st".to_string(),
        ModelConfig {
            language: Language::English,
            chunk_size: 800,
            chunk_overlap: 160,
            splitter: SplitterKind::Sentence,
            embedding_model: None,
            dims: None,
        },
    );
    models
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_max_top_k() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct VerificationConfig {
    /// Allowed word-count drift before a partial or full verse is reported.
    #[serde(default = "default_word_tolerance")]
    pub word_tolerance: usize,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            word_tolerance: default_word_tolerance(),
        }
    }
}

fn default_word_tolerance() -> usize {
    2
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
    "127.0.0.1:8080".to_string()
}

impl Config {
    pub fn model(&self, name: &str) -> Result<&ModelConfig> {
        self.models.get(name).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown model: '{}'. Configured models: {}",
                name,
                self.models.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })
    }

    /// `[embedding]` with the model's own `embedding_model`/`dims` applied.
    pub fn embedding_for(&self, model_name: &str) -> Result<EmbeddingConfig> {
        let model = self.model(model_name)?;
        let mut cfg = self.embedding.clone();
        if let Some(ref m) = model.embedding_model {
            cfg.model = Some(m.clone());
        }
        if model.dims.is_some() {
            cfg.dims = model.dims;
        }
        Ok(cfg)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.models.is_empty() {
        anyhow::bail!("at least one [models.<name>] table is required");
    }

    for (name, model) in &config.models {
        if model.chunk_size == 0 {
            anyhow::bail!("models.{}.chunk_size must be > 0", name);
        }
        if model.chunk_overlap >= model.chunk_size {
            anyhow::bail!("models.{}.chunk_overlap must be < chunk_size", name);
        }
    }

    if config.retrieval.default_top_k < 1
        || config.retrieval.default_top_k > config.retrieval.max_top_k
    {
        anyhow::bail!("retrieval.default_top_k must be in [1, retrieval.max_top_k]");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    if config.embedding.is_enabled() && config.embedding.provider != "local" {
        for name in config.models.keys() {
            let cfg = config.embedding_for(name)?;
            if cfg.model.is_none() {
                anyhow::bail!(
                    "an embedding model must be set for '{}' when provider is '{}'",
                    name,
                    config.embedding.provider
                );
            }
            if cfg.dims.is_none() || cfg.dims == Some(0) {
                anyhow::bail!(
                    "embedding dims must be > 0 for '{}' when provider is '{}'",
                    name,
                    config.embedding.provider
                );
            }
        }
    }

    Ok(())
}
