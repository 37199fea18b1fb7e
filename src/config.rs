use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in characters (~4 chars per token).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between consecutive token-based windows, in characters.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// Chunks shorter than this are discarded.
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            min_chunk_size: default_min_chunk_size(),
        }
    }
}

fn default_chunk_size() -> usize {
    2000
}
fn default_overlap() -> usize {
    300
}
fn default_min_chunk_size() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Documents with fewer extracted characters fail ingestion outright.
    #[serde(default = "default_min_extract_chars")]
    pub min_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_extract_chars(),
        }
    }
}

fn default_min_extract_chars() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    /// Rasterization resolution for scanned pages. 300 DPI is the
    /// quality/memory tradeoff point.
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    /// Tesseract language pack.
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Tesseract page segmentation mode. 3 = fully automatic (whole page).
    #[serde(default = "default_psm")]
    pub psm: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            dpi: default_dpi(),
            lang: default_lang(),
            psm: default_psm(),
        }
    }
}

fn default_dpi() -> u32 {
    300
}
fn default_lang() -> String {
    "eng".to_string()
}
fn default_psm() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
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

impl Config {
    /// Minimal in-memory configuration, used by tests and dry runs.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from(":memory:"),
            },
            chunking: ChunkingConfig::default(),
            extraction: ExtractionConfig::default(),
            ocr: OcrConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }
    if config.chunking.min_chunk_size > config.chunking.chunk_size {
        anyhow::bail!("chunking.min_chunk_size must not exceed chunking.chunk_size");
    }
    if config.ocr.dpi == 0 {
        anyhow::bail!("ocr.dpi must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(config)
}
