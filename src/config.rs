use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{IngestError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("db/metadata.db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RulesConfig {
    #[serde(default = "default_rules_path")]
    pub path: PathBuf,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: default_rules_path(),
        }
    }
}

fn default_rules_path() -> PathBuf {
    PathBuf::from("db/normalization_map.json")
}

/// Chunk sizes are measured in characters.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    512
}
fn default_chunk_overlap() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct QualityConfig {
    #[serde(default = "default_garbage_threshold")]
    pub garbage_threshold: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            garbage_threshold: default_garbage_threshold(),
        }
    }
}

fn default_garbage_threshold() -> f64 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default)]
    pub detect: bool,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_ocr_workers")]
    pub workers: usize,
    #[serde(default)]
    pub dictionary: Option<PathBuf>,
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            detect: false,
            similarity_threshold: default_similarity_threshold(),
            workers: default_ocr_workers(),
            dictionary: None,
            report_dir: default_report_dir(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.8
}
fn default_ocr_workers() -> usize {
    8
}
fn default_report_dir() -> PathBuf {
    PathBuf::from("logs")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_file_workers")]
    pub workers: usize,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub index_output: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            workers: default_file_workers(),
            embedding_model: default_embedding_model(),
            index_output: None,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./data")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}
fn default_file_workers() -> usize {
    4
}
fn default_embedding_model() -> String {
    "intfloat/multilingual-e5-small".to_string()
}

impl Config {
    /// All defaults. Paths are relative to the working directory.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig::default(),
            rules: RulesConfig::default(),
            chunking: ChunkingConfig::default(),
            quality: QualityConfig::default(),
            ocr: OcrConfig::default(),
            ingest: IngestConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(IngestError::Config("chunking.chunk_size must be > 0".into()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(IngestError::Config(format!(
                "chunking.chunk_overlap ({}) must be < chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if !(0.0..=1.0).contains(&self.quality.garbage_threshold) {
            return Err(IngestError::Config(
                "quality.garbage_threshold must be in [0.0, 1.0]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ocr.similarity_threshold) {
            return Err(IngestError::Config(
                "ocr.similarity_threshold must be in [0.0, 1.0]".into(),
            ));
        }
        if self.ocr.workers == 0 {
            return Err(IngestError::Config("ocr.workers must be > 0".into()));
        }
        if self.ingest.workers == 0 {
            return Err(IngestError::Config("ingest.workers must be > 0".into()));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        IngestError::Config(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| IngestError::Config(format!("failed to parse config file: {}", e)))?;

    config.validate()?;
    Ok(config)
}
