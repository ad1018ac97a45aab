//! Configuration management for pagewise
//!
//! Handles loading, saving, and validating configuration from TOML files.
//! The resulting [`Config`] is passed explicitly to every pipeline component.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory scanned for source documents (defaults to `<base>/documents`)
    #[serde(default)]
    pub documents_dir: Option<PathBuf>,

    /// Source discovery configuration
    #[serde(default)]
    pub scan: ScanConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// OCR model chain configuration
    #[serde(default)]
    pub ocr: OcrConfig,

    /// Ingestion queue configuration
    #[serde(default)]
    pub queue: QueueConfig,

    /// Startup trigger configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Source discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// File extensions (without the dot) treated as source documents
    #[serde(default = "default_scan_extensions")]
    pub extensions: Vec<String>,

    /// Descend into subdirectories
    #[serde(default = "default_scan_recursive")]
    pub recursive: bool,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Target characters per chunk window
    #[serde(default = "default_chunk_target_chars")]
    pub target_chars: usize,

    /// Characters shared between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub overlap_chars: usize,

    /// Minimum chunk size (shorter fragments are dropped unless final)
    #[serde(default = "default_chunk_min_chars")]
    pub min_chars: usize,

    /// Sentence/word cuts must land past this fraction of the target
    #[serde(default = "default_chunk_min_break_ratio")]
    pub min_break_ratio: f64,
}

/// One vision model in the OCR fallback chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OcrModelConfig {
    /// Model identifier sent to the provider
    pub name: String,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_ocr_endpoint")]
    pub endpoint: String,

    /// Environment variable holding the API key (empty = no auth header)
    #[serde(default = "default_ocr_api_key_env")]
    pub api_key_env: String,
}

/// OCR configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Ordered fallback chain, cheapest tier first
    #[serde(default = "default_ocr_models")]
    pub models: Vec<OcrModelConfig>,

    /// Instruction sent with every page image
    #[serde(default = "default_ocr_prompt")]
    pub prompt: String,

    /// Request timeout in seconds
    #[serde(default = "default_ocr_timeout")]
    pub timeout_secs: u64,

    /// Retries for transport failures and server errors (never for 429)
    #[serde(default = "default_ocr_transport_retries")]
    pub max_transport_retries: usize,

    /// Optional client-side pacing per model
    #[serde(default)]
    pub requests_per_minute: Option<u32>,

    /// Rasterization resolution for page images
    #[serde(default = "default_ocr_dpi")]
    pub dpi: u32,
}

/// Ingestion queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum entries claimed per batch
    #[serde(default = "default_queue_batch_limit")]
    pub batch_limit: usize,

    /// A `processing` entry older than this is re-claimed
    #[serde(default = "default_queue_stale_after_secs")]
    pub stale_after_secs: u64,
}

/// Startup trigger: scanning and processing are independently toggleable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_scan_on_start")]
    pub scan_on_start: bool,

    #[serde(default = "default_process_on_start")]
    pub process_on_start: bool,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for pagewise data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            documents_dir: None,
            scan: ScanConfig::default(),
            chunk: ChunkConfig::default(),
            ocr: OcrConfig::default(),
            queue: QueueConfig::default(),
            pipeline: PipelineConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: default_scan_extensions(),
            recursive: default_scan_recursive(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_chars: default_chunk_target_chars(),
            overlap_chars: default_chunk_overlap(),
            min_chars: default_chunk_min_chars(),
            min_break_ratio: default_chunk_min_break_ratio(),
        }
    }
}

impl ChunkConfig {
    /// Smallest offset (from the window start) at which a soft cut is accepted
    pub fn min_break_offset(&self) -> usize {
        (self.target_chars as f64 * self.min_break_ratio) as usize
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            models: default_ocr_models(),
            prompt: default_ocr_prompt(),
            timeout_secs: default_ocr_timeout(),
            max_transport_retries: default_ocr_transport_retries(),
            requests_per_minute: None,
            dpi: default_ocr_dpi(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_limit: default_queue_batch_limit(),
            stale_after_secs: default_queue_stale_after_secs(),
        }
    }
}

impl QueueConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scan_on_start: default_scan_on_start(),
            process_on_start: default_process_on_start(),
        }
    }
}

impl Config {
    /// Get the default base directory for pagewise (~/.pagewise)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pagewise")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("metadata.db"),
            base_dir: base,
        };
    }

    /// Directory scanned for source documents
    pub fn documents_dir(&self) -> PathBuf {
        self.documents_dir
            .clone()
            .unwrap_or_else(|| self.paths.base_dir.join("documents"))
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        // Set up paths based on config file location
        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("metadata.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Check if pagewise is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk.target_chars == 0 {
            return Err(Error::Config(
                "chunk.target_chars must be positive".to_string(),
            ));
        }

        if self.chunk.overlap_chars >= self.chunk.target_chars {
            return Err(Error::Config(
                "chunk.overlap_chars must be < chunk.target_chars".to_string(),
            ));
        }

        if self.chunk.min_chars > self.chunk.target_chars {
            return Err(Error::Config(
                "chunk.target_chars must be >= chunk.min_chars".to_string(),
            ));
        }

        if self.chunk.min_break_ratio <= 0.0 || self.chunk.min_break_ratio >= 1.0 {
            return Err(Error::Config(
                "chunk.min_break_ratio must be between 0.0 and 1.0 (exclusive)".to_string(),
            ));
        }

        if self.scan.extensions.is_empty() {
            return Err(Error::Config(
                "scan.extensions must list at least one extension".to_string(),
            ));
        }

        if self.ocr.models.is_empty() {
            return Err(Error::Config(
                "ocr.models must list at least one model".to_string(),
            ));
        }

        if let Some(model) = self.ocr.models.iter().find(|m| m.name.trim().is_empty()) {
            return Err(Error::Config(format!(
                "ocr.models entry with endpoint '{}' has an empty name",
                model.endpoint
            )));
        }

        if self.ocr.requests_per_minute == Some(0) {
            return Err(Error::Config(
                "ocr.requests_per_minute must be positive when set".to_string(),
            ));
        }

        if self.queue.batch_limit == 0 {
            return Err(Error::Config(
                "queue.batch_limit must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunk.target_chars, 1000);
        assert_eq!(config.chunk.overlap_chars, 200);
        assert_eq!(config.chunk.min_chars, 100);
        assert_eq!(config.scan.extensions, vec!["pdf".to_string()]);
        assert!(config.ocr.models.len() > 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.queue.batch_limit = 3;
        config.pipeline.process_on_start = false;

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load(&config.paths.config_file).unwrap();
        assert_eq!(loaded.queue.batch_limit, 3);
        assert!(!loaded.pipeline.process_on_start);
        assert_eq!(loaded.ocr.models, config.ocr.models);
        assert_eq!(loaded.documents_dir(), tmp.path().join("documents"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
documents_dir = "/srv/books"

[[ocr.models]]
name = "local-vision"
endpoint = "http://127.0.0.1:8080/v1"
api_key_env = ""
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.documents_dir(), PathBuf::from("/srv/books"));
        assert_eq!(config.ocr.models.len(), 1);
        assert_eq!(config.ocr.models[0].name, "local-vision");
        assert_eq!(config.chunk.target_chars, 1000);
        assert_eq!(config.paths.db_file, tmp.path().join("metadata.db"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        // Invalid: overlap >= target
        config.chunk.overlap_chars = config.chunk.target_chars;
        assert!(config.validate().is_err());

        config.chunk.overlap_chars = 100;
        assert!(config.validate().is_ok());

        // Invalid: min > target
        config.chunk.min_chars = config.chunk.target_chars + 1;
        assert!(config.validate().is_err());
        config.chunk.min_chars = 100;

        config.ocr.models.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_break_offset() {
        let config = ChunkConfig::default();
        assert_eq!(config.min_break_offset(), 500);
    }
}
