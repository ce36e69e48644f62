// Configuration Storage Service
// Handles config file read/write, environment overrides and version backup

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::services::moderation::augmentation::{
    AugmentationParams, DEFAULT_SEED, DEFAULT_VARIANTS, DEFAULT_VOTE_THRESHOLD, DEFAULT_WORDS_PER_SENTENCE,
};
use crate::services::moderation::cache::DEFAULT_MAX_ENTRIES;
use crate::services::moderation::engine::{EngineSettings, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::services::moderation::error::{ModerationError, ModerationResult};
use crate::services::moderation::keyword_override::DEFAULT_MIN_MATCHES;
use crate::services::providers::{DEFAULT_TIMEOUT_SECS, INFERENCE_DEFAULT_URL};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_augmentation_threshold")]
    pub augmentation_threshold: f64,
    #[serde(default = "default_variants")]
    pub augmentation_variants: usize,
    #[serde(default = "default_seed")]
    pub augmentation_seed: u64,
    #[serde(default = "default_words_per_sentence")]
    pub words_per_sentence: usize,
    #[serde(default = "default_min_matches")]
    pub override_min_matches: usize,
    #[serde(default)]
    pub parallel_augmentation: bool,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
    #[serde(default)]
    pub inference: InferenceConfig,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            augmentation_threshold: DEFAULT_VOTE_THRESHOLD,
            augmentation_variants: DEFAULT_VARIANTS,
            augmentation_seed: DEFAULT_SEED,
            words_per_sentence: DEFAULT_WORDS_PER_SENTENCE,
            override_min_matches: DEFAULT_MIN_MATCHES,
            parallel_augmentation: false,
            cache: CacheConfig::default(),
            model_dir: None,
            inference: InferenceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: INFERENCE_DEFAULT_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

fn default_confidence_threshold() -> f64 { DEFAULT_CONFIDENCE_THRESHOLD }
fn default_augmentation_threshold() -> f64 { DEFAULT_VOTE_THRESHOLD }
fn default_variants() -> usize { DEFAULT_VARIANTS }
fn default_seed() -> u64 { DEFAULT_SEED }
fn default_words_per_sentence() -> usize { DEFAULT_WORDS_PER_SENTENCE }
fn default_min_matches() -> usize { DEFAULT_MIN_MATCHES }
fn default_max_entries() -> u64 { DEFAULT_MAX_ENTRIES }
fn default_base_url() -> String { INFERENCE_DEFAULT_URL.to_string() }
fn default_timeout() -> u64 { DEFAULT_TIMEOUT_SECS }

impl ModerationConfig {
    /// Apply `MINDGATE_INFERENCE_URL` and `MINDGATE_MODEL_DIR` if set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = env::var("MINDGATE_INFERENCE_URL") {
            if !url.trim().is_empty() {
                self.inference.base_url = url.trim().to_string();
            }
        }
        if let Ok(dir) = env::var("MINDGATE_MODEL_DIR") {
            if !dir.trim().is_empty() {
                self.model_dir = Some(PathBuf::from(dir.trim()));
            }
        }
        self
    }

    pub fn validate(&self) -> ModerationResult<()> {
        for (name, value) in [
            ("confidenceThreshold", self.confidence_threshold),
            ("augmentationThreshold", self.augmentation_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ModerationError::Config(format!("{} must be within [0, 1], got {}", name, value)));
            }
        }
        if self.augmentation_variants == 0 {
            return Err(ModerationError::Config("augmentationVariants must be at least 1".to_string()));
        }
        if self.cache.max_entries == 0 {
            return Err(ModerationError::Config("cache.maxEntries must be at least 1".to_string()));
        }
        if self.inference.base_url.trim().is_empty() {
            return Err(ModerationError::Config("inference.baseUrl is empty".to_string()));
        }
        Ok(())
    }

    /// Model directory, defaulting to `<config dir>/mindgate/models`.
    pub fn resolved_model_dir(&self) -> ModerationResult<PathBuf> {
        if let Some(dir) = &self.model_dir {
            return Ok(dir.clone());
        }
        ConfigStore::default_config_dir()
            .map(|d| d.join("models"))
            .ok_or_else(|| ModerationError::Config("no model directory configured".to_string()))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            confidence_threshold: self.confidence_threshold,
            augmentation: AugmentationParams {
                variants: self.augmentation_variants,
                seed: self.augmentation_seed,
                words_per_sentence: self.words_per_sentence,
                threshold: self.augmentation_threshold,
                parallel: self.parallel_augmentation,
            },
            override_min_matches: self.override_min_matches,
            cache_max_entries: self.cache.max_entries,
            cache_ttl: self.cache.ttl_seconds.map(Duration::from_secs),
        }
    }
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Store reading and writing exactly `path`.
    pub fn from_file(path: &Path) -> Self {
        let config_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            config_dir,
            config_file: path.to_path_buf(),
        }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mindgate"))
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Ensure config directory exists
    pub fn ensure_dir(&self) -> ModerationResult<()> {
        fs::create_dir_all(&self.config_dir)
            .map_err(|e| ModerationError::Config(format!("Failed to create config dir: {}", e)))
    }

    /// Load configuration from file; a missing file yields defaults.
    pub fn load(&self) -> ModerationResult<ModerationConfig> {
        if !self.config_file.exists() {
            return Ok(ModerationConfig::default());
        }

        let content = fs::read_to_string(&self.config_file)
            .map_err(|e| ModerationError::Config(format!("Failed to read config: {}", e)))?;

        let config: ModerationConfig = serde_json::from_str(&content)
            .map_err(|e| ModerationError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &ModerationConfig) -> ModerationResult<()> {
        config.validate()?;
        self.ensure_dir()?;

        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| ModerationError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.config_file, content)
            .map_err(|e| ModerationError::Config(format!("Failed to write config: {}", e)))
    }

    fn create_backup(&self) -> ModerationResult<()> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir)
            .map_err(|e| ModerationError::Config(format!("Failed to create backup dir: {}", e)))?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%.3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file)
            .map_err(|e| ModerationError::Config(format!("Failed to create backup: {}", e)))?;

        // Keep only last 10 backups
        self.cleanup_old_backups(&backup_dir, 10)
    }

    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> ModerationResult<()> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)
            .map_err(|e| ModerationError::Config(format!("Failed to read backup dir: {}", e)))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // Oldest first; names carry the timestamp
        entries.sort_by_key(|e| e.file_name());

        for entry in entries.iter().take(entries.len() - keep) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }
}
