// Model Store
// Reads model metadata and the synonym table from the model directory and
// wires the inference client into a loaded-model bundle.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::models::ModelConfig;
use crate::services::config_store::{InferenceConfig, ModerationConfig};
use crate::services::moderation::backends::{EmptyLexicon, LoadedModels, ModelLoader, SynonymLexicon};
use crate::services::moderation::error::{ModerationError, ModerationResult};
use crate::services::providers::InferenceClient;

pub const MODEL_CONFIG_FILE: &str = "model_config.json";
pub const SYNONYMS_FILE: &str = "synonyms.json";

/// Read `MAX_SEQ_LEN` / `EMBED_DIM` from `model_config.json`.
pub fn load_model_config(model_dir: &Path) -> ModerationResult<ModelConfig> {
    let path = model_dir.join(MODEL_CONFIG_FILE);
    let content = fs::read_to_string(&path)
        .map_err(|e| ModerationError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    let config: ModelConfig = serde_json::from_str(&content)
        .map_err(|e| ModerationError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    if config.max_seq_len == 0 || config.embed_dim == 0 {
        return Err(ModerationError::Config(format!(
            "{} must declare positive MAX_SEQ_LEN and EMBED_DIM",
            path.display()
        )));
    }
    Ok(config)
}

/// Synonym lexicon backed by a JSON object of `word -> [lemma, ...]`.
///
/// Lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    entries: HashMap<String, Vec<String>>,
}

impl SynonymTable {
    pub fn from_json(content: &str) -> ModerationResult<Self> {
        let raw: HashMap<String, Vec<String>> = serde_json::from_str(content)
            .map_err(|e| ModerationError::Config(format!("Failed to parse synonym table: {}", e)))?;

        let mut entries: HashMap<String, Vec<String>> = HashMap::with_capacity(raw.len());
        for (word, lemmas) in raw {
            entries.entry(word.to_lowercase()).or_default().extend(lemmas);
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> ModerationResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ModerationError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SynonymLexicon for SynonymTable {
    fn lemmas(&self, word: &str) -> Vec<String> {
        self.entries.get(&word.to_lowercase()).cloned().unwrap_or_default()
    }
}

/// Loads the bundle used in production: remote embedder and classifier,
/// file-backed synonym table, `model_config.json` shape constants.
#[derive(Debug, Clone)]
pub struct RemoteModelLoader {
    model_dir: PathBuf,
    inference: InferenceConfig,
}

impl RemoteModelLoader {
    pub fn new(model_dir: PathBuf, inference: InferenceConfig) -> Self {
        Self { model_dir, inference }
    }

    pub fn from_config(config: &ModerationConfig) -> ModerationResult<Self> {
        Ok(Self::new(config.resolved_model_dir()?, config.inference.clone()))
    }

    fn load_lexicon(&self) -> ModerationResult<Box<dyn SynonymLexicon>> {
        let path = self.model_dir.join(SYNONYMS_FILE);
        if !path.exists() {
            warn!(path = %path.display(), "synonym table missing; augmentation will not perturb text");
            return Ok(Box::new(EmptyLexicon));
        }
        let table = SynonymTable::load(&path)?;
        info!(entries = table.len(), "synonym table loaded");
        Ok(Box::new(table))
    }
}

impl ModelLoader for RemoteModelLoader {
    fn load(&self) -> ModerationResult<LoadedModels> {
        let config = load_model_config(&self.model_dir)?;
        let lexicon = self.load_lexicon()?;
        let client = InferenceClient::new(
            &self.inference.base_url,
            Duration::from_secs(self.inference.timeout_secs),
        )?;
        info!(base_url = client.base_url(), "inference client ready");

        Ok(LoadedModels {
            embedder: Box::new(client.clone()),
            classifier: Box::new(client),
            lexicon,
            config,
        })
    }
}
