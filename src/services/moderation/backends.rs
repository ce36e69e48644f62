// Model backends
// Seams for the embedding service, the classifier and the synonym lexicon.

use crate::models::{EmbeddingMatrix, ModelConfig};

use super::error::ModerationResult;

/// Maps sentences to fixed-dimension vectors, one per sentence, in order.
pub trait SentenceEmbedder: Send + Sync {
    fn embed(&self, sentences: &[String]) -> ModerationResult<Vec<Vec<f32>>>;
}

/// Binary classifier over a `[1, MAX_SEQ_LEN, EMBED_DIM]` tensor.
///
/// Returns one probability vector per batch row; index 1 is the positive class.
pub trait BinaryClassifier: Send + Sync {
    fn predict(&self, matrix: &EmbeddingMatrix) -> ModerationResult<Vec<Vec<f32>>>;
}

/// Word to candidate synonym lemmas. Lemmas may use `_` between words.
pub trait SynonymLexicon: Send + Sync {
    fn lemmas(&self, word: &str) -> Vec<String>;
}

/// Lexicon with no entries; augmentation then leaves every word unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyLexicon;

impl SynonymLexicon for EmptyLexicon {
    fn lemmas(&self, _word: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Everything the engine needs once models are up.
pub struct LoadedModels {
    pub embedder: Box<dyn SentenceEmbedder>,
    pub classifier: Box<dyn BinaryClassifier>,
    pub lexicon: Box<dyn SynonymLexicon>,
    pub config: ModelConfig,
}

impl std::fmt::Debug for LoadedModels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModels")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Expensive, one-shot construction of [`LoadedModels`].
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> ModerationResult<LoadedModels>;
}
