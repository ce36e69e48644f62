// Moderation Module
// Ensemble gate deciding whether a submission carries mental-health content:
// - embedding: sentence vectors packed into the fixed classifier input
// - scoring: classifier call and positive-class probability
// - augmentation: seeded synonym perturbations and majority vote
// - keyword_override: vocabulary allow-rule
// - cache: decisions memoized by content fingerprint
// - engine: orchestration, lazy model loading, caching

pub mod augmentation;
pub mod backends;
pub mod cache;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod keyword_override;
pub mod scoring;

pub use augmentation::{augment_document, tta_vote, AugmentationParams};
pub use backends::{BinaryClassifier, EmptyLexicon, LoadedModels, ModelLoader, SentenceEmbedder, SynonymLexicon};
pub use cache::{fingerprint, DecisionCache};
pub use embedding::assemble_matrix;
pub use engine::{EngineSettings, ModerationEngine};
pub use error::{ModerationError, ModerationResult};
pub use keyword_override::{keyword_matches, keyword_override, MENTAL_HEALTH_KEYWORDS};
pub use scoring::{confidence_score, positive_probability};
