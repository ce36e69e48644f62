// MindGate Core Services

pub mod config_store;
pub mod model_store;
pub mod moderation;
pub mod providers;
pub mod text_processor;

pub use config_store::*;
pub use model_store::*;
pub use providers::*;
pub use text_processor::*;

// Re-export moderation entry points
pub use moderation::{
    fingerprint,
    keyword_override,
    tta_vote,
    AugmentationParams,
    EngineSettings,
    LoadedModels,
    ModelLoader,
    ModerationEngine,
    ModerationError,
    ModerationResult,
};
