// Moderation errors
// Every variant aborts the decision in progress; none of them is a verdict.

use thiserror::Error;

use crate::services::providers::ProviderError;

#[derive(Error, Debug)]
pub enum ModerationError {
    #[error("Unexpected model output: {0}")]
    ModelOutput(String),
    #[error("Model invocation failed: {0}")]
    ModelInvocation(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Moderation worker failed: {0}")]
    Worker(String),
}

impl From<ProviderError> for ModerationError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidResponse(msg) => ModerationError::ModelOutput(msg),
            other => ModerationError::ModelInvocation(other.to_string()),
        }
    }
}

pub type ModerationResult<T> = Result<T, ModerationError>;
