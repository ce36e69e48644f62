// Confidence scoring
// Runs the classifier and pulls out the positive-class probability.

use crate::models::{EmbeddingMatrix, ModelConfig};
use crate::services::text_processor::preprocess;

use super::backends::{BinaryClassifier, SentenceEmbedder};
use super::embedding::assemble_matrix;
use super::error::{ModerationError, ModerationResult};

/// Positive-class probability from a `[batch][2]` classifier output.
pub fn positive_probability(output: &[Vec<f32>]) -> ModerationResult<f64> {
    let first = output
        .first()
        .ok_or_else(|| ModerationError::ModelOutput("classifier returned no rows".to_string()))?;

    if first.len() != 2 {
        return Err(ModerationError::ModelOutput(format!(
            "expected 2 class probabilities, got {}: {:?}",
            first.len(),
            first
        )));
    }

    let prob = first[1] as f64;
    if !prob.is_finite() || !(0.0..=1.0).contains(&prob) {
        return Err(ModerationError::ModelOutput(format!(
            "positive probability out of range: {}",
            prob
        )));
    }

    Ok(prob)
}

pub fn score_matrix(matrix: &EmbeddingMatrix, classifier: &dyn BinaryClassifier) -> ModerationResult<f64> {
    let output = classifier.predict(matrix)?;
    positive_probability(&output)
}

/// Preprocess, embed and classify one document.
pub fn confidence_score(
    raw: &str,
    embedder: &dyn SentenceEmbedder,
    classifier: &dyn BinaryClassifier,
    config: &ModelConfig,
) -> ModerationResult<f64> {
    let sentences = preprocess(raw);
    let matrix = assemble_matrix(&sentences, embedder, config)?;
    score_matrix(&matrix, classifier)
}
