// Embedding assembly
// Sentence vectors packed into the fixed-shape classifier input

use crate::models::{EmbeddingMatrix, ModelConfig};

use super::backends::SentenceEmbedder;
use super::error::{ModerationError, ModerationResult};

/// Build a `[1, max_seq_len, embed_dim]` matrix from `sentences`.
///
/// Only the first `max_seq_len` sentences are embedded; missing rows stay zero.
pub fn assemble_matrix(
    sentences: &[String],
    embedder: &dyn SentenceEmbedder,
    config: &ModelConfig,
) -> ModerationResult<EmbeddingMatrix> {
    let mut matrix = EmbeddingMatrix::zeros(config.max_seq_len, config.embed_dim);

    let kept = &sentences[..sentences.len().min(config.max_seq_len)];
    if kept.is_empty() {
        return Ok(matrix);
    }

    let vectors = embedder.embed(kept)?;
    if vectors.len() != kept.len() {
        return Err(ModerationError::ModelOutput(format!(
            "embedder returned {} vectors for {} sentences",
            vectors.len(),
            kept.len()
        )));
    }

    for (i, vector) in vectors.iter().enumerate() {
        if vector.len() != config.embed_dim {
            return Err(ModerationError::ModelOutput(format!(
                "embedding {} has dimension {}, expected {}",
                i,
                vector.len(),
                config.embed_dim
            )));
        }
        if let Some(row) = matrix.row_mut(i) {
            row.copy_from_slice(vector);
        }
    }

    Ok(matrix)
}
