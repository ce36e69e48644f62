// MindGate Data Models
// Shapes exchanged between the moderation stages and with callers

use serde::{Deserialize, Serialize};

pub const NOTE_ALLOWED_BY_ENSEMBLE: &str = "Allowed by ensemble";
pub const NOTE_ALLOWED_BY_OVERRIDE: &str = "Allowed by override";
pub const NOTE_BLOCKED: &str = "Blocking — insufficient signal";

// ============ Model Configuration ============

/// Shape constants published alongside the trained classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(rename = "MAX_SEQ_LEN")]
    pub max_seq_len: usize,
    #[serde(rename = "EMBED_DIM")]
    pub embed_dim: usize,
}

// ============ Embedding Matrix ============

/// Row-major `[1, rows, dim]` tensor fed to the classifier.
///
/// `rows` always equals the model's `MAX_SEQ_LEN`; unused rows are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    rows: usize,
    dim: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn zeros(rows: usize, dim: usize) -> Self {
        Self {
            rows,
            dim,
            data: vec![0.0; rows * dim],
        }
    }

    /// `[batch, rows, dim]`; batch is always 1.
    pub fn shape(&self) -> [usize; 3] {
        [1, self.rows, self.dim]
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.dim;
        Some(&self.data[start..start + self.dim])
    }

    pub(crate) fn row_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.dim;
        Some(&mut self.data[start..start + self.dim])
    }

    /// Nested form used on the wire: `[[[f32; dim]; rows]; 1]`.
    pub fn to_batch(&self) -> Vec<Vec<Vec<f32>>> {
        let rows = self
            .data
            .chunks(self.dim.max(1))
            .take(self.rows)
            .map(|r| r.to_vec())
            .collect();
        vec![rows]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

// ============ Vote Tally ============

/// Outcome of re-scoring the augmented variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub votes: usize,
    pub variants: usize,
}

impl VoteTally {
    /// Strict majority: more than half of the variants agreed.
    pub fn passes(&self) -> bool {
        self.variants > 0 && self.votes >= self.variants / 2 + 1
    }
}

// ============ Decision Record ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub valid: bool,
    pub confidence_score: f64,
    pub confidence_pass: bool,
    pub tta_pass: bool,
    pub override_pass: bool,
    pub votes: u8,
    pub note: String,
}

impl DecisionRecord {
    /// Combine the three independent signals into one record.
    pub fn from_signals(
        confidence: f64,
        confidence_pass: bool,
        tta_pass: bool,
        override_pass: bool,
    ) -> Self {
        let votes = [confidence_pass, tta_pass, override_pass]
            .iter()
            .filter(|&&b| b)
            .count() as u8;

        let note = if votes >= 2 {
            NOTE_ALLOWED_BY_ENSEMBLE
        } else if override_pass {
            NOTE_ALLOWED_BY_OVERRIDE
        } else {
            NOTE_BLOCKED
        };

        Self {
            valid: votes >= 1,
            confidence_score: round_to(confidence, 3),
            confidence_pass,
            tta_pass,
            override_pass,
            votes,
            note: note.to_string(),
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
