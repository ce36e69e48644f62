// Test-time augmentation voting
// Re-scores seeded synonym perturbations of the document and counts agreement.
//
// Every variant draws from its own ChaCha8 generator seeded with `seed + index`,
// so the tally depends only on the content, the models and the seed, never on
// thread scheduling or ambient RNG state.

use std::collections::BTreeSet;
use std::thread;

use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::models::VoteTally;
use crate::services::text_processor::preprocess;

use super::backends::{LoadedModels, SynonymLexicon};
use super::error::{ModerationError, ModerationResult};
use super::scoring::confidence_score;

pub const DEFAULT_VARIANTS: usize = 7;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_WORDS_PER_SENTENCE: usize = 2;
pub const DEFAULT_VOTE_THRESHOLD: f64 = 0.65;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentationParams {
    pub variants: usize,
    pub seed: u64,
    pub words_per_sentence: usize,
    pub threshold: f64,
    pub parallel: bool,
}

impl Default for AugmentationParams {
    fn default() -> Self {
        Self {
            variants: DEFAULT_VARIANTS,
            seed: DEFAULT_SEED,
            words_per_sentence: DEFAULT_WORDS_PER_SENTENCE,
            threshold: DEFAULT_VOTE_THRESHOLD,
            parallel: false,
        }
    }
}

/// Distinct replacement lemmas for `word`, sorted, with `_` turned into spaces.
pub fn synonym_candidates(word: &str, lexicon: &dyn SynonymLexicon) -> Vec<String> {
    lexicon
        .lemmas(word)
        .into_iter()
        .filter(|lemma| lemma != word)
        .map(|lemma| lemma.replace('_', " "))
        .filter(|lemma| lemma != word && !lemma.trim().is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Replace up to `max_words` randomly picked words of `sentence` with synonyms.
pub fn augment_sentence<R: Rng + ?Sized>(
    sentence: &str,
    lexicon: &dyn SynonymLexicon,
    rng: &mut R,
    max_words: usize,
) -> String {
    let mut words: Vec<String> = sentence.split_whitespace().map(str::to_string).collect();
    if words.is_empty() {
        return String::new();
    }

    let amount = max_words.min(words.len());
    for pos in index::sample(rng, words.len(), amount).into_iter() {
        let candidates = synonym_candidates(&words[pos], lexicon);
        if let Some(choice) = candidates.choose(rng) {
            words[pos] = choice.clone();
        }
    }

    words.join(" ")
}

/// Build the perturbed document for one variant seed.
pub fn augment_document(
    sentences: &[String],
    lexicon: &dyn SynonymLexicon,
    seed: u64,
    max_words: usize,
) -> String {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    sentences
        .iter()
        .map(|s| augment_sentence(s, lexicon, &mut rng, max_words))
        .collect::<Vec<_>>()
        .join(" ")
}

fn score_variant(
    index: usize,
    sentences: &[String],
    models: &LoadedModels,
    params: &AugmentationParams,
) -> ModerationResult<bool> {
    let seed = params.seed.wrapping_add(index as u64);
    let document = augment_document(sentences, models.lexicon.as_ref(), seed, params.words_per_sentence);
    let confidence = confidence_score(
        &document,
        models.embedder.as_ref(),
        models.classifier.as_ref(),
        &models.config,
    )?;
    debug!(variant = index, seed, confidence, "tta.variant_scored");
    Ok(confidence >= params.threshold)
}

/// Score `params.variants` perturbations of `raw` and tally those above threshold.
///
/// Any scoring failure aborts the whole vote.
pub fn tta_vote(raw: &str, models: &LoadedModels, params: &AugmentationParams) -> ModerationResult<VoteTally> {
    let sentences = preprocess(raw);

    let outcomes: Vec<ModerationResult<bool>> = if params.parallel && params.variants > 1 {
        let sentences = &sentences;
        thread::scope(|scope| {
            let handles: Vec<_> = (0..params.variants)
                .map(|i| scope.spawn(move || score_variant(i, sentences, models, params)))
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        Err(ModerationError::Worker("augmentation thread panicked".to_string()))
                    })
                })
                .collect()
        })
    } else {
        (0..params.variants)
            .map(|i| score_variant(i, &sentences, models, params))
            .collect()
    };

    let mut votes = 0;
    for outcome in outcomes {
        if outcome? {
            votes += 1;
        }
    }

    Ok(VoteTally {
        votes,
        variants: params.variants,
    })
}
