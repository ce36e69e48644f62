// Ensemble decision engine
// Confidence gate + augmentation vote + keyword override, memoized per content.

use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::models::DecisionRecord;

use super::augmentation::{tta_vote, AugmentationParams};
use super::backends::{LoadedModels, ModelLoader};
use super::cache::{fingerprint, DecisionCache, DEFAULT_MAX_ENTRIES};
use super::error::{ModerationError, ModerationResult};
use super::keyword_override::{keyword_override, DEFAULT_MIN_MATCHES};
use super::scoring::confidence_score;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.75;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub confidence_threshold: f64,
    pub augmentation: AugmentationParams,
    pub override_min_matches: usize,
    pub cache_max_entries: u64,
    pub cache_ttl: Option<Duration>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            augmentation: AugmentationParams::default(),
            override_min_matches: DEFAULT_MIN_MATCHES,
            cache_max_entries: DEFAULT_MAX_ENTRIES,
            cache_ttl: None,
        }
    }
}

/// Process-wide moderation service.
///
/// Build one at startup and share it (`Arc<ModerationEngine>`) with request
/// handlers. Models load at most once: lazily on the first decision, or
/// eagerly through [`ModerationEngine::warm_up`].
pub struct ModerationEngine {
    loader: Box<dyn ModelLoader>,
    models: OnceCell<LoadedModels>,
    cache: DecisionCache,
    settings: EngineSettings,
}

impl ModerationEngine {
    pub fn new(loader: impl ModelLoader + 'static, settings: EngineSettings) -> Self {
        let cache = DecisionCache::new(settings.cache_max_entries, settings.cache_ttl);
        Self {
            loader: Box::new(loader),
            models: OnceCell::new(),
            cache,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Load models now instead of on the first request.
    pub fn warm_up(&self) -> ModerationResult<()> {
        self.models().map(|_| ())
    }

    pub fn models_loaded(&self) -> bool {
        self.models.get().is_some()
    }

    fn models(&self) -> ModerationResult<&LoadedModels> {
        // Concurrent first callers block here until one load finishes; a failed
        // load leaves the cell empty so the next call retries.
        self.models.get_or_try_init(|| {
            let t0 = Instant::now();
            info!("moderation.models_loading");
            let models = self.loader.load()?;
            if models.config.max_seq_len == 0 || models.config.embed_dim == 0 {
                return Err(ModerationError::Config(format!(
                    "MAX_SEQ_LEN and EMBED_DIM must be positive, got {} and {}",
                    models.config.max_seq_len, models.config.embed_dim
                )));
            }
            info!(
                max_seq_len = models.config.max_seq_len,
                embed_dim = models.config.embed_dim,
                load_ms = t0.elapsed().as_millis(),
                "moderation.models_loaded"
            );
            Ok(models)
        })
    }

    /// Decide whether `content` carries enough mental-health signal to publish.
    ///
    /// Errors are operational failures, never a rejection; they are not cached.
    pub fn decide(&self, content: &str) -> ModerationResult<DecisionRecord> {
        let key = fingerprint(content);
        if let Some(record) = self.cache.get(&key) {
            debug!(fingerprint = &key[..12], "moderation.cache_hit");
            return Ok(record);
        }

        let models = self.models()?;
        let t0 = Instant::now();

        let confidence = confidence_score(
            content,
            models.embedder.as_ref(),
            models.classifier.as_ref(),
            &models.config,
        )?;
        let confidence_pass = confidence >= self.settings.confidence_threshold;
        let tally = tta_vote(content, models, &self.settings.augmentation)?;
        let override_pass = keyword_override(content, self.settings.override_min_matches);

        let record = DecisionRecord::from_signals(confidence, confidence_pass, tally.passes(), override_pass);
        self.cache.insert(key.clone(), record.clone());

        info!(
            fingerprint = &key[..12],
            confidence = record.confidence_score,
            confidence_pass,
            tta_votes = tally.votes,
            tta_pass = record.tta_pass,
            override_pass,
            votes = record.votes,
            valid = record.valid,
            elapsed_ms = t0.elapsed().as_millis(),
            "moderation.decided"
        );

        Ok(record)
    }

    /// [`decide`](Self::decide) on the blocking pool, for async request handlers.
    pub async fn decide_async(self: Arc<Self>, content: String) -> ModerationResult<DecisionRecord> {
        tokio::task::spawn_blocking(move || self.decide(&content))
            .await
            .map_err(|e| ModerationError::Worker(e.to_string()))?
    }

    pub fn cached_decisions(&self) -> u64 {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmbeddingMatrix, ModelConfig, NOTE_ALLOWED_BY_ENSEMBLE, NOTE_ALLOWED_BY_OVERRIDE, NOTE_BLOCKED};
    use crate::services::moderation::backends::{
        BinaryClassifier, EmptyLexicon, SentenceEmbedder, SynonymLexicon,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        loads: AtomicUsize,
        embeds: AtomicUsize,
        predictions: AtomicUsize,
    }

    struct LengthEmbedder {
        counters: Arc<Counters>,
    }

    impl SentenceEmbedder for LengthEmbedder {
        fn embed(&self, sentences: &[String]) -> ModerationResult<Vec<Vec<f32>>> {
            self.counters.embeds.fetch_add(1, Ordering::SeqCst);
            Ok(sentences.iter().map(|s| vec![s.len() as f32, 1.0]).collect())
        }
    }

    /// Fixed probability; fails on the listed call numbers.
    struct ScriptedClassifier {
        prob: f32,
        fail_on: Vec<usize>,
        counters: Arc<Counters>,
    }

    impl BinaryClassifier for ScriptedClassifier {
        fn predict(&self, matrix: &EmbeddingMatrix) -> ModerationResult<Vec<Vec<f32>>> {
            assert_eq!(matrix.shape(), [1, 4, 2]);
            let call = self.counters.predictions.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.contains(&call) {
                return Err(ModerationError::ModelInvocation("inference backend unavailable".to_string()));
            }
            Ok(vec![vec![1.0 - self.prob, self.prob]])
        }
    }

    struct FakeLoader {
        prob: f32,
        fail_first_load: bool,
        fail_predictions: Vec<usize>,
        config: ModelConfig,
        load_delay: Duration,
        counters: Arc<Counters>,
    }

    impl FakeLoader {
        fn new(prob: f32) -> Self {
            Self {
                prob,
                fail_first_load: false,
                fail_predictions: Vec::new(),
                config: ModelConfig {
                    max_seq_len: 4,
                    embed_dim: 2,
                },
                load_delay: Duration::ZERO,
                counters: Arc::new(Counters::default()),
            }
        }
    }

    impl ModelLoader for FakeLoader {
        fn load(&self) -> ModerationResult<LoadedModels> {
            std::thread::sleep(self.load_delay);
            let n = self.counters.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_first_load && n == 0 {
                return Err(ModerationError::ModelInvocation("weights unavailable".to_string()));
            }
            let lexicon: Box<dyn SynonymLexicon> = Box::new(EmptyLexicon);
            Ok(LoadedModels {
                embedder: Box::new(LengthEmbedder {
                    counters: self.counters.clone(),
                }),
                classifier: Box::new(ScriptedClassifier {
                    prob: self.prob,
                    fail_on: self.fail_predictions.clone(),
                    counters: self.counters.clone(),
                }),
                lexicon,
                config: self.config,
            })
        }
    }

    fn engine(loader: FakeLoader) -> (ModerationEngine, Arc<Counters>) {
        let counters = loader.counters.clone();
        (ModerationEngine::new(loader, EngineSettings::default()), counters)
    }

    const NEUTRAL: &str = "<p>The garden was quiet this morning.</p><p>We planted tomatoes.</p>";

    #[test]
    fn test_keywords_allow_regardless_of_classifier() {
        let (engine, _) = engine(FakeLoader::new(0.05));
        let record = engine
            .decide("<p>My anxiety and depression shaped my twenties.</p>")
            .unwrap();
        assert!(record.override_pass);
        assert!(!record.confidence_pass);
        assert!(!record.tta_pass);
        assert_eq!(record.votes, 1);
        assert!(record.valid);
        assert_eq!(record.note, NOTE_ALLOWED_BY_OVERRIDE);
    }

    #[test]
    fn test_insufficient_signal_blocks() {
        let (engine, _) = engine(FakeLoader::new(0.40));
        let record = engine.decide(NEUTRAL).unwrap();
        assert!(!record.confidence_pass);
        assert!(!record.tta_pass);
        assert!(!record.override_pass);
        assert_eq!(record.votes, 0);
        assert!(!record.valid);
        assert_eq!(record.note, NOTE_BLOCKED);
        assert_eq!(record.confidence_score, 0.4);
    }

    #[test]
    fn test_confident_and_stable_is_ensemble_allow() {
        let (engine, _) = engine(FakeLoader::new(0.80));
        let record = engine.decide(NEUTRAL).unwrap();
        assert!(record.confidence_pass);
        assert!(record.tta_pass);
        assert!(!record.override_pass);
        assert_eq!(record.votes, 2);
        assert!(record.valid);
        assert_eq!(record.note, NOTE_ALLOWED_BY_ENSEMBLE);
        assert_eq!(record.confidence_score, 0.8);
    }

    #[test]
    fn test_empty_content_completes() {
        let (engine, counters) = engine(FakeLoader::new(0.30));
        let record = engine.decide("").unwrap();
        assert_eq!(record.votes, 0);
        assert!(!record.valid);
        assert_eq!(record.confidence_score, 0.3);
        // Nothing to embed; the classifier still sees the zero matrix.
        assert_eq!(counters.embeds.load(Ordering::SeqCst), 0);
        assert_eq!(counters.predictions.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_second_call_is_served_from_cache() {
        let (engine, counters) = engine(FakeLoader::new(0.80));
        let first = engine.decide(NEUTRAL).unwrap();
        let calls = counters.predictions.load(Ordering::SeqCst);
        assert_eq!(calls, 1 + 7);

        let second = engine.decide(NEUTRAL).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(counters.predictions.load(Ordering::SeqCst), calls);
        assert_eq!(engine.cached_decisions(), 1);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let mut loader = FakeLoader::new(0.80);
        loader.fail_predictions = vec![3];
        let (engine, _) = engine(loader);

        let err = engine.decide(NEUTRAL).unwrap_err();
        assert!(matches!(err, ModerationError::ModelInvocation(_)));
        assert_eq!(engine.cached_decisions(), 0);

        let record = engine.decide(NEUTRAL).unwrap();
        assert!(record.valid);
        assert_eq!(engine.cached_decisions(), 1);
    }

    #[test]
    fn test_failed_load_is_retried() {
        let mut loader = FakeLoader::new(0.80);
        loader.fail_first_load = true;
        let (engine, counters) = engine(loader);

        assert!(engine.warm_up().is_err());
        assert!(!engine.models_loaded());
        assert!(engine.decide(NEUTRAL).is_ok());
        assert!(engine.models_loaded());
        assert_eq!(counters.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalid_model_config_is_config_error() {
        let mut loader = FakeLoader::new(0.80);
        loader.config = ModelConfig {
            max_seq_len: 0,
            embed_dim: 2,
        };
        let (engine, _) = engine(loader);
        assert!(matches!(engine.decide(NEUTRAL), Err(ModerationError::Config(_))));
    }

    #[test]
    fn test_models_load_once_under_concurrent_first_calls() {
        let mut loader = FakeLoader::new(0.80);
        loader.load_delay = Duration::from_millis(50);
        let (engine, counters) = engine(loader);
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = engine.clone();
                std::thread::spawn(move || engine.decide(&format!("Submission number {}.", i)))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }

        assert_eq!(counters.loads.load(Ordering::SeqCst), 1);
        assert_eq!(engine.cached_decisions(), 8);
    }

    #[test]
    fn test_warm_up_loads_eagerly() {
        let (engine, counters) = engine(FakeLoader::new(0.5));
        engine.warm_up().unwrap();
        engine.warm_up().unwrap();
        assert_eq!(counters.loads.load(Ordering::SeqCst), 1);
        assert_eq!(counters.predictions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clear_cache_forces_recompute() {
        let (engine, counters) = engine(FakeLoader::new(0.80));
        engine.decide(NEUTRAL).unwrap();
        engine.clear_cache();
        engine.decide(NEUTRAL).unwrap();
        assert_eq!(counters.predictions.load(Ordering::SeqCst), 16);
    }

    #[tokio::test]
    async fn test_decide_async() {
        let (engine, _) = engine(FakeLoader::new(0.80));
        let engine = Arc::new(engine);
        let record = engine.clone().decide_async(NEUTRAL.to_string()).await.unwrap();
        assert_eq!(record.votes, 2);
        let again = engine.decide(NEUTRAL).unwrap();
        assert_eq!(record, again);
    }
}
