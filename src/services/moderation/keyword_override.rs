// Keyword override
// Deterministic allow-rule on domain vocabulary, independent of any model.

/// Domain vocabulary. Each entry counts at most once, phrases included.
pub const MENTAL_HEALTH_KEYWORDS: &[&str] = &[
    "anxiety",
    "depression",
    "therapy",
    "panic",
    "fear",
    "healing",
    "resilience",
    "mental health",
    "journaling",
    "meditation",
    "mindfulness",
    "postpartum depression",
    "atypical depression",
    "major depressive disorder",
    "panic disorder",
    "separation anxiety disorder",
    "disorder",
    "heal",
    "ocd",
    "symmetry ocd",
    "checking ocd",
    "self care",
    "trauma",
    "developmental trauma",
    "acute stress",
    "episodic acute stress",
    "chronic stress",
    "generalized anxiety disorder",
];

pub const DEFAULT_MIN_MATCHES: usize = 2;

/// Number of vocabulary entries found as substrings of the lowercased text.
pub fn keyword_matches(raw: &str) -> usize {
    let text = raw.to_lowercase();
    MENTAL_HEALTH_KEYWORDS
        .iter()
        .filter(|kw| text.contains(*kw))
        .count()
}

pub fn keyword_override(raw: &str, min_matches: usize) -> bool {
    keyword_matches(raw) >= min_matches
}
