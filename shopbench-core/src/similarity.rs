//! Text similarity oracle used for title matching

use std::collections::HashSet;

/// Scalar similarity between two texts, in `[0, 1]`
pub trait TextSimilarity: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

impl<F> TextSimilarity for F
where
    F: Fn(&str, &str) -> f64 + Send + Sync,
{
    fn similarity(&self, a: &str, b: &str) -> f64 {
        self(a, b)
    }
}

/// Case-folded word-overlap (Jaccard) similarity
///
/// A lexical stand-in for an embedding model; useful offline and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalSimilarity;

impl LexicalSimilarity {
    fn words(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect()
    }
}

impl TextSimilarity for LexicalSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let a_words = Self::words(a);
        let b_words = Self::words(b);

        if a_words.is_empty() && b_words.is_empty() {
            return 1.0;
        }

        let intersection = a_words.intersection(&b_words).count();
        let union = a_words.union(&b_words).count();

        if union == 0 { 0.0 } else { intersection as f64 / union as f64 }
    }
}
