//! Character n-gram similarity
//!
//! Similarity between candidate overlap windows is measured on character
//! n-grams of the normalized streams. Grams are hashed instead of allocated
//! so the sliding-window search in the merger stays cheap.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use super::normalize::normalize;

/// Pick an n-gram size for a text of `len` normalized characters.
///
/// Short windows need small grams to produce enough samples; long texts get
/// larger grams for better discrimination.
pub fn optimal_ngram_size(len: usize) -> usize {
    if len < 50 {
        3
    } else {
        5
    }
}

fn hash_gram(gram: &[char]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for c in gram {
        c.hash(&mut hasher);
    }
    hasher.finish()
}

fn gram_counts(chars: &[char], n: usize) -> HashMap<u64, usize> {
    let mut counts = HashMap::new();
    if chars.len() >= n {
        for gram in chars.windows(n) {
            *counts.entry(hash_gram(gram)).or_insert(0) += 1;
        }
    }
    counts
}

/// Multiset n-gram similarity in [0, 1] over the smaller gram count.
///
/// Returns 0.0 when either input is shorter than `n`; identical inputs
/// return 1.0.
pub fn ngram_similarity(a: &[char], b: &[char], n: usize) -> f64 {
    if a.len() < n || b.len() < n {
        return 0.0;
    }

    let counts_a = gram_counts(a, n);
    let counts_b = gram_counts(b, n);

    let total_a: usize = counts_a.values().sum();
    let total_b: usize = counts_b.values().sum();
    let smaller = total_a.min(total_b);
    if smaller == 0 {
        return 0.0;
    }

    let mut shared = 0usize;
    for (gram, count_a) in &counts_a {
        if let Some(count_b) = counts_b.get(gram) {
            shared += (*count_a).min(*count_b);
        }
    }

    shared as f64 / smaller as f64
}

/// Similarity of two raw strings after full normalization, with the gram
/// size chosen from the shorter input.
pub fn normalized_similarity(a: &str, b: &str) -> f64 {
    let norm_a: Vec<char> = normalize(a).chars().collect();
    let norm_b: Vec<char> = normalize(b).chars().collect();
    let n = optimal_ngram_size(norm_a.len().min(norm_b.len()));
    ngram_similarity(&norm_a, &norm_b, n)
}

/// Position index of n-grams over a character sequence.
///
/// Used by whole-text duplicate removal to find candidate repeat positions
/// without rescanning the full text for every window.
pub struct NGramIndex {
    n: usize,
    positions: HashMap<u64, Vec<usize>>,
}

impl NGramIndex {
    pub fn build(chars: &[char], n: usize) -> Self {
        let mut positions: HashMap<u64, Vec<usize>> = HashMap::new();
        if chars.len() >= n {
            for (i, gram) in chars.windows(n).enumerate() {
                positions.entry(hash_gram(gram)).or_default().push(i);
            }
        }
        Self { n, positions }
    }

    pub fn gram_size(&self) -> usize {
        self.n
    }

    /// Positions at which the n-gram starting at `chars[at..at+n]` also
    /// occurs. Includes `at` itself; callers filter the self-region.
    pub fn candidate_positions(&self, chars: &[char], at: usize) -> &[usize] {
        if at + self.n > chars.len() {
            return &[];
        }
        self.positions
            .get(&hash_gram(&chars[at..at + self.n]))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
