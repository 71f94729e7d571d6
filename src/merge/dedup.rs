//! Whole-text duplicate removal
//!
//! After boundary merging, some models still leave long repeats far apart
//! (a paragraph re-emitted mid-transcript). A position index of n-grams
//! over the merged text yields candidate repeat locations; windows that
//! score as near-identical get the later copy removed.

use tracing::debug;

use crate::config::DuplicateRemovalConfig;
use crate::text::{ngram_similarity, optimal_ngram_size, NGramIndex};

/// Remove near-duplicate windows from the merged text.
pub fn remove_duplicates(text: &str, config: &DuplicateRemovalConfig) -> String {
    if !config.enabled {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();
    let window = config.min_duplicate_length;
    if chars.len() < window * 2 {
        return text.to_string();
    }

    let n = optimal_ngram_size(chars.len());
    let index = NGramIndex::build(&chars, n);

    // (start, end) char ranges to delete, later copies only.
    let mut removals: Vec<(usize, usize)> = Vec::new();
    let mut i = window;

    while i + window <= chars.len() {
        if inside_removal(&removals, i) {
            i += 1;
            continue;
        }

        let here = &chars[i..i + window];
        let mut matched_len = 0;

        for &candidate in index.candidate_positions(&chars, i) {
            // Only earlier positions within the search window, outside the
            // self-region.
            if candidate >= i || i - candidate < window || i - candidate > config.search_window {
                continue;
            }
            if inside_removal(&removals, candidate) {
                continue;
            }
            let there = &chars[candidate..candidate + window];
            if ngram_similarity(here, there, n) >= config.duplicate_similarity_threshold {
                // Extend the match while the texts keep agreeing.
                let mut len = window;
                while i + len < chars.len()
                    && candidate + len < i
                    && chars[candidate + len] == chars[i + len]
                {
                    len += 1;
                }
                matched_len = matched_len.max(len);
            }
        }

        if matched_len > 0 {
            debug!("Removing {} duplicated chars at position {}", matched_len, i);
            removals.push((i, i + matched_len));
            i += matched_len;
        } else {
            i += 1;
        }
    }

    if removals.is_empty() {
        return text.to_string();
    }

    let mut out: Vec<char> = chars;
    for &(start, end) in removals.iter().rev() {
        out.drain(start..end);
    }
    out.into_iter().collect()
}

fn inside_removal(removals: &[(usize, usize)], position: usize) -> bool {
    removals
        .iter()
        .any(|&(start, end)| position >= start && position < end)
}
