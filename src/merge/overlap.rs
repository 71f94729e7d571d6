//! Boundary overlap removal
//!
//! Chunk overlap deliberately duplicates audio at every boundary, so the
//! text of consecutive chunks shares a run that must be removed exactly
//! once. Models rarely transcribe the shared audio identically, so the
//! search is layered: exact substring match first, then the same match on
//! normalized streams, then shorter soft-threshold retries, and finally an
//! n-gram sliding window for overlaps that only survive fuzzily.

use tracing::debug;

use crate::config::MergingConfig;
use crate::text::{
    constrained_common_substring, ngram_similarity, optimal_ngram_size, LcsConstraints,
    NormalizedText,
};

/// Floor for the tail/head search windows, characters.
const MIN_WINDOW: usize = 500;

/// Hard floor for exact-match length in the primary layers.
const EXACT_MATCH_FLOOR: usize = 20;

/// Softer floor used by the retry layer for prompt-faithful short overlaps.
const SOFT_MATCH_FLOOR: usize = 8;

/// Outcome of overlap removal between the accumulated text and one chunk.
#[derive(Debug)]
pub struct OverlapOutcome {
    /// Current chunk text with the duplicated prefix removed.
    pub text: String,
    /// Whether any layer found an overlap.
    pub matched: bool,
    /// Connector to insert between the accumulated text and `text`.
    pub connector: &'static str,
}

/// Remove the duplicated overlap prefix of `current` against the tail of
/// `accumulated`. The exact layers always run (models duplicate content
/// across clean cuts too); the fuzzy layers require `declared_overlap`,
/// the chunk-time overlap in seconds, to be present.
pub fn remove_overlap(
    accumulated: &str,
    current: &str,
    declared_overlap: f64,
    config: &MergingConfig,
) -> OverlapOutcome {
    let detection = &config.overlap_detection;

    let tail_window_chars = MIN_WINDOW.max(detection.max_overlap_length);
    let head_window_chars = MIN_WINDOW.max(detection.search_range_in_next);

    let tail: Vec<char> = tail_chars(accumulated, tail_window_chars);
    let head: Vec<char> = current.chars().take(head_window_chars).collect();

    if tail.is_empty() || head.is_empty() {
        return no_match(accumulated, current);
    }

    // Layer 1: exact longest common substring inside the windows.
    let exact_min = EXACT_MATCH_FLOOR.max(config.min_match_length);
    if let Some(outcome) = exact_layer(accumulated, current, &tail, head_window_chars, exact_min, false) {
        return outcome;
    }

    // Layer 2: the same match on normalized streams.
    if let Some(outcome) =
        normalized_layer(accumulated, current, tail_window_chars, head_window_chars, exact_min, false)
    {
        return outcome;
    }

    // The fuzzy layers only run when the chunks overlapped in time:
    // without declared overlap, a short or similar-but-not-identical
    // tail/head match is far more likely to be coincidence (templated
    // sentences) than duplication.
    if declared_overlap > 0.0 {
        // Layer 3: soft-threshold retries with stricter positional bounds,
        // for short prompt-faithful overlaps.
        let soft_min = SOFT_MATCH_FLOOR.max(config.min_match_length.min(EXACT_MATCH_FLOOR));
        if soft_min < exact_min {
            if let Some(outcome) =
                exact_layer(accumulated, current, &tail, head_window_chars, soft_min, true)
            {
                return outcome;
            }
            if let Some(outcome) = normalized_layer(
                accumulated,
                current,
                tail_window_chars,
                head_window_chars,
                soft_min,
                true,
            ) {
                return outcome;
            }
        }

        // Layer 4: n-gram sliding window over candidate overlap lengths.
        if let Some(outcome) = ngram_layer(accumulated, current, config) {
            return outcome;
        }

        debug!(
            "No textual overlap found despite {:.1}s declared chunk overlap",
            declared_overlap
        );
    }

    no_match(accumulated, current)
}

fn tail_chars(text: &str, n: usize) -> Vec<char> {
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].to_vec()
}

fn no_match(_accumulated: &str, current: &str) -> OverlapOutcome {
    OverlapOutcome {
        text: current.trim_start().to_string(),
        matched: false,
        connector: "",
    }
}

/// Positional bounds for a window of `tail_len` previous chars and the
/// current head. Strict mode tightens both for the soft retry layer.
fn constraints(tail_len: usize, head_len: usize, min_len: usize, strict: bool) -> LcsConstraints {
    let max_leading_gap = if strict {
        20
    } else {
        60usize.max(head_len / 4)
    };
    let max_trailing_gap = if strict {
        100
    } else {
        200usize.max((tail_len as f64 * 0.8) as usize)
    };
    LcsConstraints {
        min_len,
        max_leading_gap_b: max_leading_gap,
        min_end_a: tail_len.saturating_sub(max_trailing_gap),
    }
}

fn exact_layer(
    accumulated: &str,
    current: &str,
    tail: &[char],
    head_window_chars: usize,
    min_len: usize,
    strict: bool,
) -> Option<OverlapOutcome> {
    let head: Vec<char> = current.chars().take(head_window_chars).collect();
    let bounds = constraints(tail.len(), head.len(), min_len, strict);

    let matched = constrained_common_substring(tail, &head, bounds)?;
    let mut cut = char_to_byte(current, matched.end_b());

    // One residual retry catches a second copy of the overlap directly
    // after the first.
    let remainder = &current[cut..];
    let remainder_head: Vec<char> = remainder.chars().take(head_window_chars).collect();
    if let Some(second) = constrained_common_substring(tail, &remainder_head, bounds) {
        cut += char_to_byte(remainder, second.end_b());
    }

    debug!(
        "Exact overlap match: {} chars trimmed (strict={})",
        matched.len, strict
    );
    Some(finish(accumulated, current, cut))
}

fn normalized_layer(
    accumulated: &str,
    current: &str,
    tail_window_chars: usize,
    head_window_chars: usize,
    min_len: usize,
    strict: bool,
) -> Option<OverlapOutcome> {
    // Normalize the raw windows; positions map back through the index maps.
    let tail_start = {
        let chars: Vec<char> = accumulated.chars().collect();
        let from = chars.len().saturating_sub(tail_window_chars);
        chars[..from].iter().map(|c| c.len_utf8()).sum::<usize>()
    };
    let tail_raw = &accumulated[tail_start..];
    let head_end = char_to_byte(current, head_window_chars.min(current.chars().count()));
    let head_raw = &current[..head_end];

    let tail_norm = NormalizedText::new(tail_raw);
    let head_norm = NormalizedText::new(head_raw);
    if tail_norm.is_empty() || head_norm.is_empty() {
        return None;
    }

    let bounds = constraints(tail_norm.len(), head_norm.len(), min_len, strict);
    let matched = constrained_common_substring(&tail_norm.chars, &head_norm.chars, bounds)?;

    // Trim past the original character behind the last matched normalized
    // char; `finish` then advances over any skippable punctuation the
    // normalization dropped.
    let cut = head_norm.original_end_offset(matched.end_b() - 1, head_raw);

    debug!(
        "Normalized overlap match: {} normalized chars trimmed (strict={})",
        matched.len, strict
    );
    Some(finish(accumulated, current, cut))
}

fn ngram_layer(accumulated: &str, current: &str, config: &MergingConfig) -> Option<OverlapOutcome> {
    let detection = &config.overlap_detection;
    let accumulated_chars: Vec<char> = accumulated.chars().collect();
    let current_chars: Vec<char> = current.chars().collect();

    let search_range = detection.search_range_in_next.min(current_chars.len());
    let mut candidate_len = detection.max_overlap_length.min(accumulated_chars.len());

    while candidate_len >= detection.min_overlap_length.max(1) {
        let candidate = &accumulated_chars[accumulated_chars.len() - candidate_len..];
        let n = optimal_ngram_size(candidate_len);

        if search_range >= candidate_len {
            let skip = ((candidate_len as f64 * detection.match_skip_ratio) as usize).max(1);
            let mut last_match: Option<usize> = None;
            let mut position = 0;

            while position + candidate_len <= search_range {
                let window = &current_chars[position..position + candidate_len];
                let similarity = ngram_similarity(candidate, window, n);
                if similarity >= detection.similarity_threshold {
                    last_match = Some(position);
                    // Jump ahead to find any further copies of the overlap.
                    position += skip;
                } else {
                    position += 1;
                }
            }

            if let Some(match_start) = last_match {
                let cut = char_to_byte(current, match_start + candidate_len);
                debug!(
                    "N-gram overlap match: {} chars at offset {} trimmed",
                    candidate_len, match_start
                );
                return Some(finish(accumulated, current, cut));
            }
        }

        if candidate_len < detection.min_overlap_length + detection.candidate_step_size {
            break;
        }
        candidate_len -= detection.candidate_step_size;
    }

    None
}

fn finish(accumulated: &str, current: &str, mut cut: usize) -> OverlapOutcome {
    let had_leading_whitespace = current[cut..]
        .chars()
        .next()
        .map(|c| c.is_whitespace())
        .unwrap_or(false);
    // Orphaned punctuation behind the removed overlap belongs to the
    // duplicated sentence, not the continuation.
    cut += skippable_prefix_len(&current[cut..]);
    let trimmed = current[cut..].trim_start().to_string();

    OverlapOutcome {
        connector: choose_connector(accumulated, &trimmed, had_leading_whitespace),
        text: trimmed,
        matched: true,
    }
}

/// Connector between the accumulated text and the trimmed remainder: a
/// single space only when joining two ASCII words where the model emitted
/// whitespace, nothing otherwise (CJK text joins directly).
fn choose_connector(accumulated: &str, trimmed: &str, had_leading_whitespace: bool) -> &'static str {
    let prev_last = accumulated.chars().last();
    let next_first = trimmed.chars().next();

    match (prev_last, next_first) {
        (Some(prev), Some(next)) => {
            if prev.is_whitespace() || !had_leading_whitespace {
                ""
            } else if prev.is_ascii_alphanumeric() && next.is_ascii_alphanumeric() {
                " "
            } else {
                ""
            }
        }
        _ => "",
    }
}

fn char_to_byte(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len())
}

fn skippable_prefix_len(text: &str) -> usize {
    let mut len = 0;
    for c in text.chars() {
        if crate::text::is_skippable_char(c) {
            len += c.len_utf8();
        } else {
            break;
        }
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelConfig, ModelId};

    fn config() -> &'static MergingConfig {
        &ModelConfig::for_model(ModelId::Whisper).merging
    }

    #[test]
    fn test_exact_overlap_removed() {
        let previous = "これはテストです。今日はとても良い天気で晴れです。";
        let current = "今日はとても良い天気で晴れです。明日は雨です。";
        let outcome = remove_overlap(previous, current, 3.0, config());

        assert!(outcome.matched);
        assert_eq!(outcome.text, "明日は雨です。");
        assert_eq!(outcome.connector, "");
    }

    #[test]
    fn test_perfect_overlap_length_arithmetic() {
        let previous: String = "あ".repeat(100) + &"同じ内容が続いている部分です。".repeat(2);
        let overlap = "同じ内容が続いている部分です。同じ内容が続いている部分です。";
        let current = format!("{overlap}そして新しい内容が始まります。");
        let outcome = remove_overlap(&previous, &current, 5.0, config());

        assert!(outcome.matched);
        assert_eq!(outcome.text, "そして新しい内容が始まります。");
    }

    #[test]
    fn test_no_overlap_returns_unmatched() {
        let previous = "全く違う話題についての文章がここにあります。";
        let current = "こちらは新しい別の内容で重なりはありません。";
        let outcome = remove_overlap(previous, current, 0.0, config());

        assert!(!outcome.matched);
        assert_eq!(outcome.text, current);
    }

    #[test]
    fn test_normalized_match_bridges_width_and_script() {
        // Model A closed with half-width katakana, model B reopened with
        // full-width; exact match fails, normalized match succeeds.
        let previous = format!("{}ｺﾝﾋﾟｭｰﾀｰｻｲｴﾝｽﾉｺｳｷﾞﾃﾞｽ", "前置きの長い本文がここに続いています。");
        let current = "コンピューターサイエンスノコウギデス。次の章に進みます。";
        let outcome = remove_overlap(&previous, current, 3.0, config());

        assert!(outcome.matched);
        assert_eq!(outcome.text, "次の章に進みます。");
    }

    #[test]
    fn test_second_copy_removed_by_residual_retry() {
        let overlap = "繰り返される境界のフレーズです。";
        let previous = format!("{}{overlap}", "長い長い本文がここまで続いてきました。");
        let current = format!("{overlap}{overlap}そして本編が続きます。");
        let outcome = remove_overlap(&previous, &current, 3.0, config());

        assert!(outcome.matched);
        assert_eq!(outcome.text, "そして本編が続きます。");
    }

    #[test]
    fn test_ascii_words_get_space_connector() {
        let previous = "The meeting started with introductions and the agenda overview for today";
        let current = "agenda overview for today and then we moved on";
        let outcome = remove_overlap(previous, current, 2.0, config());

        assert!(outcome.matched);
        assert_eq!(outcome.connector, " ");
        assert_eq!(outcome.text, "and then we moved on");
    }

    #[test]
    fn test_fuzzy_overlap_still_removed() {
        // One character differs inside the overlap, so no single exact run
        // covers it; the soft retry plus residual pass still clears it.
        let shared = "本日の議題は予算の見直しと人員計画について話し合うことです";
        let fuzzed = "本日の議題は予算の見直しと人員計画について話し合うことです".replace("人員", "人貝");
        let previous = format!("{}{}", "会議の冒頭の挨拶がありました。", shared);
        let current = format!("{}それでは始めましょう。", fuzzed);
        let outcome = remove_overlap(&previous, &current, 5.0, config());

        assert!(outcome.matched);
        assert_eq!(outcome.text, "それでは始めましょう。");
    }

    #[test]
    fn test_empty_inputs() {
        let outcome = remove_overlap("", "text", 0.0, config());
        assert!(!outcome.matched);
        let outcome = remove_overlap("text", "", 0.0, config());
        assert!(!outcome.matched);
        assert_eq!(outcome.text, "");
    }
}
