//! Repetition collapsing primitives
//!
//! Transcription models loop: a particle stutters twenty times, a phrase
//! repeats until the token budget runs out, an enumeration cycles forever.
//! These helpers collapse each shape while protecting legitimate repeats
//! (grammar particles, short acknowledgements) behind whitelists.

use crate::config::{
    EnumerationConfig, ParagraphRepeatConfig, ParticleReductionMode, PhraseRepetitionRange,
    RepetitionThresholds, ShortCharRepetitionConfig,
};
use crate::text::normalize;

/// Sentence-ending characters for splitting.
const SENTENCE_ENDERS: &[char] = &['。', '.', '!', '?', '！', '？'];

/// Enumeration separators.
const ENUM_SEPARATORS: &[char] = &['、', ',', '，'];

/// Asymmetric char-inclusion similarity: the fraction of the shorter text's
/// characters (multiset) contained in the longer one. Fast and
/// order-insensitive.
pub fn char_inclusion_similarity(a: &str, b: &str) -> f64 {
    let chars_a: Vec<char> = a.chars().collect();
    let chars_b: Vec<char> = b.chars().collect();
    let (shorter, longer) = if chars_a.len() <= chars_b.len() {
        (chars_a, chars_b)
    } else {
        (chars_b, chars_a)
    };
    if shorter.is_empty() {
        return 0.0;
    }

    let mut pool: std::collections::HashMap<char, usize> = std::collections::HashMap::new();
    for c in &longer {
        *pool.entry(*c).or_insert(0) += 1;
    }

    let mut included = 0usize;
    for c in &shorter {
        if let Some(count) = pool.get_mut(c) {
            if *count > 0 {
                *count -= 1;
                included += 1;
            }
        }
    }

    included as f64 / shorter.len() as f64
}

/// Collapse adjacent repeats of medium-length phrases.
///
/// For each configured `{min, max, threshold}` band, a unit of that length
/// repeating at least `threshold` times in a row keeps one copy. Spans that
/// look like enumerations are handed to enumeration collapsing instead so a
/// looping list keeps one full cycle.
pub fn collapse_medium_phrases(
    text: &str,
    ranges: &[PhraseRepetitionRange],
    enumeration: &EnumerationConfig,
    matched: &mut Vec<String>,
) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out: Vec<char> = Vec::with_capacity(chars.len());
    let mut i = 0;

    'outer: while i < chars.len() {
        // Longer units first so a big loop is not eaten one clause at a
        // time.
        for range in ranges.iter() {
            let max_len = range.max.min((chars.len() - i) / 2);
            for unit_len in (range.min..=max_len).rev() {
                let repeats = count_adjacent_repeats(&chars, i, unit_len);
                if repeats >= range.threshold {
                    let unit: String = chars[i..i + unit_len].iter().collect();
                    let span_end = i + repeats * unit_len;

                    if enumeration.enabled && looks_like_enumeration(&unit) {
                        let span: String = chars[i..span_end].iter().collect();
                        let collapsed = collapse_enumeration(&span, enumeration);
                        matched.push(format!("enumeration x{repeats}"));
                        out.extend(collapsed.chars());
                    } else {
                        matched.push(format!("phrase[{unit_len}] x{repeats}"));
                        out.extend(unit.chars());
                    }
                    i = span_end;
                    continue 'outer;
                }
            }
        }

        out.push(chars[i]);
        i += 1;
    }

    out.into_iter().collect()
}

fn count_adjacent_repeats(chars: &[char], start: usize, unit_len: usize) -> usize {
    if unit_len == 0 || start + unit_len > chars.len() {
        return 0;
    }
    let unit = &chars[start..start + unit_len];
    let mut repeats = 1;
    let mut position = start + unit_len;
    while position + unit_len <= chars.len() && &chars[position..position + unit_len] == unit {
        repeats += 1;
        position += unit_len;
    }
    repeats
}

fn looks_like_enumeration(unit: &str) -> bool {
    unit.chars().filter(|c| ENUM_SEPARATORS.contains(c)).count() >= 1
}

/// Collapse a cyclic comma-separated list to a single cycle.
///
/// Elements are compared NFKC-normalized, so a final `C。` still matches an
/// earlier `C`. The trailing punctuation of the original list survives.
pub fn collapse_enumeration(text: &str, config: &EnumerationConfig) -> String {
    if !config.enabled {
        return text.to_string();
    }

    let trailing: String = text
        .chars()
        .rev()
        .take_while(|c| SENTENCE_ENDERS.contains(c) || c.is_whitespace())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let body = &text[..text.len() - trailing.len()];

    let elements: Vec<&str> = body
        .split(|c| ENUM_SEPARATORS.contains(&c))
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .collect();
    if elements.len() < 4 {
        return text.to_string();
    }

    let normalized: Vec<String> = elements.iter().map(|e| normalize(e)).collect();

    // Try cycle lengths from 2 up; a cycle must repeat enough full times to
    // count as a loop.
    for cycle in 2..=elements.len() / config.min_repeat_count.max(1) {
        let full_cycles = elements.len() / cycle;
        if full_cycles < config.min_repeat_count {
            continue;
        }
        let cyclic = (0..full_cycles * cycle)
            .all(|i| normalized[i] == normalized[i % cycle]);
        if !cyclic {
            continue;
        }

        let mut kept: Vec<&str> = elements[..cycle].to_vec();
        // Partial tail past the last full cycle is unrelated content.
        kept.extend(&elements[full_cycles * cycle..]);
        return format!("{}{}", kept.join("、"), trailing);
    }

    text.to_string()
}

/// Reduce runs of a repeated short token (1-4 kana/word characters).
///
/// The trigger threshold grows with text length. Whitelisted particles and
/// expressions follow the configured reduction mode; everything else keeps
/// the threshold count plus the configured ratio of the excess.
pub fn reduce_short_char_repetitions(
    text: &str,
    config: &ShortCharRepetitionConfig,
    total_text_length: usize,
    matched: &mut Vec<String>,
) -> String {
    let threshold = config.base_threshold
        + (total_text_length / config.dynamic_threshold_divisor.max(1)) * config.length_factor;

    let chars: Vec<char> = text.chars().collect();
    let mut out: Vec<char> = Vec::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        let mut collapsed = false;
        // Shortest unit first: a single-character stutter must not be
        // swallowed whole by a longer periodic unit.
        for unit_len in 1..=4usize {
            if i + unit_len > chars.len() {
                continue;
            }
            let unit: String = chars[i..i + unit_len].iter().collect();
            if !unit.chars().all(is_short_repeat_char) {
                continue;
            }
            let repeats = count_adjacent_repeats(&chars, i, unit_len);
            if repeats <= threshold {
                continue;
            }

            let is_protected = config.essential_particles.contains(&unit)
                || config.common_expressions.contains(&unit);
            let keep = if is_protected {
                match config.particle_reduction_mode {
                    ParticleReductionMode::Preserve => repeats,
                    // Protection wins over the ratio: keep up to the
                    // threshold untouched.
                    ParticleReductionMode::Limit => threshold,
                    ParticleReductionMode::Reduce => reduced_count(repeats, threshold, config),
                }
            } else {
                reduced_count(repeats, threshold, config)
            };

            if keep < repeats {
                matched.push(format!("short-char {unit:?} x{repeats}->{keep}"));
            }
            for _ in 0..keep {
                out.extend(unit.chars());
            }
            i += repeats * unit_len;
            collapsed = true;
            break;
        }

        if !collapsed {
            out.push(chars[i]);
            i += 1;
        }
    }

    out.into_iter().collect()
}

fn reduced_count(repeats: usize, threshold: usize, config: &ShortCharRepetitionConfig) -> usize {
    let excess = repeats - threshold;
    threshold + (excess as f64 * config.keep_ratio).ceil() as usize
}

fn is_short_repeat_char(c: char) -> bool {
    matches!(c, 'ぁ'..='ん' | 'ァ'..='ヶ' | 'ー') || c.is_alphanumeric()
}

/// Collapse runs of consecutive similar sentences beyond the repetition
/// threshold to a single copy.
pub fn collapse_similar_sentences(
    text: &str,
    thresholds: &RepetitionThresholds,
    matched: &mut Vec<String>,
) -> String {
    let sentences = split_sentences(text);
    if sentences.len() <= thresholds.sentence_repetition {
        return text.to_string();
    }

    let mut out: Vec<String> = Vec::with_capacity(sentences.len());
    let mut i = 0;

    while i < sentences.len() {
        let anchor = &sentences[i];
        let mut run = 1;

        if anchor.chars().count() >= thresholds.sentence_min_length {
            while i + run < sentences.len()
                && sentences[i + run].chars().count() >= thresholds.sentence_min_length
                && char_inclusion_similarity(anchor, &sentences[i + run])
                    >= thresholds.sentence_similarity_threshold
            {
                run += 1;
            }
        }

        if run > thresholds.sentence_repetition {
            matched.push(format!("sentence-repeat x{run}"));
            out.push(anchor.clone());
        } else {
            out.extend(sentences[i..i + run].iter().cloned());
        }
        i += run;
    }

    out.concat()
}

/// Drop sentences whose head fingerprint was already seen.
///
/// The fingerprint is the first `head_chars` characters, lowercased with
/// whitespace stripped. Punctuation is deliberately kept: it distinguishes
/// enumerated near-identical sentences.
pub fn drop_repeated_fingerprints(
    text: &str,
    config: &ParagraphRepeatConfig,
    matched: &mut Vec<String>,
) -> String {
    if !config.enabled {
        return text.to_string();
    }

    let sentences = split_sentences(text);
    let mut seen = std::collections::HashSet::new();
    let mut out: Vec<String> = Vec::with_capacity(sentences.len());
    let mut dropped = 0usize;

    for sentence in sentences {
        if sentence.chars().count() < config.min_sentence_length {
            out.push(sentence);
            continue;
        }
        let fingerprint: String = sentence
            .chars()
            .filter(|c| !c.is_whitespace())
            .take(config.head_chars)
            .flat_map(char::to_lowercase)
            .collect();

        if seen.insert(fingerprint) {
            out.push(sentence);
        } else {
            dropped += 1;
        }
    }

    if dropped > 0 {
        matched.push(format!("paragraph-fingerprint x{dropped}"));
    }
    out.concat()
}

/// Split into sentences, each keeping its ending punctuation. Trailing text
/// without an ender becomes the final element.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        current.push(c);
        if SENTENCE_ENDERS.contains(&c) {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepetitionThresholds;

    fn thresholds() -> RepetitionThresholds {
        RepetitionThresholds::default()
    }

    #[test]
    fn test_char_inclusion_identical() {
        assert_eq!(char_inclusion_similarity("同じ文章", "同じ文章"), 1.0);
    }

    #[test]
    fn test_char_inclusion_asymmetric_subset() {
        // Shorter fully contained in longer scores 1.0
        assert_eq!(char_inclusion_similarity("同じ", "同じ文章です"), 1.0);
        assert!(char_inclusion_similarity("全然違う", "別の内容") < 0.5);
    }

    #[test]
    fn test_medium_phrase_collapsed() {
        let text = "お疲れ様でした。".repeat(5) + "また明日。";
        let mut matched = Vec::new();
        let collapsed = collapse_medium_phrases(
            &text,
            &thresholds().medium_phrase_ranges,
            &EnumerationConfig::default(),
            &mut matched,
        );
        assert_eq!(collapsed, "お疲れ様でした。また明日。");
        assert!(!matched.is_empty());
    }

    #[test]
    fn test_below_threshold_phrase_kept() {
        let text = "お疲れ様でした。".repeat(2) + "また明日。";
        let mut matched = Vec::new();
        let collapsed = collapse_medium_phrases(
            &text,
            &thresholds().medium_phrase_ranges,
            &EnumerationConfig::default(),
            &mut matched,
        );
        assert_eq!(collapsed, text);
        assert!(matched.is_empty());
    }

    #[test]
    fn test_enumeration_cycle_kept_once() {
        let config = EnumerationConfig {
            enabled: true,
            min_repeat_count: 3,
        };
        let collapsed = collapse_enumeration("A、B、C、A、B、C、A、B、C。", &config);
        assert_eq!(collapsed, "A、B、C。");
    }

    #[test]
    fn test_enumeration_non_cyclic_untouched() {
        let config = EnumerationConfig::default();
        let text = "りんご、みかん、ぶどう、もも。";
        assert_eq!(collapse_enumeration(text, &config), text);
    }

    #[test]
    fn test_enumeration_fullwidth_normalized_match() {
        let config = EnumerationConfig {
            enabled: true,
            min_repeat_count: 3,
        };
        // Second cycle uses full-width letters; NFKC equality still holds
        let collapsed = collapse_enumeration("A、B、Ａ、Ｂ、A、B。", &config);
        assert_eq!(collapsed, "A、B。");
    }

    #[test]
    fn test_short_char_run_reduced() {
        let config = ShortCharRepetitionConfig::default();
        let text = "あ".repeat(30);
        let mut matched = Vec::new();
        let reduced = reduce_short_char_repetitions(&text, &config, text.chars().count(), &mut matched);
        assert!(reduced.chars().count() < 30);
        assert!(reduced.chars().count() >= config.base_threshold);
        assert!(!matched.is_empty());
    }

    #[test]
    fn test_protected_particle_limit_mode() {
        let config = ShortCharRepetitionConfig {
            particle_reduction_mode: ParticleReductionMode::Limit,
            ..ShortCharRepetitionConfig::default()
        };
        let text = "は".repeat(20);
        let mut matched = Vec::new();
        let reduced = reduce_short_char_repetitions(&text, &config, 20, &mut matched);
        // Limit mode keeps exactly the threshold count
        assert_eq!(reduced.chars().count(), config.base_threshold);
    }

    #[test]
    fn test_protected_particle_preserve_mode() {
        let config = ShortCharRepetitionConfig {
            particle_reduction_mode: ParticleReductionMode::Preserve,
            ..ShortCharRepetitionConfig::default()
        };
        let text = "は".repeat(20);
        let mut matched = Vec::new();
        let reduced = reduce_short_char_repetitions(&text, &config, 20, &mut matched);
        assert_eq!(reduced, text);
    }

    #[test]
    fn test_short_run_below_threshold_untouched() {
        let config = ShortCharRepetitionConfig::default();
        let text = "そうそうそう、わかります。";
        let mut matched = Vec::new();
        let reduced = reduce_short_char_repetitions(&text, &config, text.chars().count(), &mut matched);
        assert_eq!(reduced, text);
    }

    #[test]
    fn test_similar_sentences_collapse() {
        let text = "今日の天気はとても良いです。".repeat(5);
        let mut matched = Vec::new();
        let collapsed = collapse_similar_sentences(&text, &thresholds(), &mut matched);
        assert_eq!(collapsed, "今日の天気はとても良いです。");
    }

    #[test]
    fn test_different_sentences_kept() {
        let text = "朝は晴れていました。昼から雨になりました。夜には雪でした。";
        let mut matched = Vec::new();
        let collapsed = collapse_similar_sentences(&text, &thresholds(), &mut matched);
        assert_eq!(collapsed, text);
    }

    #[test]
    fn test_fingerprint_drops_duplicate_heads() {
        let sentence = "この説明はかなり長いので先頭の十五文字が一致します。";
        let text = format!("{sentence}別の内容の文がここにあります。{sentence}");
        let mut matched = Vec::new();
        let cleaned = drop_repeated_fingerprints(
            &text,
            &ParagraphRepeatConfig::default(),
            &mut matched,
        );
        assert_eq!(cleaned.matches("この説明はかなり長い").count(), 1);
        assert!(cleaned.contains("別の内容の文"));
    }

    #[test]
    fn test_fingerprint_keeps_short_sentences() {
        let text = "はい。はい。はい。";
        let mut matched = Vec::new();
        let cleaned = drop_repeated_fingerprints(
            &text,
            &ParagraphRepeatConfig::default(),
            &mut matched,
        );
        assert_eq!(cleaned, text);
    }

    #[test]
    fn test_split_sentences_mixed_enders() {
        let parts = split_sentences("一つ目。二つ目!三つ目？残り");
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "一つ目。");
        assert_eq!(parts[3], "残り");
    }
}
