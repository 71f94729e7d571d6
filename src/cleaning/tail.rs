//! Tail-repeat cleaners
//!
//! Models that run out of audio keep emitting the last thing they said.
//! These cleaners look only at the end of the transcript: the last few
//! paragraph blocks (or timestamp-prefixed blocks), testing each small unit
//! size for a trailing loop and keeping exactly one copy of the unit.

use crate::config::{Language, TailRepeatConfig};
use crate::text::normalize;

use super::repetition::{char_inclusion_similarity, split_sentences};
use super::{CleaningContext, CleaningResult, TextCleaner};

/// Count how many times the final `unit`-sized group of blocks repeats at
/// the tail, comparing blocks by normalized char-inclusion similarity.
fn trailing_unit_repeats(blocks: &[String], unit: usize, similarity_threshold: f64) -> usize {
    if unit == 0 || blocks.len() < unit * 2 {
        return 1;
    }

    let reference: Vec<String> = blocks[blocks.len() - unit..]
        .iter()
        .map(|b| normalize(b))
        .collect();
    if reference.iter().all(|b| b.is_empty()) {
        return 1;
    }

    let mut repeats = 1;
    loop {
        let candidate_end = blocks.len() - repeats * unit;
        if candidate_end < unit {
            break;
        }
        let candidate = &blocks[candidate_end - unit..candidate_end];
        let all_similar = candidate.iter().zip(reference.iter()).all(|(block, norm)| {
            char_inclusion_similarity(&normalize(block), norm) >= similarity_threshold
        });
        if !all_similar {
            break;
        }
        repeats += 1;
    }
    repeats
}

/// Collapse a trailing loop in `blocks`, returning the kept blocks when a
/// loop was found.
fn collapse_tail(
    blocks: &[String],
    config: &TailRepeatConfig,
    max_tail: usize,
) -> Option<Vec<String>> {
    // Small units first: a single repeating block is the common case.
    for unit in 1..=config.max_unit {
        let repeats = trailing_unit_repeats(blocks, unit, config.similarity_threshold);
        let inspected = repeats.min(max_tail / unit.max(1));
        if inspected >= config.min_repeat_count {
            let keep = blocks.len() - (repeats - 1) * unit;
            return Some(blocks[..keep].to_vec());
        }
    }
    None
}

/// Tail-repeat collapse over paragraph blocks, falling back to sentences.
pub struct TailRepeatCleaner {
    config: TailRepeatConfig,
}

impl TailRepeatCleaner {
    pub fn new(config: &TailRepeatConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl TextCleaner for TailRepeatCleaner {
    fn name(&self) -> &'static str {
        "tail_repeat"
    }

    fn clean(&self, text: &str, _language: Language, _context: &CleaningContext) -> CleaningResult {
        if text.is_empty() {
            return CleaningResult::unchanged(text);
        }

        let paragraphs: Vec<String> = text.split("\n\n").map(str::to_string).collect();
        if let Some(kept) = collapse_tail(&paragraphs, &self.config, self.config.max_tail_paragraphs)
        {
            let cleaned = kept.join("\n\n");
            return CleaningResult::from_change(
                text,
                cleaned,
                Vec::new(),
                vec!["tail-paragraph-loop".to_string()],
            );
        }

        // Paragraph level found nothing; retry on sentences.
        let sentences = split_sentences(text);
        if let Some(kept) = collapse_tail(&sentences, &self.config, self.config.max_tail_paragraphs)
        {
            return CleaningResult::from_change(
                text,
                kept.concat(),
                Vec::new(),
                vec!["tail-sentence-loop".to_string()],
            );
        }

        CleaningResult::unchanged(text)
    }
}

/// Tail-repeat collapse over `[M:SS → M:SS]` timestamp blocks.
pub struct TimestampsTailRepeatCleaner {
    config: TailRepeatConfig,
}

impl TimestampsTailRepeatCleaner {
    pub fn new(config: &TailRepeatConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn block_text(line: &str) -> &str {
        line.split_once("] ").map(|(_, text)| text).unwrap_or(line)
    }
}

impl TextCleaner for TimestampsTailRepeatCleaner {
    fn name(&self) -> &'static str {
        "timestamps_tail_repeat"
    }

    fn clean(&self, text: &str, _language: Language, context: &CleaningContext) -> CleaningResult {
        if !context.has_segments {
            return CleaningResult::unchanged(text);
        }

        let lines: Vec<&str> = text.lines().collect();
        if lines.len() < 2 || !lines.iter().all(|l| l.starts_with('[')) {
            return CleaningResult::unchanged(text);
        }

        // Compare only the text behind the timestamps: a loop repeats the
        // words, the clock keeps advancing.
        let block_texts: Vec<String> = lines
            .iter()
            .map(|l| Self::block_text(l).to_string())
            .collect();

        if let Some(kept) = collapse_tail(&block_texts, &self.config, self.config.max_tail_blocks) {
            let cleaned = lines[..kept.len()].join("\n");
            return CleaningResult::from_change(
                text,
                cleaned,
                Vec::new(),
                vec!["tail-timestamp-loop".to_string()],
            );
        }

        CleaningResult::unchanged(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TailRepeatConfig {
        TailRepeatConfig::default()
    }

    fn clean_plain(text: &str) -> CleaningResult {
        TailRepeatCleaner::new(&config()).clean(text, Language::Japanese, &CleaningContext::default())
    }

    #[test]
    fn test_sentence_tail_loop_keeps_one_copy() {
        let text = "本日の講義はここまでです。".to_string() + &"ありがとうございました。".repeat(20);
        let result = clean_plain(&text);
        assert_eq!(
            result.cleaned_text,
            "本日の講義はここまでです。ありがとうございました。"
        );
    }

    #[test]
    fn test_paragraph_tail_loop_keeps_one_copy() {
        let paragraph = "最後の段落の内容です。";
        let text = format!("最初の段落です。\n\n{}", [paragraph; 5].join("\n\n"));
        let result = clean_plain(&text);
        assert_eq!(result.cleaned_text, format!("最初の段落です。\n\n{paragraph}"));
    }

    #[test]
    fn test_two_block_unit_loop() {
        let pair = "一つ目のブロック。\n\n二つ目のブロック。";
        let text = format!("導入部です。\n\n{pair}\n\n{pair}\n\n{pair}");
        let result = clean_plain(&text);
        assert_eq!(result.cleaned_text, format!("導入部です。\n\n{pair}"));
    }

    #[test]
    fn test_varied_tail_untouched() {
        let text = "最初の文です。二番目は違う内容です。三番目も別の話題です。";
        let result = clean_plain(text);
        assert_eq!(result.cleaned_text, text);
        assert!(!result.has_significant_changes);
    }

    #[test]
    fn test_below_min_repeat_untouched() {
        let text = "内容です。おしまい。おしまい。";
        let result = clean_plain(text);
        assert_eq!(result.cleaned_text, text);
    }

    #[test]
    fn test_near_identical_blocks_collapse() {
        // Trailing copies differ only in punctuation; similarity is over
        // the threshold after normalization.
        let text = "導入です。ご清聴ありがとうございました。ご清聴ありがとうございました！ご清聴ありがとうございました。";
        let result = clean_plain(text);
        assert_eq!(result.cleaned_text, "導入です。ご清聴ありがとうございました。");
    }

    #[test]
    fn test_timestamp_tail_loop() {
        let mut lines = vec![
            "[0:00 → 0:05] 講義の最後のまとめです".to_string(),
        ];
        for i in 0..6 {
            lines.push(format!("[0:{:02} → 0:{:02}] ご視聴ありがとうございました", 5 + i * 5, 10 + i * 5));
        }
        let text = lines.join("\n");

        let context = CleaningContext {
            has_segments: true,
            ..CleaningContext::default()
        };
        let result = TimestampsTailRepeatCleaner::new(&config()).clean(
            &text,
            Language::Japanese,
            &context,
        );

        let kept: Vec<&str> = result.cleaned_text.lines().collect();
        assert_eq!(kept.len(), 2);
        assert!(kept[0].contains("まとめ"));
        assert!(kept[1].contains("ご視聴ありがとうございました"));
    }

    #[test]
    fn test_timestamp_cleaner_noop_without_segments() {
        let text = "[0:00 → 0:05] 内容\n[0:05 → 0:10] 内容";
        let result = TimestampsTailRepeatCleaner::new(&config()).clean(
            text,
            Language::Japanese,
            &CleaningContext::default(),
        );
        assert_eq!(result.cleaned_text, text);
    }
}
