//! Base hallucination cleaner
//!
//! Removes model-invented content: audio/visual meta brackets, per-language
//! stock hallucination phrases, and every flavor of repetition loop. Runs
//! its pattern set iteratively because collapsing one loop regularly exposes
//! another underneath, with a per-iteration reduction brake.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{CleaningStrategy, CompiledPattern, ConfigError, Language};

use super::repetition::{
    collapse_enumeration, collapse_medium_phrases, collapse_similar_sentences,
    drop_repeated_fingerprints, reduce_short_char_repetitions, split_sentences,
};
use super::{CleaningContext, CleaningIssue, CleaningResult, IssueKind, TextCleaner};

/// Bracketed audio/visual annotations removed unconditionally.
static META_BRACKETS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"[\[【(（](?:音楽|拍手|笑い?|咳|BGM|Music|Applause|Laughter|Silence|inaudible)[\]】)）]",
        r"[♪♫♬🎵🎶]+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static meta pattern"))
    .collect()
});

pub struct BaseHallucinationCleaner {
    strategy: &'static CleaningStrategy,
    /// Pattern sets precompiled per language at construction.
    japanese: Vec<CompiledPattern>,
    english: Vec<CompiledPattern>,
    chinese: Vec<CompiledPattern>,
    korean: Vec<CompiledPattern>,
    auto: Vec<CompiledPattern>,
}

impl BaseHallucinationCleaner {
    pub fn new(strategy: &'static CleaningStrategy) -> Result<Self, ConfigError> {
        Ok(Self {
            japanese: strategy.hallucination.compile(Language::Japanese)?,
            english: strategy.hallucination.compile(Language::English)?,
            chinese: strategy.hallucination.compile(Language::Chinese)?,
            korean: strategy.hallucination.compile(Language::Korean)?,
            auto: strategy.hallucination.compile(Language::Auto)?,
            strategy,
        })
    }

    fn patterns_for(&self, language: Language) -> &[CompiledPattern] {
        match language {
            Language::Japanese => &self.japanese,
            Language::English => &self.english,
            Language::Chinese => &self.chinese,
            Language::Korean => &self.korean,
            Language::Auto => &self.auto,
        }
    }

    /// Apply one round of pattern removal. Repetition patterns keep one
    /// copy of the captured unit; phrase patterns are removed outright.
    /// A pattern whose removal exceeds its class cap is skipped.
    fn apply_patterns(
        &self,
        text: String,
        language: Language,
        matched: &mut Vec<String>,
        issues: &mut Vec<CleaningIssue>,
    ) -> String {
        let mut current = text;

        for pattern in self.patterns_for(language) {
            let replacement = if pattern.is_repetition { "$1" } else { "" };
            let candidate = pattern.regex.replace_all(&current, replacement);
            if candidate.as_ref() == current.as_str() {
                continue;
            }

            let before = current.chars().count();
            let after = candidate.chars().count();
            let reduction = if before > 0 {
                (before as f64 - after as f64) / before as f64
            } else {
                0.0
            };
            let cap = if pattern.is_repetition {
                self.strategy.safety.repetition_pattern_max_reduction
            } else {
                self.strategy.safety.phrase_pattern_max_reduction
            };

            if reduction > cap {
                issues.push(CleaningIssue::new(
                    IssueKind::Warning,
                    format!(
                        "pattern skipped, would remove {:.0}% (cap {:.0}%): {}",
                        reduction * 100.0,
                        cap * 100.0,
                        pattern.source
                    ),
                ));
                continue;
            }

            matched.push(pattern.source.clone());
            current = candidate.into_owned();
        }

        current
    }

    fn collapse_sentence_enumerations(&self, text: &str, matched: &mut Vec<String>) -> String {
        if !self.strategy.repetition.enumeration.enabled {
            return text.to_string();
        }
        split_sentences(text)
            .into_iter()
            .map(|sentence| {
                let collapsed = collapse_enumeration(&sentence, &self.strategy.repetition.enumeration);
                if collapsed != sentence {
                    matched.push("enumeration-sentence".to_string());
                }
                collapsed
            })
            .collect()
    }
}

impl TextCleaner for BaseHallucinationCleaner {
    fn name(&self) -> &'static str {
        "base_hallucination"
    }

    fn clean(&self, text: &str, language: Language, _context: &CleaningContext) -> CleaningResult {
        if text.is_empty() {
            return CleaningResult::unchanged(text);
        }

        let mut issues: Vec<CleaningIssue> = Vec::new();
        let mut matched: Vec<String> = Vec::new();
        let safety = &self.strategy.safety;
        let repetition = &self.strategy.repetition;

        let mut current = text.to_string();
        for bracket in META_BRACKETS.iter() {
            if bracket.is_match(&current) {
                matched.push(bracket.as_str().to_string());
                current = bracket.replace_all(&current, "").into_owned();
            }
        }

        for _iteration in 0..safety.max_cleaning_iterations {
            let iteration_input = current.chars().count();

            current = self.apply_patterns(current, language, &mut matched, &mut issues);
            current = collapse_medium_phrases(
                &current,
                &repetition.medium_phrase_ranges,
                &repetition.enumeration,
                &mut matched,
            );

            let iteration_output = current.chars().count();
            if iteration_output == iteration_input {
                break;
            }
            let iteration_reduction =
                (iteration_input as f64 - iteration_output as f64) / iteration_input.max(1) as f64;
            if iteration_reduction > safety.iteration_reduction_limit {
                issues.push(CleaningIssue::new(
                    IssueKind::Warning,
                    format!(
                        "iteration removed {:.0}%, stopping early",
                        iteration_reduction * 100.0
                    ),
                ));
                break;
            }
        }

        current = self.collapse_sentence_enumerations(&current, &mut matched);
        current = reduce_short_char_repetitions(
            &current,
            &repetition.short_char,
            text.chars().count(),
            &mut matched,
        );
        current = collapse_similar_sentences(&current, repetition, &mut matched);
        current = drop_repeated_fingerprints(&current, &repetition.paragraph_repeat, &mut matched);

        if matched.len() > safety.max_patterns_before_warning {
            issues.push(CleaningIssue::new(
                IssueKind::Warning,
                format!("{} patterns matched in one pass", matched.len()),
            ));
        }

        CleaningResult::from_change(text, current, issues, matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelId;

    fn cleaner() -> BaseHallucinationCleaner {
        BaseHallucinationCleaner::new(CleaningStrategy::for_model(ModelId::Whisper)).unwrap()
    }

    fn clean(text: &str) -> CleaningResult {
        cleaner().clean(text, Language::Japanese, &CleaningContext::default())
    }

    #[test]
    fn test_empty_text_untouched() {
        let result = clean("");
        assert_eq!(result.cleaned_text, "");
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_meta_brackets_removed() {
        let result = clean("こんにちは【音楽】今日の話題です（拍手）終わります。");
        assert_eq!(result.cleaned_text, "こんにちは今日の話題です終わります。");
    }

    #[test]
    fn test_thanks_loop_collapsed_to_one() {
        let text = "本日の内容は以上です。".to_string() + &"ありがとうございます。".repeat(20);
        let result = clean(&text);
        assert_eq!(
            result.cleaned_text.matches("ありがとうございます。").count(),
            1
        );
        assert!(result.cleaned_text.starts_with("本日の内容は以上です。"));
        assert!(result.has_significant_changes);
    }

    #[test]
    fn test_enumeration_loop_collapsed() {
        let result = clean("A、B、C、A、B、C、A、B、C。");
        assert_eq!(result.cleaned_text, "A、B、C。");
    }

    #[test]
    fn test_normal_text_unchanged() {
        let text = "普通の文章です。特に繰り返しはありません。次の話題に移ります。";
        let result = clean(text);
        assert_eq!(result.cleaned_text, text);
        assert!(!result.has_significant_changes);
        assert!(result.metadata.patterns_matched.is_empty());
    }

    #[test]
    fn test_stutter_reduced() {
        let text = format!("えー、{}という話でした。", "あ".repeat(40));
        let result = clean(&text);
        assert!(result.cleaned_text.chars().count() < text.chars().count());
        assert!(result.cleaned_text.contains("という話でした。"));
    }

    #[test]
    fn test_reduction_metadata_consistent() {
        let text = "ご視聴ありがとうございました。".repeat(5);
        let result = clean(&text);
        let expected = (result.metadata.original_length as f64
            - result.metadata.cleaned_length as f64)
            / result.metadata.original_length as f64;
        assert!((result.metadata.reduction_ratio - expected).abs() < 1e-9);
        assert!(result.metadata.reduction_ratio > 0.5);
    }

    #[test]
    fn test_english_patterns_via_auto() {
        let text = "That wraps up the lecture. ".to_string() + &"Thanks for watching! ".repeat(4);
        let cleaner = cleaner();
        let result = cleaner.clean(&text, Language::Auto, &CleaningContext::default());
        assert_eq!(result.cleaned_text.matches("Thanks for watching").count(), 1);
    }
}
