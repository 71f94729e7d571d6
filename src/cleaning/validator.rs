//! Japanese text validator
//!
//! Reports quality problems without ever touching the text: suspicious
//! reduction, dangling particles, merged words, implausible speech density,
//! script-ratio anomalies, and encoding damage. Output text is always the
//! input text.

use regex::Regex;

use crate::config::{ConfigError, Language, ValidationConfig};

use super::{CleaningContext, CleaningIssue, CleaningResult, IssueKind, TextCleaner};

pub struct JapaneseTextValidator {
    config: ValidationConfig,
    incomplete_particles: Vec<Regex>,
    merged_words: Vec<Regex>,
}

impl JapaneseTextValidator {
    pub fn new(config: &ValidationConfig) -> Result<Self, ConfigError> {
        let compile = |scope: &'static str, sources: &[String]| {
            sources
                .iter()
                .map(|source| {
                    Regex::new(source).map_err(|e| ConfigError::BadPattern {
                        scope: scope.to_string(),
                        pattern: source.clone(),
                        message: e.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        };

        Ok(Self {
            incomplete_particles: compile(
                "validation.incomplete_particles",
                &config.incomplete_particle_patterns,
            )?,
            merged_words: compile("validation.merged_words", &config.merged_word_patterns)?,
            config: config.clone(),
        })
    }

    fn check_reduction(&self, text: &str, context: &CleaningContext, issues: &mut Vec<CleaningIssue>) {
        if context.original_length == 0 {
            return;
        }
        let length = text.chars().count();
        let reduction =
            (context.original_length as f64 - length as f64) / context.original_length as f64;
        if reduction > 0.5 {
            issues.push(CleaningIssue::new(
                IssueKind::Validation,
                format!(
                    "cleaning removed {:.0}% of the original transcript",
                    reduction * 100.0
                ),
            ));
        }
    }

    fn check_density(&self, text: &str, context: &CleaningContext, issues: &mut Vec<CleaningIssue>) {
        let Some(duration) = context.audio_duration else {
            return;
        };
        if duration <= 0.0 {
            return;
        }
        let chars_per_second = text.chars().count() as f64 / duration;
        if chars_per_second < self.config.min_chars_per_second {
            issues.push(CleaningIssue::new(
                IssueKind::Validation,
                format!(
                    "only {:.2} chars/s for {:.0}s of audio, transcript may be truncated",
                    chars_per_second, duration
                ),
            ));
        } else if chars_per_second > self.config.max_chars_per_second {
            issues.push(CleaningIssue::new(
                IssueKind::Validation,
                format!(
                    "{:.1} chars/s is implausibly dense speech",
                    chars_per_second
                ),
            ));
        }
    }

    fn check_repetition_runs(&self, text: &str, issues: &mut Vec<CleaningIssue>) {
        let mut run = 1usize;
        let mut previous: Option<char> = None;
        for c in text.chars() {
            if Some(c) == previous {
                run += 1;
                if run == self.config.char_repetition_threshold {
                    issues.push(CleaningIssue::new(
                        IssueKind::Validation,
                        format!("character {c:?} repeats {run}+ times in a row"),
                    ));
                }
            } else {
                run = 1;
                previous = Some(c);
            }
        }
    }

    fn check_scripts(&self, text: &str, issues: &mut Vec<CleaningIssue>) {
        let total = text.chars().filter(|c| !c.is_whitespace()).count();
        if total == 0 {
            return;
        }

        let mut hiragana = 0usize;
        let mut katakana = 0usize;
        let mut kanji = 0usize;
        let mut latin = 0usize;
        for c in text.chars() {
            match c {
                'ぁ'..='ん' => hiragana += 1,
                'ァ'..='ヶ' | 'ー' => katakana += 1,
                '一'..='\u{9FFF}' => kanji += 1,
                c if c.is_ascii_alphabetic() => latin += 1,
                _ => {}
            }
        }

        let ratio = |count: usize| count as f64 / total as f64;
        if ratio(katakana) > self.config.max_katakana_ratio {
            issues.push(CleaningIssue::new(
                IssueKind::Validation,
                "transcript is almost entirely katakana".to_string(),
            ));
        }
        if ratio(latin) > self.config.max_latin_ratio {
            issues.push(CleaningIssue::new(
                IssueKind::Validation,
                "transcript is almost entirely latin script for a Japanese request".to_string(),
            ));
        }
        // Japanese prose carries hiragana for its grammar; all-kanji output
        // of any length reads like a decoding artifact or the wrong
        // language.
        if kanji > 0 && hiragana == 0 && total >= self.config.min_text_length * 2 {
            issues.push(CleaningIssue::new(
                IssueKind::Validation,
                "kanji without any hiragana, possibly Chinese output".to_string(),
            ));
        }
        // Japanese text interleaves scripts; a hard half-and-half split of
        // hiragana-only and latin-only regions suggests two concatenated
        // outputs.
        if hiragana + katakana + kanji > 0 && latin > 0 {
            let japanese = hiragana + katakana + kanji;
            let mixed_minority = japanese.min(latin);
            if mixed_minority as f64 / total as f64 > 0.35 && !text_interleaves_scripts(text) {
                issues.push(CleaningIssue::new(
                    IssueKind::Validation,
                    "japanese and latin blocks do not interleave, output may be stitched"
                        .to_string(),
                ));
            }
        }
    }

    fn check_structure(&self, text: &str, issues: &mut Vec<CleaningIssue>) {
        let trimmed = text.trim();
        if trimmed.chars().count() < self.config.min_text_length {
            issues.push(CleaningIssue::new(
                IssueKind::Validation,
                format!(
                    "transcript shorter than {} characters",
                    self.config.min_text_length
                ),
            ));
            return;
        }

        if !trimmed.ends_with(['。', '.', '!', '?', '！', '？', '」', '）', ')']) {
            issues.push(CleaningIssue::new(
                IssueKind::Validation,
                "transcript does not end on sentence punctuation".to_string(),
            ));
        }

        let opens = trimmed.chars().filter(|c| matches!(c, '「' | '（' | '(' | '[' | '【')).count();
        let closes = trimmed.chars().filter(|c| matches!(c, '」' | '）' | ')' | ']' | '】')).count();
        if opens != closes {
            issues.push(CleaningIssue::new(
                IssueKind::Validation,
                format!("unbalanced brackets: {opens} opening vs {closes} closing"),
            ));
        }
    }

    fn check_transitions(&self, text: &str, issues: &mut Vec<CleaningIssue>) {
        // A latin letter glued between kana on both sides is a merged-word
        // artifact even when the configured patterns miss it.
        let chars: Vec<char> = text.chars().collect();
        for window in chars.windows(3) {
            let is_kana = |c: char| matches!(c, 'ぁ'..='ん' | 'ァ'..='ヶ');
            if is_kana(window[0]) && window[1].is_ascii_alphabetic() && is_kana(window[2]) {
                issues.push(CleaningIssue::new(
                    IssueKind::Validation,
                    format!("isolated latin letter {:?} inside kana", window[1]),
                ));
                break;
            }
        }
    }

    fn check_encoding(&self, text: &str, issues: &mut Vec<CleaningIssue>) {
        if text.contains('\u{FFFD}') {
            issues.push(CleaningIssue::new(
                IssueKind::ReplacementCharacter,
                "unicode replacement character present, input was mis-decoded".to_string(),
            ));
        }
    }
}

/// Whether japanese and latin characters alternate through the text rather
/// than forming two monolithic blocks.
fn text_interleaves_scripts(text: &str) -> bool {
    let mut transitions = 0usize;
    let mut last_was_latin: Option<bool> = None;
    for c in text.chars() {
        let latin = if c.is_ascii_alphabetic() {
            true
        } else if matches!(c, 'ぁ'..='ん' | 'ァ'..='ヶ' | '一'..='\u{9FFF}') {
            false
        } else {
            continue;
        };
        if last_was_latin == Some(!latin) {
            transitions += 1;
        }
        last_was_latin = Some(latin);
    }
    transitions >= 3
}

impl TextCleaner for JapaneseTextValidator {
    fn name(&self) -> &'static str {
        "japanese_validator"
    }

    fn clean(&self, text: &str, language: Language, context: &CleaningContext) -> CleaningResult {
        if text.is_empty() {
            return CleaningResult::unchanged(text);
        }

        let mut issues: Vec<CleaningIssue> = Vec::new();

        self.check_reduction(text, context, &mut issues);
        self.check_density(text, context, &mut issues);
        self.check_repetition_runs(text, &mut issues);
        self.check_encoding(text, &mut issues);

        if matches!(language, Language::Japanese | Language::Auto) {
            for pattern in &self.incomplete_particles {
                if pattern.is_match(text) {
                    issues.push(CleaningIssue::new(
                        IssueKind::Validation,
                        format!("sentence ends on a dangling particle: {}", pattern.as_str()),
                    ));
                }
            }
            for pattern in &self.merged_words {
                if pattern.is_match(text) {
                    issues.push(CleaningIssue::new(
                        IssueKind::Validation,
                        format!("merged-word artifact: {}", pattern.as_str()),
                    ));
                }
            }
            self.check_scripts(text, &mut issues);
            self.check_transitions(text, &mut issues);
            self.check_structure(text, &mut issues);
        }

        // Validation never mutates: the cleaned text is the input text.
        CleaningResult::from_change(text, text.to_string(), issues, Vec::new())
    }
}
