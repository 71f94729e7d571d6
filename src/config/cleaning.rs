//! Per-model cleaning strategy configuration
//!
//! Pattern strings live here as data; they are compiled once at registry
//! build and validated at startup so a bad pattern fails fast instead of
//! inside a cleaning pass.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{ConfigError, ModelId};

/// Transcription language hint. `Auto` unions the JP/EN/ZH pattern sets with
/// Japanese precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Japanese,
    English,
    Chinese,
    Korean,
    Auto,
}

impl Language {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "ja" | "jpn" => Language::Japanese,
            "en" | "eng" => Language::English,
            "zh" | "zho" => Language::Chinese,
            "ko" | "kor" => Language::Korean,
            _ => Language::Auto,
        }
    }
}

/// Which pre-assembled cleaner stack a model uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineType {
    Whisper,
    Gpt4o,
    Standard,
}

/// Reduction-ratio ceilings guarding every cleaning stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyThresholds {
    /// A single cleaner may not remove more than this fraction.
    pub single_cleaner_max_reduction: f64,
    /// A single contamination pattern may not remove more than this
    /// fraction of the stage input. High enough that a precise paired-tag
    /// match on a short transcript still fires; the emergency threshold
    /// below catches runaway removal.
    pub single_pattern_max_reduction: f64,
    /// Cap for repetition-class hallucination patterns (quantifier loops).
    pub repetition_pattern_max_reduction: f64,
    /// Cap for phrase-class hallucination patterns.
    pub phrase_pattern_max_reduction: f64,
    /// Total reduction past this point reverts the stage to its input.
    pub emergency_fallback_threshold: f64,
    /// Total reduction past this point records a warning issue.
    pub warning_threshold: f64,
    /// Matched-pattern count past this point records a warning issue.
    pub max_patterns_before_warning: usize,
    /// Iterative hallucination cleaning loop bound.
    pub max_cleaning_iterations: usize,
    /// A single iteration removing more than this fraction stops the loop.
    pub iteration_reduction_limit: f64,
}

impl Default for SafetyThresholds {
    fn default() -> Self {
        Self {
            single_cleaner_max_reduction: 0.5,
            single_pattern_max_reduction: 0.7,
            repetition_pattern_max_reduction: 1.0,
            phrase_pattern_max_reduction: 0.2,
            emergency_fallback_threshold: 0.85,
            warning_threshold: 0.3,
            max_patterns_before_warning: 10,
            max_cleaning_iterations: 3,
            iteration_reduction_limit: 0.5,
        }
    }
}

/// Hallucination pattern strings keyed by language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HallucinationPatterns {
    pub japanese: Vec<String>,
    pub english: Vec<String>,
    pub chinese: Vec<String>,
    pub korean: Vec<String>,
}

/// A compiled hallucination pattern. Repetition patterns (those written with
/// a `{N,}` group quantifier) get the looser reduction cap; phrase patterns
/// the stricter one.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub regex: Regex,
    pub source: String,
    pub is_repetition: bool,
}

impl CompiledPattern {
    fn compile(scope: &str, source: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(source).map_err(|e| ConfigError::BadPattern {
            scope: scope.to_string(),
            pattern: source.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            regex,
            source: source.to_string(),
            is_repetition: is_repetition_pattern(source),
        })
    }
}

/// A pattern counts as repetition-class when it quantifies a group with a
/// lower-bounded repeat like `{8,}` or `{2,}`.
pub fn is_repetition_pattern(source: &str) -> bool {
    static QUANTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\)\{\d+,\d*\}").unwrap());
    QUANTIFIER.is_match(source)
}

impl HallucinationPatterns {
    /// Compile the pattern set for a language. `Auto` unions JP, EN, and ZH
    /// with the Japanese set first so it takes precedence on overlapping
    /// matches.
    pub fn compile(&self, language: Language) -> Result<Vec<CompiledPattern>, ConfigError> {
        let sources: Vec<&Vec<String>> = match language {
            Language::Japanese => vec![&self.japanese],
            Language::English => vec![&self.english],
            Language::Chinese => vec![&self.chinese],
            Language::Korean => vec![&self.korean],
            Language::Auto => vec![&self.japanese, &self.english, &self.chinese],
        };

        let mut compiled = Vec::new();
        for set in sources {
            for source in set {
                compiled.push(CompiledPattern::compile("hallucination", source)?);
            }
        }
        Ok(compiled)
    }
}

/// How protected short words (particles) interact with repetition reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticleReductionMode {
    /// Protected words are never reduced.
    Preserve,
    /// Protected words keep occurrences up to the dynamic threshold.
    Limit,
    /// Protection is ignored; the keep ratio applies to everything.
    Reduce,
}

/// Short-character (1-4 kana) repetition reduction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortCharRepetitionConfig {
    pub base_threshold: usize,
    /// Threshold grows by `length_factor` per this many characters of text.
    pub dynamic_threshold_divisor: usize,
    pub length_factor: usize,
    /// Fraction of above-threshold occurrences kept.
    pub keep_ratio: f64,
    pub particle_reduction_mode: ParticleReductionMode,
    /// Grammar particles that must survive cleaning.
    pub essential_particles: Vec<String>,
    /// Common short expressions that repeat legitimately (はい, ええ).
    pub common_expressions: Vec<String>,
}

impl Default for ShortCharRepetitionConfig {
    fn default() -> Self {
        Self {
            base_threshold: 6,
            dynamic_threshold_divisor: 1000,
            length_factor: 1,
            keep_ratio: 0.3,
            particle_reduction_mode: ParticleReductionMode::Limit,
            essential_particles: ["は", "が", "を", "に", "で", "と", "も", "の", "へ", "や"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            common_expressions: ["はい", "ええ", "うん", "そう", "なるほど"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// One phrase-length band for adjacent-repeat collapsing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PhraseRepetitionRange {
    pub min: usize,
    pub max: usize,
    /// Collapse when the unit repeats at least this many times in a row.
    pub threshold: usize,
}

/// Enumeration-loop collapsing (A、B、C、A、B、C …).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumerationConfig {
    pub enabled: bool,
    pub min_repeat_count: usize,
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_repeat_count: 3,
        }
    }
}

/// Sentence-level fingerprint guard against repeated paragraphs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParagraphRepeatConfig {
    pub enabled: bool,
    /// Fingerprint length: first N chars of each sentence, lowercased and
    /// whitespace-stripped.
    pub head_chars: usize,
    /// Sentences shorter than this are never fingerprint-dropped.
    pub min_sentence_length: usize,
}

impl Default for ParagraphRepeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            head_chars: 15,
            min_sentence_length: 10,
        }
    }
}

/// All repetition-related thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepetitionThresholds {
    pub short_char: ShortCharRepetitionConfig,
    pub medium_phrase_ranges: Vec<PhraseRepetitionRange>,
    /// Consecutive similar sentences beyond this collapse to one.
    pub sentence_repetition: usize,
    /// Char-inclusion similarity for sentence collapsing.
    pub sentence_similarity_threshold: f64,
    /// Sentences shorter than this never collapse.
    pub sentence_min_length: usize,
    pub enumeration: EnumerationConfig,
    pub paragraph_repeat: ParagraphRepeatConfig,
}

impl Default for RepetitionThresholds {
    fn default() -> Self {
        Self {
            short_char: ShortCharRepetitionConfig::default(),
            medium_phrase_ranges: vec![
                PhraseRepetitionRange {
                    min: 2,
                    max: 5,
                    threshold: 4,
                },
                PhraseRepetitionRange {
                    min: 6,
                    max: 15,
                    threshold: 3,
                },
                PhraseRepetitionRange {
                    min: 16,
                    max: 50,
                    threshold: 3,
                },
            ],
            sentence_repetition: 3,
            sentence_similarity_threshold: 0.85,
            sentence_min_length: 5,
            enumeration: EnumerationConfig::default(),
            paragraph_repeat: ParagraphRepeatConfig::default(),
        }
    }
}

/// Non-mutating Japanese validation thresholds and patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub min_text_length: usize,
    /// Plausible speech density band, characters per second of audio.
    pub min_chars_per_second: f64,
    pub max_chars_per_second: f64,
    /// Same-character run length reported as suspicious.
    pub char_repetition_threshold: usize,
    pub incomplete_particle_patterns: Vec<String>,
    pub merged_word_patterns: Vec<String>,
    /// Script-ratio ceilings for mixed writing-system checks.
    pub max_katakana_ratio: f64,
    pub max_latin_ratio: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_text_length: 10,
            min_chars_per_second: 0.5,
            max_chars_per_second: 12.0,
            char_repetition_threshold: 10,
            incomplete_particle_patterns: vec![
                // Sentence ends dangling on a case particle
                r"[はがをにでとも]\s*$".to_string(),
                r"[はがをにでとも]。".to_string(),
            ],
            merged_word_patterns: vec![
                // Latin glued directly onto kana with no boundary
                r"[a-zA-Z]{3,}[ぁ-ん]{1,2}[a-zA-Z]{3,}".to_string(),
            ],
            max_katakana_ratio: 0.9,
            max_latin_ratio: 0.8,
        }
    }
}

/// Prompt-contamination scrubbing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContaminationConfig {
    pub remove_xml_tags: bool,
    pub aggressive_mode: bool,
    /// Paired tags removed with their content.
    pub complete_xml_tags: Vec<String>,
    /// Tags removed together with the sentence they sit in.
    pub sentence_bounded_tags: Vec<String>,
    /// Tags removed together with their whole line.
    pub line_bounded_tags: Vec<String>,
    /// Bare tags removed alone.
    pub standalone_tags: Vec<String>,
    /// Instruction snippets stripped when the text starts with them.
    pub instruction_prompts: Vec<String>,
    /// Context-marker regexes removed anywhere.
    pub context_patterns: Vec<String>,
    /// Prefix lengths tried when hunting truncated prompt echoes.
    pub truncated_prompt_lengths: Vec<usize>,
}

impl Default for ContaminationConfig {
    fn default() -> Self {
        Self {
            remove_xml_tags: true,
            aggressive_mode: false,
            complete_xml_tags: vec![
                r"<前回終了箇所>[\s\S]*?</前回終了箇所>".to_string(),
                r"<context>[\s\S]*?</context>".to_string(),
                r"<transcript>[\s\S]*?</transcript>".to_string(),
                r"<instructions>[\s\S]*?</instructions>".to_string(),
            ],
            sentence_bounded_tags: vec![
                r"[^。.!?！？\n]*</?前回終了箇所>[^。.!?！？\n]*[。.!?！？]?".to_string(),
            ],
            line_bounded_tags: vec![r"^.*</?(?:context|transcript)>.*$".to_string()],
            standalone_tags: vec![r"</?[A-Za-z_][^>]*>".to_string()],
            instruction_prompts: vec![
                "以下の音声を文字起こししてください。".to_string(),
                "前回の続きから文字起こしを続けてください。".to_string(),
                "Transcribe the following audio.".to_string(),
                "Continue the transcription from the previous ending.".to_string(),
            ],
            context_patterns: vec![
                r#"Context:\s*"[^"]*""#.to_string(),
                r"前回終了箇所[:：][^\n]*".to_string(),
            ],
            truncated_prompt_lengths: vec![10, 15, 20, 30],
        }
    }
}

/// Tail-loop collapse configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailRepeatConfig {
    /// Paragraph blocks inspected at the end of the transcript.
    pub max_tail_paragraphs: usize,
    /// Timestamp blocks inspected by the timestamped variant.
    pub max_tail_blocks: usize,
    /// Largest repeating unit size tried, in blocks.
    pub max_unit: usize,
    pub min_repeat_count: usize,
    pub similarity_threshold: f64,
}

impl Default for TailRepeatConfig {
    fn default() -> Self {
        Self {
            max_tail_paragraphs: 6,
            max_tail_blocks: 10,
            max_unit: 3,
            min_repeat_count: 3,
            similarity_threshold: 0.9,
        }
    }
}

/// Post-pipeline sanity gates that trigger a safer re-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineFallbackConfig {
    pub min_expected_content_ratio: f64,
    pub min_final_text_length: usize,
    pub min_audio_duration_seconds: f64,
}

impl Default for PipelineFallbackConfig {
    fn default() -> Self {
        Self {
            min_expected_content_ratio: 0.1,
            min_final_text_length: 50,
            min_audio_duration_seconds: 60.0,
        }
    }
}

/// Complete cleaning strategy for one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningStrategy {
    pub pipeline_type: PipelineType,
    /// Overall reduction ceiling across the full pipeline.
    pub max_reduction_ratio: f64,
    pub safety: SafetyThresholds,
    pub hallucination: HallucinationPatterns,
    pub repetition: RepetitionThresholds,
    pub validation: ValidationConfig,
    pub contamination: ContaminationConfig,
    pub tail_repeat: TailRepeatConfig,
    pub pipeline_fallback: PipelineFallbackConfig,
}

impl CleaningStrategy {
    /// Immutable strategy snapshot for a model.
    pub fn for_model(model: ModelId) -> &'static CleaningStrategy {
        &STRATEGY_REGISTRY[&model]
    }

    /// Compile every configured pattern, failing on the first bad one.
    /// Called at startup so config errors surface before any request.
    pub fn validate_patterns(&self) -> Result<(), ConfigError> {
        for language in [
            Language::Japanese,
            Language::English,
            Language::Chinese,
            Language::Korean,
        ] {
            self.hallucination.compile(language)?;
        }
        for (scope, set) in [
            ("contamination.complete_xml_tags", &self.contamination.complete_xml_tags),
            ("contamination.sentence_bounded_tags", &self.contamination.sentence_bounded_tags),
            ("contamination.line_bounded_tags", &self.contamination.line_bounded_tags),
            ("contamination.standalone_tags", &self.contamination.standalone_tags),
            ("contamination.context_patterns", &self.contamination.context_patterns),
            ("validation.incomplete_particles", &self.validation.incomplete_particle_patterns),
            ("validation.merged_words", &self.validation.merged_word_patterns),
        ] {
            for source in set {
                CompiledPattern::compile(scope, source)?;
            }
        }
        Ok(())
    }

    fn default_hallucination_patterns() -> HallucinationPatterns {
        HallucinationPatterns {
            // Repetition patterns capture the repeating unit so collapsing
            // keeps exactly one copy; plain phrase patterns are removed
            // outright.
            japanese: vec![
                r"(ご視聴ありがとうございました[。、]?\s*){2,}".to_string(),
                r"(ご清聴ありがとうございました[。、]?\s*){2,}".to_string(),
                r"(ありがとうございます[。、]?\s*){8,}".to_string(),
                r"(ありがとうございました[。、]?\s*){8,}".to_string(),
                r"(チャンネル登録(?:を)?お願い(?:いた)?します[。、]?\s*){2,}".to_string(),
                r"(チャンネル登録と高評価(?:を)?お願いします[。、]?\s*){2,}".to_string(),
                r"(おやすみなさい[。、]?\s*){3,}".to_string(),
                r"(最後までご視聴いただきありがとうございました[。、]?\s*){2,}".to_string(),
                r"ご視聴ありがとうございました[。]?$".to_string(),
                r"字幕(?:は|作成[:：]?)[^\n。]{1,30}(?:が作成しました|提供)[。]?".to_string(),
            ],
            english: vec![
                r"(?i)(thanks for watching[.!]?\s*){2,}".to_string(),
                r"(?i)(please subscribe[.!]?\s*){2,}".to_string(),
                r"(?i)(don'?t forget to like and subscribe[.!]?\s*){2,}".to_string(),
                r"(?i)(see you (?:in the )?next (?:time|video)[.!]?\s*){2,}".to_string(),
                r"(?i)thank you for watching[.!]?\s*$".to_string(),
                r"(?i)\(?subtitles? (?:by|created by) [^)\n]{1,40}\)?[.]?".to_string(),
            ],
            chinese: vec![
                r"(谢谢(?:大家)?观看[。!！]?\s*){2,}".to_string(),
                r"(请订阅[。!！]?\s*){2,}".to_string(),
                r"字幕由[^\n。]{1,30}提供[。]?".to_string(),
            ],
            korean: vec![
                r"(시청해\s*주셔서\s*감사합니다[.!]?\s*){2,}".to_string(),
                r"(구독\s*부탁드립니다[.!]?\s*){2,}".to_string(),
            ],
        }
    }

    fn whisper() -> Self {
        Self {
            pipeline_type: PipelineType::Whisper,
            max_reduction_ratio: 0.5,
            safety: SafetyThresholds::default(),
            hallucination: Self::default_hallucination_patterns(),
            repetition: RepetitionThresholds::default(),
            validation: ValidationConfig::default(),
            contamination: ContaminationConfig::default(),
            tail_repeat: TailRepeatConfig::default(),
            pipeline_fallback: PipelineFallbackConfig::default(),
        }
    }

    fn gpt4o() -> Self {
        Self {
            pipeline_type: PipelineType::Gpt4o,
            // GPT-class models hallucinate less but echo prompts more; the
            // contamination stage runs first and the overall ceiling is lower.
            max_reduction_ratio: 0.4,
            safety: SafetyThresholds {
                warning_threshold: 0.25,
                ..SafetyThresholds::default()
            },
            hallucination: Self::default_hallucination_patterns(),
            repetition: RepetitionThresholds::default(),
            validation: ValidationConfig::default(),
            contamination: ContaminationConfig::default(),
            tail_repeat: TailRepeatConfig::default(),
            pipeline_fallback: PipelineFallbackConfig::default(),
        }
    }
}

static STRATEGY_REGISTRY: Lazy<HashMap<ModelId, CleaningStrategy>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert(ModelId::Whisper, CleaningStrategy::whisper());
    map.insert(ModelId::WhisperTs, CleaningStrategy::whisper());
    map.insert(ModelId::Gpt4o, CleaningStrategy::gpt4o());
    map.insert(ModelId::Gpt4oMini, CleaningStrategy::gpt4o());
    map
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_default_patterns_compile() {
        for model in ModelId::ALL {
            CleaningStrategy::for_model(model)
                .validate_patterns()
                .expect("default patterns must compile");
        }
    }

    #[test]
    fn test_repetition_pattern_classification() {
        assert!(is_repetition_pattern(r"(?:ありがとうございます[。、]?\s*){8,}"));
        assert!(is_repetition_pattern(r"(?:abc){2,5}"));
        assert!(!is_repetition_pattern(r"ご視聴ありがとうございました[。]?$"));
    }

    #[test]
    fn test_auto_language_unions_with_japanese_first() {
        let strategy = CleaningStrategy::for_model(ModelId::Whisper);
        let auto = strategy.hallucination.compile(Language::Auto).unwrap();
        let japanese = strategy.hallucination.compile(Language::Japanese).unwrap();
        assert!(auto.len() > japanese.len());
        assert_eq!(auto[0].source, japanese[0].source);
    }

    #[test]
    fn test_bad_pattern_reports_scope() {
        let mut strategy = CleaningStrategy::whisper();
        strategy.contamination.context_patterns.push("([unclosed".to_string());
        let err = strategy.validate_patterns().unwrap_err();
        assert!(err.to_string().contains("context_patterns"));
    }

    #[test]
    fn test_language_parsing() {
        assert_eq!(Language::parse("ja"), Language::Japanese);
        assert_eq!(Language::parse("en"), Language::English);
        assert_eq!(Language::parse("auto"), Language::Auto);
        assert_eq!(Language::parse("??"), Language::Auto);
    }
}
