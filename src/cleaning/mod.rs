//! Text cleaning pipeline
//!
//! An ordered stack of cleaners runs over the merged transcript. Every
//! cleaner is a pure function of (text, language, context) returning the
//! cleaned text plus a reduction report; nothing a cleaner does can abort
//! the pipeline. The runner enforces the model's reduction ceilings against
//! the pipeline's *original* input, so a chain of individually-safe stages
//! cannot quietly eat the transcript.

pub mod contamination;
pub mod hallucination;
pub mod repetition;
pub mod tail;
pub mod validator;

pub use contamination::PromptContaminationCleaner;
pub use hallucination::BaseHallucinationCleaner;
pub use tail::{TailRepeatCleaner, TimestampsTailRepeatCleaner};
pub use validator::JapaneseTextValidator;

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{CleaningStrategy, ConfigError, Language, ModelId, PipelineType};

/// Issue classification. The first four kinds are critical: with
/// `stop_on_critical_issue` set they halt the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueKind {
    ExcessiveRemoval,
    ExtremeReduction,
    EncodingIssue,
    ReplacementCharacter,
    Warning,
    Validation,
    CleanerError,
}

impl IssueKind {
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            IssueKind::ExcessiveRemoval
                | IssueKind::ExtremeReduction
                | IssueKind::EncodingIssue
                | IssueKind::ReplacementCharacter
        )
    }
}

/// One reported problem from a cleaning stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningIssue {
    pub kind: IssueKind,
    pub message: String,
}

impl CleaningIssue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Reduction report for one cleaner invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningMetadata {
    pub original_length: usize,
    pub cleaned_length: usize,
    pub reduction_ratio: f64,
    pub patterns_matched: Vec<String>,
}

/// Output of one cleaner.
#[derive(Debug, Clone)]
pub struct CleaningResult {
    pub cleaned_text: String,
    pub issues: Vec<CleaningIssue>,
    pub has_significant_changes: bool,
    pub metadata: CleaningMetadata,
}

impl CleaningResult {
    /// Build a result from before/after text, computing the metadata.
    pub fn from_change(
        input: &str,
        cleaned_text: String,
        issues: Vec<CleaningIssue>,
        patterns_matched: Vec<String>,
    ) -> Self {
        let original_length = input.chars().count();
        let cleaned_length = cleaned_text.chars().count();
        let reduction_ratio = if original_length > 0 {
            (original_length as f64 - cleaned_length as f64) / original_length as f64
        } else {
            0.0
        };
        Self {
            has_significant_changes: cleaned_length != original_length,
            cleaned_text,
            issues,
            metadata: CleaningMetadata {
                original_length,
                cleaned_length,
                reduction_ratio,
                patterns_matched,
            },
        }
    }

    /// A no-change passthrough result.
    pub fn unchanged(text: &str) -> Self {
        Self::from_change(text, text.to_string(), Vec::new(), Vec::new())
    }
}

/// Request context threaded through the pipeline.
#[derive(Debug, Clone, Default)]
pub struct CleaningContext {
    /// Character length of the pipeline's original input.
    pub original_length: usize,
    /// Source audio duration when known, for density validation.
    pub audio_duration: Option<f64>,
    /// Whether the transcript carries timestamp-formatted blocks.
    pub has_segments: bool,
}

/// A cleaning stage. Implementations must never panic for ordinary inputs;
/// the runner additionally contains panics so one stage cannot take down
/// the pipeline.
pub trait TextCleaner: Send + Sync {
    fn name(&self) -> &'static str;
    fn clean(&self, text: &str, language: Language, context: &CleaningContext) -> CleaningResult;
}

/// Per-stage record in the pipeline report.
#[derive(Debug)]
pub struct StageReport {
    pub cleaner: &'static str,
    pub result: CleaningResult,
}

/// Full pipeline outcome.
#[derive(Debug)]
pub struct PipelineResult {
    pub final_text: String,
    pub stages: Vec<StageReport>,
    /// Reduction of the final text against the pipeline input.
    pub total_reduction_ratio: f64,
    pub stopped_early: bool,
}

impl PipelineResult {
    pub fn issues(&self) -> impl Iterator<Item = &CleaningIssue> {
        self.stages.iter().flat_map(|s| s.result.issues.iter())
    }
}

/// Cleaning pipeline errors (construction time only; running never fails).
#[derive(Debug, Error)]
pub enum CleaningError {
    #[error("Cleaner construction failed: {0}")]
    Construction(#[from] ConfigError),
}

/// Ordered cleaner stack with safety rails.
pub struct CleaningPipeline {
    cleaners: Vec<Box<dyn TextCleaner>>,
    strategy: &'static CleaningStrategy,
    stop_on_critical_issue: bool,
}

impl CleaningPipeline {
    /// Pre-assembled pipeline for a model.
    ///
    /// - Whisper class: hallucination removal, tail-repeat collapse (both
    ///   timestamped and plain), then validation.
    /// - GPT class: prompt contamination first, then hallucinations, then
    ///   validation for Japanese-capable requests.
    /// - Standard: empty, extended programmatically via [`Self::push`].
    pub fn for_model(model: ModelId) -> Result<Self, CleaningError> {
        let strategy = CleaningStrategy::for_model(model);
        let mut pipeline = Self {
            cleaners: Vec::new(),
            strategy,
            stop_on_critical_issue: true,
        };

        match strategy.pipeline_type {
            PipelineType::Whisper => {
                pipeline.push(Box::new(BaseHallucinationCleaner::new(strategy)?));
                pipeline.push(Box::new(TimestampsTailRepeatCleaner::new(&strategy.tail_repeat)));
                pipeline.push(Box::new(TailRepeatCleaner::new(&strategy.tail_repeat)));
                pipeline.push(Box::new(JapaneseTextValidator::new(&strategy.validation)?));
            }
            PipelineType::Gpt4o => {
                pipeline.push(Box::new(PromptContaminationCleaner::new(strategy)?));
                pipeline.push(Box::new(BaseHallucinationCleaner::new(strategy)?));
                pipeline.push(Box::new(JapaneseTextValidator::new(&strategy.validation)?));
            }
            PipelineType::Standard => {}
        }

        Ok(pipeline)
    }

    /// Empty pipeline with a model's safety strategy, for programmatic
    /// assembly.
    pub fn standard(model: ModelId) -> Self {
        Self {
            cleaners: Vec::new(),
            strategy: CleaningStrategy::for_model(model),
            stop_on_critical_issue: true,
        }
    }

    pub fn push(&mut self, cleaner: Box<dyn TextCleaner>) {
        self.cleaners.push(cleaner);
    }

    pub fn set_stop_on_critical_issue(&mut self, stop: bool) {
        self.stop_on_critical_issue = stop;
    }

    /// Run all stages over `text`.
    pub fn run(
        &self,
        text: &str,
        language: Language,
        audio_duration: Option<f64>,
    ) -> PipelineResult {
        let original_length = text.chars().count();
        let context = CleaningContext {
            original_length,
            audio_duration,
            has_segments: text.lines().any(|l| l.starts_with('[') && l.contains("] ")),
        };

        let mut current = text.to_string();
        let mut stages = Vec::with_capacity(self.cleaners.len());
        let mut stopped_early = false;

        for cleaner in &self.cleaners {
            let input = current.clone();
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                cleaner.clean(&input, language, &context)
            }));

            let mut result = match outcome {
                Ok(result) => result,
                Err(_) => {
                    // A stage blew up; keep its input and move on.
                    warn!("Cleaner {} panicked, keeping prior text", cleaner.name());
                    let mut result = CleaningResult::unchanged(&input);
                    result.issues.push(CleaningIssue::new(
                        IssueKind::CleanerError,
                        format!("{} failed internally", cleaner.name()),
                    ));
                    result
                }
            };

            // Reduction against the pipeline original decides emergency
            // rollback, not the stage-local ratio.
            let cleaned_length = result.cleaned_text.chars().count();
            let total_reduction = if original_length > 0 {
                (original_length as f64 - cleaned_length as f64) / original_length as f64
            } else {
                0.0
            };

            if result.cleaned_text.trim().is_empty() && !input.trim().is_empty() {
                result.issues.push(CleaningIssue::new(
                    IssueKind::ExcessiveRemoval,
                    format!("{} emptied the transcript, reverting stage", cleaner.name()),
                ));
                result.cleaned_text = input.clone();
            } else if total_reduction > self.strategy.safety.emergency_fallback_threshold {
                result.issues.push(CleaningIssue::new(
                    IssueKind::ExtremeReduction,
                    format!(
                        "{} pushed total reduction to {:.0}%, reverting stage",
                        cleaner.name(),
                        total_reduction * 100.0
                    ),
                ));
                result.cleaned_text = input.clone();
            }

            // Keep the metadata honest if the stage output was reverted.
            result.metadata.cleaned_length = result.cleaned_text.chars().count();
            result.metadata.reduction_ratio = if result.metadata.original_length > 0 {
                (result.metadata.original_length as f64 - result.metadata.cleaned_length as f64)
                    / result.metadata.original_length as f64
            } else {
                0.0
            };

            let critical = result.issues.iter().any(|i| i.kind.is_critical());
            current = result.cleaned_text.clone();
            debug!(
                "Stage {}: {} -> {} chars, {} issue(s)",
                cleaner.name(),
                result.metadata.original_length,
                result.metadata.cleaned_length,
                result.issues.len()
            );
            stages.push(StageReport {
                cleaner: cleaner.name(),
                result,
            });

            if critical && self.stop_on_critical_issue {
                warn!("Critical cleaning issue, stopping pipeline early");
                stopped_early = true;
                break;
            }
        }

        // An empty or invalid final result returns the original text.
        if current.trim().is_empty() && !text.trim().is_empty() {
            current = text.to_string();
        }

        let final_length = current.chars().count();
        PipelineResult {
            total_reduction_ratio: if original_length > 0 {
                (original_length as f64 - final_length as f64) / original_length as f64
            } else {
                0.0
            },
            final_text: current,
            stages,
            stopped_early,
        }
    }
}
