//! Overlap-aware transcript merger
//!
//! Orders chunk results by start time, removes the text duplicated by chunk
//! overlap at each boundary, optionally deduplicates across the whole
//! transcript, and appends a failure report when some chunks did not make
//! it.

pub mod dedup;
pub mod overlap;
pub mod segments;

pub use overlap::{remove_overlap, OverlapOutcome};
pub use segments::{format_clock, format_timestamped, merge_segments, parse_timestamped};

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{Language, ModelConfig};
use crate::dispatch::types::{TranscriptionResult, TranscriptionSegment};
use crate::messages;

/// Merge output: final text plus the merged segment list when available.
#[derive(Debug, Clone)]
pub struct MergedTranscript {
    pub text: String,
    pub segments: Option<Vec<TranscriptionSegment>>,
}

/// Merger errors
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Malformed result set: {message}")]
    MalformedInput { message: String },
}

/// Overlap-aware merger for one model's results.
pub struct TranscriptMerger {
    config: &'static ModelConfig,
    language: Language,
    /// Emit `[M:SS → M:SS]` formatted text when segments are available.
    timestamp_output: bool,
}

impl TranscriptMerger {
    pub fn new(config: &'static ModelConfig, language: Language, timestamp_output: bool) -> Self {
        Self {
            config,
            language,
            timestamp_output,
        }
    }

    /// Merge chunk results into a single transcript.
    pub fn merge(&self, results: &[TranscriptionResult]) -> Result<MergedTranscript, MergeError> {
        let mut valid: Vec<&TranscriptionResult> = results.iter().filter(|r| r.success).collect();
        let failed: Vec<&TranscriptionResult> = results.iter().filter(|r| !r.success).collect();

        if valid.is_empty() && failed.is_empty() {
            return Ok(MergedTranscript {
                text: String::new(),
                segments: None,
            });
        }

        if valid.is_empty() {
            return Ok(MergedTranscript {
                text: format!(
                    "{}\n\n{}",
                    messages::all_chunks_failed(self.language),
                    self.failure_report(&failed)
                ),
                segments: None,
            });
        }

        for result in &valid {
            if result.end_time < result.start_time {
                return Err(MergeError::MalformedInput {
                    message: format!(
                        "chunk {} has end {:.2} before start {:.2}",
                        result.id, result.end_time, result.start_time
                    ),
                });
            }
        }

        valid.sort_by(|a, b| {
            a.start_time
                .partial_cmp(&b.start_time)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let duplicate_removal = &self.config.merging.duplicate_removal;
        let all_have_segments = valid.iter().all(|r| r.segments.is_some());
        let merged_segments = if all_have_segments {
            let mut segments = merge_segments(&valid, &self.config.merging);
            if duplicate_removal.enabled {
                // Segment-scoped: a removal range crossing a segment
                // boundary would detach text from its timestamps.
                // Cross-segment repeats are the timestamped tail cleaner's
                // territory.
                for segment in &mut segments {
                    segment.text = dedup::remove_duplicates(&segment.text, duplicate_removal);
                }
            }
            Some(segments)
        } else {
            None
        };

        let mut text = if self.timestamp_output && all_have_segments {
            format_timestamped(merged_segments.as_deref().unwrap_or(&[]))
        } else {
            let merged = self.merge_text(&valid);
            if duplicate_removal.enabled {
                dedup::remove_duplicates(&merged, duplicate_removal)
            } else {
                merged
            }
        };

        if !failed.is_empty() {
            text = format!("{}\n\n{}", text, self.failure_report(&failed));
        }

        Ok(MergedTranscript {
            text,
            segments: merged_segments,
        })
    }

    /// Plain-text path: remove boundary overlap pair by pair.
    fn merge_text(&self, sorted: &[&TranscriptionResult]) -> String {
        let mut accumulated = sorted[0].text.trim().to_string();
        let mut previous_start = sorted[0].start_time;
        let mut previous_end = sorted[0].end_time;

        for current in &sorted[1..] {
            let declared_overlap = (previous_end.min(current.end_time)
                - previous_start.max(current.start_time))
            .max(0.0);

            let outcome = remove_overlap(
                &accumulated,
                current.text.trim(),
                declared_overlap,
                &self.config.merging,
            );

            if outcome.matched {
                if outcome.text.is_empty() {
                    debug!("Chunk {} fully absorbed by overlap removal", current.id);
                } else {
                    accumulated.push_str(outcome.connector);
                    accumulated.push_str(&outcome.text);
                }
            } else {
                if declared_overlap > 0.0 {
                    warn!(
                        "Declared {:.1}s overlap between chunks produced no text match, joining with separator",
                        declared_overlap
                    );
                }
                if !outcome.text.is_empty() {
                    accumulated.push_str(&self.config.merging.separator);
                    accumulated.push_str(&outcome.text);
                }
            }

            previous_start = current.start_time;
            previous_end = previous_end.max(current.end_time);
        }

        accumulated
    }

    /// Localized appendix listing failed chunks with their time ranges.
    fn failure_report(&self, failed: &[&TranscriptionResult]) -> String {
        let mut lines = vec![messages::failure_report_heading(self.language).to_string()];
        for result in failed {
            let range = format!(
                "{}−{}",
                format_clock(result.start_time),
                format_clock(result.end_time)
            );
            let error = result.error.as_deref().unwrap_or("unknown error");
            lines.push(messages::failure_report_line(
                self.language,
                result.id,
                &range,
                error,
            ));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelId;

    fn ok(id: usize, text: &str, start: f64, end: f64) -> TranscriptionResult {
        TranscriptionResult {
            id,
            text: text.to_string(),
            start_time: start,
            end_time: end,
            success: true,
            error: None,
            segments: None,
            confidence: None,
            language: None,
        }
    }

    fn fail(id: usize, start: f64, end: f64) -> TranscriptionResult {
        TranscriptionResult {
            id,
            text: "[failed]".to_string(),
            start_time: start,
            end_time: end,
            success: false,
            error: Some("boom".to_string()),
            segments: None,
            confidence: None,
            language: None,
        }
    }

    fn merger() -> TranscriptMerger {
        TranscriptMerger::new(
            ModelConfig::for_model(ModelId::Gpt4o),
            Language::Japanese,
            false,
        )
    }

    #[test]
    fn test_empty_input() {
        let merged = merger().merge(&[]).unwrap();
        assert!(merged.text.is_empty());
    }

    #[test]
    fn test_single_chunk_passthrough() {
        let merged = merger()
            .merge(&[ok(0, "  一つだけの結果です。  ", 0.0, 30.0)])
            .unwrap();
        assert_eq!(merged.text, "一つだけの結果です。");
    }

    #[test]
    fn test_two_chunks_with_exact_overlap() {
        let results = [
            ok(0, "これはテストです。今日はとても良い天気で晴れです。", 0.0, 33.0),
            ok(1, "今日はとても良い天気で晴れです。明日は雨です。", 30.0, 60.0),
        ];
        let merged = merger().merge(&results).unwrap();
        assert_eq!(
            merged.text,
            "これはテストです。今日はとても良い天気で晴れです。明日は雨です。"
        );
    }

    #[test]
    fn test_two_chunks_no_overlap_joined_with_separator() {
        let results = [
            ok(0, "前半の全く独立した内容です。", 0.0, 30.0),
            ok(1, "後半の全く独立した内容です。", 30.0, 60.0),
        ];
        let merged = merger().merge(&results).unwrap();
        assert_eq!(
            merged.text,
            "前半の全く独立した内容です。\n\n後半の全く独立した内容です。"
        );
    }

    #[test]
    fn test_out_of_order_results_sorted_by_start() {
        let results = [
            ok(1, "後半の全く独立した内容です。", 30.0, 60.0),
            ok(0, "前半の全く独立した内容です。", 0.0, 30.0),
        ];
        let merged = merger().merge(&results).unwrap();
        assert!(merged.text.starts_with("前半"));
    }

    #[test]
    fn test_all_failed_produces_report() {
        let merged = merger().merge(&[fail(0, 0.0, 30.0), fail(1, 30.0, 60.0)]).unwrap();
        assert!(merged.text.contains("すべてのチャンク"));
        assert!(merged.text.contains("0:00−0:30"));
        assert!(merged.text.contains("boom"));
    }

    #[test]
    fn test_partial_failure_appends_report() {
        let results = [
            ok(0, "成功したチャンクの本文です。", 0.0, 30.0),
            fail(1, 30.0, 60.0),
        ];
        let merged = merger().merge(&results).unwrap();
        assert!(merged.text.starts_with("成功したチャンクの本文です。"));
        assert!(merged.text.contains("失敗したチャンク:"));
        assert!(merged.text.contains("0:30−1:00"));
    }

    #[test]
    fn test_malformed_timing_is_error() {
        let mut bad = ok(0, "text", 10.0, 5.0);
        bad.end_time = 5.0;
        assert!(matches!(
            merger().merge(&[bad]),
            Err(MergeError::MalformedInput { .. })
        ));
    }

    #[test]
    fn test_timestamp_output_mode() {
        let make = |id: usize, text: &str, start: f64, end: f64| {
            let mut result = ok(id, text, start, end);
            result.segments = Some(vec![TranscriptionSegment {
                text: text.to_string(),
                start,
                end,
                words: None,
            }]);
            result
        };
        let merger = TranscriptMerger::new(
            ModelConfig::for_model(ModelId::WhisperTs),
            Language::Japanese,
            true,
        );
        let merged = merger
            .merge(&[make(0, "最初の部分", 0.0, 30.0), make(1, "次の部分", 30.0, 65.0)])
            .unwrap();

        assert_eq!(merged.text, "[0:00 → 0:30] 最初の部分\n[0:30 → 1:05] 次の部分");
        assert_eq!(merged.segments.unwrap().len(), 2);
    }

    #[test]
    fn test_timestamp_mode_dedups_within_segments() {
        // WhisperTs carries duplicate_removal.enabled; a passage repeated
        // inside one segment is removed while the timestamp line structure
        // stays intact. The passage is longer than the dedup window so a
        // full comparison window fits inside the repeat.
        let passage = "この長い一節はセグメントの中で全く同じ形のままもう一度繰り返されてしまいます。";
        let looped = format!("{passage}間に挟まる別の文章です。{passage}");

        let mut result = ok(0, "", 0.0, 60.0);
        result.segments = Some(vec![
            TranscriptionSegment {
                text: looped,
                start: 0.0,
                end: 45.0,
                words: None,
            },
            TranscriptionSegment {
                text: "最後のセグメントです。".to_string(),
                start: 45.0,
                end: 60.0,
                words: None,
            },
        ]);

        let merger = TranscriptMerger::new(
            ModelConfig::for_model(ModelId::WhisperTs),
            Language::Japanese,
            true,
        );
        let merged = merger.merge(&[result]).unwrap();

        assert_eq!(merged.text.matches(passage).count(), 1);
        assert!(merged.text.contains("間に挟まる別の文章です。"));

        let segments = merged.segments.unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text.matches(passage).count(), 1);

        let lines: Vec<&str> = merged.text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[0:00 → 0:45] "));
        assert!(lines[1].starts_with("[0:45 → 1:00] "));
    }
}
