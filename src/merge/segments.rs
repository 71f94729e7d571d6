//! Timestamp-aware segment merging and formatting
//!
//! When every chunk result carries segments, merging happens on the segment
//! timeline instead of raw text: sort by start, drop duplicated segments
//! inside the overlap window, join time-overlapping ones, and optionally
//! render the `[M:SS → M:SS] text` line format.

use crate::config::MergingConfig;
use crate::dispatch::types::{TranscriptionResult, TranscriptionSegment};

/// Collect, sort, and deduplicate the segments of all results.
pub fn merge_segments(
    results: &[&TranscriptionResult],
    config: &MergingConfig,
) -> Vec<TranscriptionSegment> {
    let mut segments: Vec<TranscriptionSegment> = results
        .iter()
        .filter_map(|r| r.segments.as_ref())
        .flatten()
        .cloned()
        .collect();

    segments.sort_by(|a, b| {
        a.start
            .partial_cmp(&b.start)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut merged: Vec<TranscriptionSegment> = Vec::with_capacity(segments.len());

    for segment in segments {
        let Some(previous) = merged.last_mut() else {
            merged.push(segment);
            continue;
        };

        // Identical text close in time is the overlap region transcribed
        // twice.
        let same_text = previous.text.trim() == segment.text.trim();
        if same_text && (segment.start - previous.start).abs() <= config.duplicate_window_seconds {
            previous.end = previous.end.max(segment.end);
            continue;
        }

        let time_overlap = previous.end - segment.start;
        if time_overlap > 0.0 {
            let duration = segment.end - segment.start;
            let overlap_fraction = if duration > 0.0 {
                time_overlap / duration
            } else {
                1.0
            };

            if overlap_fraction >= config.overlap_threshold {
                // Heavy overlap: extend the previous segment and join text.
                previous.end = previous.end.max(segment.end);
                if !same_text {
                    previous.text = format!("{} {}", previous.text.trim(), segment.text.trim());
                }
                continue;
            }
        }

        merged.push(segment);
    }

    merged
}

/// Render segments as `[M:SS → M:SS] text`, one per line. Line endings are
/// normalized to LF and whitespace inside each segment is collapsed.
pub fn format_timestamped(segments: &[TranscriptionSegment]) -> String {
    segments
        .iter()
        .map(|segment| {
            format!(
                "[{} → {}] {}",
                format_clock(segment.start),
                format_clock(segment.end),
                collapse_whitespace(&segment.text)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse the formatted output back into segments (round-trip verification).
pub fn parse_timestamped(text: &str) -> Vec<TranscriptionSegment> {
    text.lines()
        .filter_map(|line| {
            let rest = line.strip_prefix('[')?;
            let (times, content) = rest.split_once("] ")?;
            let (start, end) = times.split_once(" → ")?;
            Some(TranscriptionSegment {
                text: content.to_string(),
                start: parse_clock(start)?,
                end: parse_clock(end)?,
                words: None,
            })
        })
        .collect()
}

/// `M:SS` with unpadded minutes and two-digit seconds.
pub fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

fn parse_clock(text: &str) -> Option<f64> {
    let (minutes, seconds) = text.split_once(':')?;
    Some(minutes.parse::<u64>().ok()? as f64 * 60.0 + seconds.parse::<u64>().ok()? as f64)
}

fn collapse_whitespace(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
