//! User-facing message catalogue
//!
//! The engine emits a handful of user-visible strings (partial-result
//! header, cancellation notice, failure report). Full i18n belongs to the
//! host; this table covers Japanese (the primary audience) and English.

use crate::config::Language;

fn is_japanese(language: Language) -> bool {
    matches!(language, Language::Japanese | Language::Auto)
}

/// Header prepended to a partial transcript.
pub fn partial_result_header(language: Language) -> &'static str {
    if is_japanese(language) {
        "⚠️ 部分的な文字起こし結果"
    } else {
        "⚠️ Partial transcription result"
    }
}

/// `processed/total` summary line under the partial header.
pub fn partial_summary(language: Language, processed: usize, total: usize) -> String {
    if is_japanese(language) {
        format!("{}/{} チャンクを処理済み", processed, total)
    } else {
        format!("Processed {}/{} chunks", processed, total)
    }
}

/// Returned when cancellation fired before any chunk finished.
pub fn cancelled_notice(language: Language) -> &'static str {
    if is_japanese(language) {
        "文字起こしはキャンセルされました。"
    } else {
        "Transcription was cancelled."
    }
}

/// Placeholder text carried by a failed chunk result.
pub fn chunk_failed_placeholder(language: Language, chunk_id: usize) -> String {
    if is_japanese(language) {
        format!("[チャンク{}の文字起こしに失敗しました]", chunk_id + 1)
    } else {
        format!("[Transcription failed for chunk {}]", chunk_id + 1)
    }
}

/// Heading of the failed-chunk appendix.
pub fn failure_report_heading(language: Language) -> &'static str {
    if is_japanese(language) {
        "失敗したチャンク:"
    } else {
        "Failed chunks:"
    }
}

/// One line of the failed-chunk appendix.
pub fn failure_report_line(
    language: Language,
    chunk_id: usize,
    range: &str,
    error: &str,
) -> String {
    if is_japanese(language) {
        format!("- チャンク{} ({}): {}", chunk_id + 1, range, error)
    } else {
        format!("- Chunk {} ({}): {}", chunk_id + 1, range, error)
    }
}

/// Returned when every chunk failed and nothing could be merged.
pub fn all_chunks_failed(language: Language) -> &'static str {
    if is_japanese(language) {
        "すべてのチャンクの文字起こしに失敗しました。"
    } else {
        "Transcription failed for all chunks."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_japanese_is_default_for_auto() {
        assert_eq!(
            partial_result_header(Language::Auto),
            partial_result_header(Language::Japanese)
        );
    }

    #[test]
    fn test_summary_contains_counts() {
        let summary = partial_summary(Language::English, 4, 5);
        assert!(summary.contains("4/5"));
        let summary_ja = partial_summary(Language::Japanese, 4, 5);
        assert!(summary_ja.contains("4/5"));
    }

    #[test]
    fn test_placeholder_is_one_based() {
        assert!(chunk_failed_placeholder(Language::English, 0).contains("chunk 1"));
    }
}
