//! Unicode normalization for fuzzy text comparison
//!
//! Transcription models disagree on width (ｱ vs ア), kana script (カ vs か),
//! casing, and punctuation across chunk boundaries. Comparisons in the merger
//! and cleaners therefore run on a normalized character stream: NFKC,
//! lowercased, katakana folded to hiragana, with whitespace, punctuation, and
//! format controls removed. An index map carries every normalized character
//! back to its byte offset in the original string so match positions can be
//! translated into trim offsets.

use unicode_normalization::UnicodeNormalization;

/// Normalized character stream with a map back to original byte offsets.
///
/// `index_map[i]` is the byte offset in the source string of the character
/// that produced `chars[i]`. One source character may produce several
/// normalized characters (NFKC expansion); all of them map to the same
/// source offset.
#[derive(Debug, Clone)]
pub struct NormalizedText {
    pub chars: Vec<char>,
    pub index_map: Vec<usize>,
}

impl NormalizedText {
    pub fn new(text: &str) -> Self {
        let mut chars = Vec::with_capacity(text.len());
        let mut index_map = Vec::with_capacity(text.len());

        for (byte_offset, ch) in text.char_indices() {
            for folded in std::iter::once(ch).nfkc() {
                for lowered in folded.to_lowercase() {
                    let unified = fold_kana(lowered);
                    if is_skippable_char(unified) {
                        continue;
                    }
                    chars.push(unified);
                    index_map.push(byte_offset);
                }
            }
        }

        Self { chars, index_map }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Byte offset in the original string of normalized char `i`.
    pub fn original_offset(&self, i: usize) -> usize {
        self.index_map[i]
    }

    /// Byte offset in the original string just past the character that
    /// produced normalized char `i`. Usable as an exclusive trim position.
    pub fn original_end_offset(&self, i: usize, original: &str) -> usize {
        let start = self.index_map[i];
        original[start..]
            .chars()
            .next()
            .map(|c| start + c.len_utf8())
            .unwrap_or(start)
    }
}

/// Normalize a string to its comparison form.
pub fn normalize(text: &str) -> String {
    NormalizedText::new(text).chars.into_iter().collect()
}

/// Fold katakana to the corresponding hiragana character.
///
/// Covers the main block (ァ..ヶ) and the katakana iteration marks. The
/// prolonged sound mark ー is kept as-is: it carries length information in
/// both scripts.
pub fn fold_kana(c: char) -> char {
    match c {
        '\u{30A1}'..='\u{30F6}' => {
            // SAFETY of the unwrap: the katakana block maps 1:1 onto
            // hiragana 0x60 below, all valid scalar values.
            char::from_u32(c as u32 - 0x60).unwrap_or(c)
        }
        '\u{30FD}' => '\u{309D}',
        '\u{30FE}' => '\u{309E}',
        _ => c,
    }
}

/// Characters removed from the normalized stream: whitespace, punctuation,
/// and invisible format controls that models occasionally emit (zero-width
/// space, BOM, directional marks). Combining kana voicing marks are dropped
/// too; decomposed voiced kana otherwise breaks exact matching.
pub fn is_skippable_char(c: char) -> bool {
    if c.is_whitespace() {
        return true;
    }
    if c.is_ascii_punctuation() {
        return true;
    }
    matches!(c,
        // General punctuation block
        '\u{2000}'..='\u{206F}'
        // CJK symbols and punctuation (。、「」etc.)
        | '\u{3000}'..='\u{303F}'
        // Halfwidth CJK punctuation variants that survive NFKC
        | '\u{FF5F}'..='\u{FF65}'
        // Zero-width and BOM format controls
        | '\u{200B}'..='\u{200F}'
        | '\u{202A}'..='\u{202E}'
        | '\u{2060}'
        | '\u{FEFF}'
        // Combining voiced / semi-voiced sound marks
        | '\u{3099}'
        | '\u{309A}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_katakana_folds_to_hiragana() {
        assert_eq!(normalize("カタカナ"), "かたかな");
        assert_eq!(normalize("アイウエオ"), "あいうえお");
    }

    #[test]
    fn test_halfwidth_katakana_folds() {
        // NFKC widens ｱ to ア, then the kana fold lowers it to あ
        assert_eq!(normalize("ｱｲｳ"), "あいう");
    }

    #[test]
    fn test_fullwidth_ascii_folds() {
        assert_eq!(normalize("ＡＢＣ１２３"), "abc123");
    }

    #[test]
    fn test_punctuation_and_whitespace_stripped() {
        assert_eq!(normalize("こんにちは。 今日は、晴れ！"), "こんにちは今日は晴れ");
        assert_eq!(normalize("a, b. c!"), "abc");
    }

    #[test]
    fn test_format_controls_stripped() {
        assert_eq!(normalize("te\u{200B}st\u{FEFF}"), "test");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "カタカナとひらがな、ＡＢＣ。",
            "Hello, World! ｱｲｳ",
            "　全角スペース　",
            "",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_index_map_points_into_original() {
        let original = "あ。カ x";
        let norm = NormalizedText::new(original);
        // Normalized stream: あ, か, x
        assert_eq!(norm.chars, vec!['あ', 'か', 'x']);
        assert_eq!(norm.original_offset(0), 0);
        assert_eq!(&original[norm.original_offset(1)..norm.original_end_offset(1, original)], "カ");
        assert_eq!(&original[norm.original_offset(2)..], "x");
    }

    #[test]
    fn test_prolonged_sound_mark_kept() {
        assert_eq!(normalize("コーヒー"), "こーひー");
    }

    #[test]
    fn test_empty_input() {
        let norm = NormalizedText::new("");
        assert!(norm.is_empty());
        assert_eq!(normalize(""), "");
    }
}
