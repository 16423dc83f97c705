//! Shared text handling
//!
//! The lexical index, the query side of lexical search and the answer
//! validator all tokenize through [`tokenize`], so a term produced at index
//! time is always comparable to a term produced at query time.

use unicode_segmentation::UnicodeSegmentation;

/// Tokenize text into lower-cased terms.
///
/// Unicode word segmentation splits CJK text into single ideographs; every
/// pair of directly adjacent ideographs additionally yields a bigram so that
/// two-character words such as `吃饭` are matchable as a unit. Punctuation
/// and whitespace never produce terms.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    // (end byte offset, ideograph) of the previous word, if it was one
    let mut previous: Option<(usize, char)> = None;

    for (start, word) in text.unicode_word_indices() {
        let lowered = word.to_lowercase();
        let single_ideograph = single_cjk(&lowered);

        if let (Some(current), Some((prev_end, prev_char))) = (single_ideograph, previous) {
            if prev_end == start {
                tokens.push(lowered.clone());
                tokens.push(format!("{}{}", prev_char, current));
                previous = Some((start + word.len(), current));
                continue;
            }
        }

        tokens.push(lowered);
        previous = single_ideograph.map(|c| (start + word.len(), c));
    }

    tokens
}

/// Return the character if the word is exactly one CJK ideograph
fn single_cjk(word: &str) -> Option<char> {
    let mut chars = word.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if is_cjk(c) => Some(c),
        _ => None,
    }
}

/// CJK unified ideographs (basic block, extension A/B, compatibility)
pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{20000}'..='\u{2A6DF}')
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
///
/// Counts characters, not bytes, so multi-byte text is never split inside a
/// code point.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
