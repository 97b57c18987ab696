//! Transcript text normalization
//!
//! Two levels are used when matching recognizer output against rule triggers:
//! - basic: punctuation runs and whitespace runs collapse to one space
//! - compact: basic, then only ASCII alphanumerics and Hangul syllables survive, lowercased

/// First and last code points of the Hangul Syllables block (가..힣)
const HANGUL_SYLLABLE_FIRST: char = '\u{AC00}';
const HANGUL_SYLLABLE_LAST: char = '\u{D7A3}';

/// Sentence punctuation treated as a word break.
///
/// Only these four are stripped; quotes, dashes and full-width variants are kept.
fn is_sentence_punctuation(c: char) -> bool {
    matches!(c, ',' | '.' | '?' | '!')
}

fn is_compact_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || (HANGUL_SYLLABLE_FIRST..=HANGUL_SYLLABLE_LAST).contains(&c)
}

/// Trim, turn punctuation runs into a space, collapse whitespace runs, trim again.
///
/// Any run made of sentence punctuation and whitespace becomes a single space
/// between words, so the result never starts or ends with a space.
pub fn normalize_basic(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        if c.is_whitespace() || is_sentence_punctuation(c) {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }

    out
}

/// Basic normalization followed by removal of everything except ASCII letters,
/// ASCII digits and Hangul syllables, lowercased.
pub fn normalize_compact(text: &str) -> String {
    normalize_basic(text)
        .chars()
        .filter(|&c| is_compact_char(c))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
