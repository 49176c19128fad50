use anyhow::{Context, Result};
use regex::Regex;

use crate::text::normalize;
use crate::text::normalize::is_arabic_letter;

/// Optional weak letter tolerated between two letters of a longer word.
const WEAK_CONNECTOR: &str = "[اأإآوؤيىئءهة]?";

/// Letters whose presence varies between spellings of the same word.
const WEAK_LETTERS: [char; 5] = ['ا', 'و', 'ي', 'ء', 'ه'];

const MIN_ELASTIC_LETTERS: usize = 3;

/// Build a regex source string matching `value`.
///
/// Exact matching anchors the whole normalized value. With `fuzzy_arabic`,
/// Arabic text gets a variant-tolerant pattern: each letter accepts its
/// spelling variants, longer words tolerate an extra weak letter between
/// letters, and a second pattern over the strong letters only is added as an
/// alternative. Anything else is a plain case-insensitive substring.
pub fn build_match_pattern(value: &str, exact: bool, fuzzy_arabic: bool) -> String {
    let normalized = normalize(value);

    if exact {
        return format!("(?i)^{}$", regex::escape(&normalized));
    }

    if fuzzy_arabic && normalized.chars().any(is_arabic_letter) {
        let full = loose_pattern(&normalized);
        let strong = strong_letters(&normalized);
        let strong_len = strong.chars().filter(|c| !c.is_whitespace()).count();

        if strong != normalized
            && strong_len >= MIN_ELASTIC_LETTERS
            && strong.chars().any(is_arabic_letter)
        {
            return format!("(?i)(?:{}|{})", full, loose_pattern(&strong));
        }
        return format!("(?i){}", full);
    }

    format!("(?i){}", regex::escape(&normalized))
}

/// Compile [`build_match_pattern`] output.
pub fn compile_match_pattern(value: &str, exact: bool, fuzzy_arabic: bool) -> Result<Regex> {
    let pattern = build_match_pattern(value, exact, fuzzy_arabic);
    Regex::new(&pattern).with_context(|| format!("Invalid match pattern for '{}'", value))
}

fn loose_pattern(normalized: &str) -> String {
    normalized
        .split_whitespace()
        .map(loose_word)
        .collect::<Vec<_>>()
        .join(r"\s+")
}

fn loose_word(word: &str) -> String {
    let letters: Vec<String> = word.chars().map(letter_class).collect();
    if letters.len() >= MIN_ELASTIC_LETTERS {
        letters.join(WEAK_CONNECTOR)
    } else {
        letters.concat()
    }
}

fn letter_class(ch: char) -> String {
    match ch {
        'ا' => "[اأإآ]".to_string(),
        'ي' => "[يىئ]".to_string(),
        'و' => "[وؤ]".to_string(),
        'ه' => "[هة]".to_string(),
        'ء' => "[ءأإؤئ]".to_string(),
        _ => regex::escape(&ch.to_string()),
    }
}

fn strong_letters(normalized: &str) -> String {
    normalized
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| !WEAK_LETTERS.contains(c))
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
