use std::collections::HashSet;

use super::normalize::{
    compact, contains_arabic, contains_latin, is_arabic_letter, latin_compact, normalize, tokenize,
};
use super::translit::{letter_for_name, letter_name, phonetic, segment_letter_names};

/// Upper bound on the size of one alias set.
const MAX_ALIASES: usize = 64;

/// A single compact Arabic token is read as spelled-out letters only when it
/// decodes into at least this many letter names.
const MIN_SEGMENTED_NAMES: usize = 3;

const SKELETON_VOWELS: [char; 7] = ['a', 'e', 'i', 'o', 'u', 'y', 'w'];

/// Build the set of script variants considered equal to `value`.
///
/// The set starts with the normalized form and is closed under the one-step
/// derivations (compact form, Arabic phonetic and spelled-letter readings,
/// Latin compact, letter-spaced and spelled-Arabic forms), so re-aliasing any
/// member only yields members already present. Order is generation order.
pub fn build_aliases(value: &str) -> Vec<String> {
    let seed = normalize(value);
    if seed.is_empty() {
        return Vec::new();
    }

    let mut seen: HashSet<String> = HashSet::from([seed.clone()]);
    let mut aliases = vec![seed];
    let mut cursor = 0;

    while cursor < aliases.len() {
        let current = aliases[cursor].clone();
        cursor += 1;

        for derived in derive(&current) {
            if derived.is_empty() || seen.contains(&derived) {
                continue;
            }
            if aliases.len() >= MAX_ALIASES {
                return aliases;
            }
            seen.insert(derived.clone());
            aliases.push(derived);
        }
    }

    aliases
}

/// One derivation step from an already-normalized string.
fn derive(normalized: &str) -> Vec<String> {
    let mut out = vec![compact(normalized)];

    if contains_arabic(normalized) {
        let words = read_arabic_words(normalized);
        out.push(join_phonetic(&words));
        if words.iter().any(|w| matches!(w, Word::Spelled(_))) {
            out.push(join_spelled(&words));
        }
    }

    if contains_latin(normalized) {
        let latin = latin_compact(normalized);
        let spelled = spell_in_arabic(&latin);
        out.push(letter_spaced(&latin));
        out.push(latin);
        out.push(compact(&spelled));
        out.push(spelled);
    }

    out
}

#[derive(Debug)]
enum Word {
    /// Letters decoded from spelled-out Arabic letter names.
    Spelled(String),
    Digits(String),
    Plain(String),
}

impl Word {
    fn text(&self) -> &str {
        match self {
            Word::Spelled(s) | Word::Digits(s) | Word::Plain(s) => s,
        }
    }
}

fn read_arabic_words(normalized: &str) -> Vec<Word> {
    normalized
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(|word| {
            if word.chars().all(|c| c.is_ascii_digit()) {
                return Word::Digits(word.to_string());
            }
            if let Some(letter) = letter_for_name(word) {
                return Word::Spelled(letter.to_string());
            }
            if contains_arabic(word) {
                if let Some(pieces) = segment_letter_names(word) {
                    if pieces.len() >= MIN_SEGMENTED_NAMES {
                        return Word::Spelled(pieces.concat());
                    }
                }
                return Word::Plain(phonetic_word(word));
            }
            Word::Plain(word.to_string())
        })
        .collect()
}

fn phonetic_word(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    for ch in word.chars() {
        match phonetic(ch) {
            Some(latin) => out.push_str(latin),
            None if is_arabic_letter(ch) => {}
            None => out.push(ch),
        }
    }
    out
}

fn join_phonetic(words: &[Word]) -> String {
    words
        .iter()
        .map(Word::text)
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Like [`join_phonetic`] but runs of spelled letters and digits are glued
/// together, so "اكس 5" reads as "x5".
fn join_spelled(words: &[Word]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut gluing = false;

    for word in words {
        let text = word.text();
        if text.is_empty() {
            continue;
        }
        let glue = matches!(word, Word::Spelled(_) | Word::Digits(_));
        match parts.last_mut() {
            Some(last) if glue && gluing => last.push_str(text),
            _ => parts.push(text.to_string()),
        }
        gluing = glue;
    }

    parts.join(" ")
}

fn letter_spaced(latin: &str) -> String {
    latin
        .chars()
        .map(String::from)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Spell each Latin letter with its Arabic name; digit runs are kept.
fn spell_in_arabic(latin: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut digits = String::new();

    for ch in latin.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        if !digits.is_empty() {
            parts.push(std::mem::take(&mut digits));
        }
        if let Some(name) = letter_name(ch) {
            parts.push(name.to_string());
        }
    }
    if !digits.is_empty() {
        parts.push(digits);
    }

    parts.join(" ")
}

/// Whether `candidate` matches `query` regardless of script, case and word
/// order.
///
/// Accepts when some alias of the whole query matches an alias of the whole
/// candidate, or when every query word matches some candidate word. Two
/// differing ASCII aliases still match if their digit runs agree and their
/// vowel-stripped skeletons are equal and at least two characters long, so
/// merged spellings like "mercedsbenz" are as tolerant as single words.
pub fn is_text_match(candidate: &str, query: &str) -> bool {
    let query = normalize(query);
    if query.is_empty() {
        return true;
    }
    let candidate = normalize(candidate);
    if candidate.is_empty() {
        return false;
    }

    let query_aliases = build_aliases(&query);
    let candidate_aliases = build_aliases(&candidate);
    if alias_sets_match(&query_aliases, &candidate_aliases) {
        return true;
    }

    let candidate_words: Vec<Vec<String>> = tokenize(&candidate)
        .iter()
        .map(|word| build_aliases(word))
        .collect();

    tokenize(&query).iter().all(|word| {
        let word_aliases = build_aliases(word);
        candidate_words
            .iter()
            .any(|aliases| alias_sets_match(&word_aliases, aliases))
    })
}

fn alias_sets_match(left: &[String], right: &[String]) -> bool {
    left.iter().any(|a| {
        right
            .iter()
            .any(|b| a == b || (is_ascii_alnum(a) && is_ascii_alnum(b) && loosely_equal(a, b)))
    })
}

fn is_ascii_alnum(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric())
}

fn loosely_equal(a: &str, b: &str) -> bool {
    let digits_a = digit_runs(a);
    let digits_b = digit_runs(b);
    if (!digits_a.is_empty() || !digits_b.is_empty()) && digits_a != digits_b {
        return false;
    }

    let skeleton_a = skeleton(a);
    skeleton_a.chars().count() >= 2 && skeleton_a == skeleton(b)
}

fn digit_runs(value: &str) -> Vec<&str> {
    value
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
        .collect()
}

fn skeleton(value: &str) -> String {
    value
        .chars()
        .filter(|c| !SKELETON_VOWELS.contains(c))
        .collect()
}
