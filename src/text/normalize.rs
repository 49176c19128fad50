use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

const TATWEEL: char = '\u{0640}';

/// Normalize raw text so that script variants compare equal.
///
/// Lowercases, maps Arabic-Indic and Extended Arabic-Indic digits to ASCII,
/// unifies Arabic letter variants (alef forms, alef maqsura, hamza carriers,
/// ta marbuta), strips combining marks and tatweel, and collapses runs of
/// whitespace, hyphens, underscores and slashes into a single space.
pub fn normalize(raw: &str) -> String {
    let mut unified = String::with_capacity(raw.len());
    for ch in raw.chars() {
        for lower in ch.to_lowercase() {
            unified.push(unify_char(lower));
        }
    }

    let mut out = String::with_capacity(unified.len());
    let mut pending_space = false;
    for ch in unified.nfd() {
        if is_combining_mark(ch) || ch == TATWEEL || is_arabic_diacritic(ch) {
            continue;
        }
        if ch.is_whitespace() || matches!(ch, '-' | '_' | '/') {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(ch);
    }

    // NFD may leave characters that only exist precomposed; recompose the rest.
    out.nfc().collect()
}

fn unify_char(ch: char) -> char {
    match ch {
        '\u{0660}'..='\u{0669}' => ascii_digit(ch as u32 - 0x0660),
        '\u{06F0}'..='\u{06F9}' => ascii_digit(ch as u32 - 0x06F0),
        'أ' | 'إ' | 'آ' | 'ٱ' => 'ا',
        'ى' => 'ي',
        'ؤ' => 'و',
        'ئ' => 'ي',
        'ة' => 'ه',
        _ => ch,
    }
}

fn ascii_digit(offset: u32) -> char {
    char::from_digit(offset, 10).unwrap_or('0')
}

fn is_arabic_diacritic(ch: char) -> bool {
    matches!(ch, '\u{064B}'..='\u{065F}' | '\u{0670}' | '\u{06D6}'..='\u{06ED}')
}

/// Normalized form with every non-alphanumeric character removed.
pub fn compact(normalized: &str) -> String {
    normalized.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Only the ASCII letters and digits of a normalized string.
pub fn latin_compact(normalized: &str) -> String {
    normalized
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

pub fn is_arabic_letter(ch: char) -> bool {
    matches!(ch, '\u{0621}'..='\u{064A}' | '\u{066E}'..='\u{06D3}' | '\u{06FA}'..='\u{06FF}')
}

pub fn contains_arabic(text: &str) -> bool {
    text.chars().any(is_arabic_letter)
}

pub fn contains_latin(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_alphabetic())
}

/// Split text into words on whitespace and punctuation, including the Arabic
/// comma, semicolon and question mark.
pub fn tokenize(input: &str) -> Vec<String> {
    input
        .split(is_token_separator)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(String::from)
        .collect()
}

fn is_token_separator(ch: char) -> bool {
    ch.is_whitespace()
        || matches!(ch, '،' | '؛' | '؟' | '٫' | '٬')
        || (ch.is_ascii_punctuation() && ch != '\'')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_collapses_separators() {
        assert_eq!(normalize("  BMW--X5__M/Sport  "), "bmw x5 m sport");
        assert_eq!(normalize("Toyota   Camry"), "toyota camry");
    }

    #[test]
    fn test_arabic_digits_become_ascii() {
        assert_eq!(normalize("٢٠٢٠"), "2020");
        assert_eq!(normalize("۱۹۹۸"), "1998");
    }

    #[test]
    fn test_arabic_letter_variants_unified() {
        assert_eq!(normalize("أحمد"), "احمد");
        assert_eq!(normalize("إسلام"), "اسلام");
        assert_eq!(normalize("آمنة"), "امنه");
        assert_eq!(normalize("مستشفى"), "مستشفي");
        assert_eq!(normalize("مؤمن"), "مومن");
        assert_eq!(normalize("سيارة"), "سياره");
    }

    #[test]
    fn test_strips_diacritics_and_tatweel() {
        assert_eq!(normalize("مَرْسِيدِس"), "مرسيدس");
        assert_eq!(normalize("كـــيا"), "كيا");
        assert_eq!(normalize("Citroën"), "citroen");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["Mercedes-Benz C200", "تويوتا كامري ٢٠١٨", "Škoda / Octavia"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_compact_forms() {
        assert_eq!(compact("bmw x5"), "bmwx5");
        assert_eq!(compact("c.200 amg"), "c200amg");
        assert_eq!(latin_compact("كيا rio 2015"), "rio2015");
    }

    #[test]
    fn test_script_detection() {
        assert!(contains_arabic("كيا rio"));
        assert!(!contains_arabic("kia rio"));
        assert!(contains_latin("كيا rio"));
        assert!(!contains_latin("كيا ٢٠١٥"));
    }

    #[test]
    fn test_tokenize_splits_on_arabic_punctuation() {
        assert_eq!(
            tokenize("تويوتا، كامري؟ bmw,x5"),
            vec!["تويوتا", "كامري", "bmw", "x5"]
        );
        assert!(tokenize("  ,, ؟ ").is_empty());
    }
}
