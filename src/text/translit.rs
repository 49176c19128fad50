//! Arabic/Latin transliteration tables.
//!
//! All Arabic strings here are already in normalized form (bare alef, ya for
//! alef maqsura, ha for ta marbuta) so transliterated output never changes
//! under [`normalize`](super::normalize::normalize).

/// Spelled Arabic name for every Latin letter, as used when Arabic text
/// writes out model codes letter by letter ("بي ام دبليو").
const LETTER_NAMES: [(char, &str); 26] = [
    ('a', "ايه"),
    ('b', "بي"),
    ('c', "سي"),
    ('d', "دي"),
    ('e', "اي"),
    ('f', "اف"),
    ('g', "جي"),
    ('h', "اتش"),
    ('i', "اي"),
    ('j', "جيه"),
    ('k', "كي"),
    ('l', "ال"),
    ('m', "ام"),
    ('n', "ان"),
    ('o', "او"),
    ('p', "پي"),
    ('q', "كيو"),
    ('r', "ار"),
    ('s', "اس"),
    ('t', "تي"),
    ('u', "يو"),
    ('v', "في"),
    ('w', "دبليو"),
    ('x', "اكس"),
    ('y', "واي"),
    ('z', "زد"),
];

/// Extra spellings accepted when reading spelled letters back.
const LETTER_NAME_VARIANTS: [(&str, char); 2] = [("ايكس", 'x'), ("زي", 'z')];

pub fn letter_name(letter: char) -> Option<&'static str> {
    LETTER_NAMES
        .iter()
        .find(|(l, _)| *l == letter)
        .map(|(_, name)| *name)
}

/// Latin letter spelled by `name`. Where two letters share a spelling the
/// first one in alphabet order wins.
pub fn letter_for_name(name: &str) -> Option<char> {
    LETTER_NAMES
        .iter()
        .find(|(_, n)| *n == name)
        .map(|(l, _)| *l)
        .or_else(|| {
            LETTER_NAME_VARIANTS
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, l)| *l)
        })
}

/// Phonetic Latin rendering of one normalized Arabic letter.
pub fn phonetic(ch: char) -> Option<&'static str> {
    let latin = match ch {
        'ا' => "a",
        'ب' => "b",
        'ت' => "t",
        'ث' => "th",
        'ج' => "j",
        'ح' => "h",
        'خ' => "kh",
        'د' => "d",
        'ذ' => "dh",
        'ر' => "r",
        'ز' => "z",
        'س' => "s",
        'ش' => "sh",
        'ص' => "s",
        'ض' => "d",
        'ط' => "t",
        'ظ' => "z",
        'ع' => "a",
        'غ' => "gh",
        'ف' => "f",
        'ق' => "q",
        'ك' | 'ک' => "k",
        'ل' => "l",
        'م' => "m",
        'ن' => "n",
        'ه' => "h",
        'و' => "w",
        'ي' | 'ی' => "y",
        'ء' => "",
        'پ' => "p",
        'چ' => "ch",
        'ژ' => "zh",
        'گ' => "g",
        _ => return None,
    };
    Some(latin)
}

/// Split a run of concatenated letter names ("بيامدبليو") back into
/// letters, taking the longest name at each step. Digit runs pass through.
/// Returns the decoded pieces, or `None` when some part is not a name.
pub fn segment_letter_names(token: &str) -> Option<Vec<String>> {
    let chars: Vec<char> = token.chars().collect();
    let mut pieces = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        if chars[pos].is_ascii_digit() {
            let start = pos;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
            pieces.push(chars[start..pos].iter().collect());
            continue;
        }

        let mut matched = None;
        for (letter, name) in LETTER_NAMES.iter() {
            let len = name.chars().count();
            if pos + len > chars.len() {
                continue;
            }
            let candidate: String = chars[pos..pos + len].iter().collect();
            if candidate == *name && matched.is_none_or(|(_, best)| len > best) {
                matched = Some((*letter, len));
            }
        }

        let (letter, len) = matched?;
        pieces.push(letter.to_string());
        pos += len;
    }

    if pieces.is_empty() { None } else { Some(pieces) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::normalize::normalize;

    #[test]
    fn test_letter_names_are_normalized() {
        for (_, name) in LETTER_NAMES.iter() {
            assert_eq!(normalize(name), *name);
        }
    }

    #[test]
    fn test_shared_spelling_resolves_to_first_letter() {
        assert_eq!(letter_for_name("اي"), Some('e'));
        assert_eq!(letter_for_name("اكس"), Some('x'));
        assert_eq!(letter_for_name("ايكس"), Some('x'));
        assert_eq!(letter_for_name("سياره"), None);
    }

    #[test]
    fn test_segment_concatenated_names() {
        assert_eq!(
            segment_letter_names("بيامدبليو"),
            Some(vec!["b".to_string(), "m".to_string(), "w".to_string()])
        );
        assert_eq!(
            segment_letter_names("اكس5"),
            Some(vec!["x".to_string(), "5".to_string()])
        );
        assert_eq!(segment_letter_names("تويوتا"), None);
    }

    #[test]
    fn test_phonetic_digraphs() {
        assert_eq!(phonetic('خ'), Some("kh"));
        assert_eq!(phonetic('ش'), Some("sh"));
        assert_eq!(phonetic('ء'), Some(""));
        assert_eq!(phonetic('x'), None);
    }
}
