pub use crate::text::tokenize;
use crate::text::normalize;

/// Filler words that never narrow a listing search.
const STOP_WORDS: &[&str] = &[
    // Arabic
    "في", "من", "على", "الى", "او", "مع", "عن", "هذا", "هذه", "للبيع", "بيع", "مستعمل",
    "مستعمله", "جديد", "جديده", "سياره", "سيارات",
    // English
    "the", "and", "for", "with", "sale", "used", "new", "car", "cars", "of",
];

/// Whether a search token is worth matching on its own.
///
/// Numeric tokens always are. Otherwise tokens of two characters or fewer and
/// stop words are dropped.
pub fn is_useful_token(token: &str) -> bool {
    let normalized = normalize(token);
    if normalized.is_empty() {
        return false;
    }
    if normalized.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    if normalized.chars().count() <= 2 {
        return false;
    }
    !STOP_WORDS.iter().any(|stop| normalize(stop) == normalized)
}
