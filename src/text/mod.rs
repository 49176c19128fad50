//! Script-aware text normalization and Arabic/Latin alias matching.

pub mod alias;
pub mod normalize;
pub mod translit;

pub use alias::{build_aliases, is_text_match};
pub use normalize::{contains_arabic, contains_latin, normalize, tokenize};
