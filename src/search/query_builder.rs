use std::collections::HashSet;

use super::tokenizer::{is_useful_token, tokenize};
use crate::config::SearchConfig;
use crate::text::{build_aliases, normalize};

/// Tolerant variants of one logical search token. Groups are combined as
/// AND across groups, OR within a group.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTermGroup {
    pub token: String,
    pub aliases: Vec<String>,
}

impl SearchTermGroup {
    fn from_token(token: &str, max_aliases: usize) -> Option<Self> {
        let mut aliases = build_aliases(token);
        aliases.truncate(max_aliases.max(1));
        if aliases.is_empty() {
            return None;
        }
        Some(Self {
            token: token.trim().to_string(),
            aliases,
        })
    }
}

/// Free text prepared for matching: term groups for the per-record match
/// stage and a compact query string for pre-narrowing in a full-text index.
#[derive(Debug, Clone, PartialEq)]
pub struct SmartQuery {
    pub text: String,
    pub exact: bool,
    pub fuzzy_arabic: bool,
    pub groups: Vec<SearchTermGroup>,
    pub index_query: String,
}

impl SmartQuery {
    /// Returns `None` when the text holds nothing searchable.
    pub fn build(raw: &str, exact: bool, config: &SearchConfig) -> Option<Self> {
        let (text, quoted) = parse_search_text(raw);
        let exact = exact || quoted;

        let groups = build_term_groups(
            &text,
            exact,
            config.max_terms,
            config.max_aliases_per_term,
        );
        if groups.is_empty() {
            return None;
        }
        let index_query = index_query_from_groups(&text, exact, &groups, config.max_index_terms);

        Some(Self {
            text,
            exact,
            fuzzy_arabic: config.fuzzy_arabic,
            groups,
            index_query,
        })
    }

    /// Words of the index query long enough to narrow a candidate set.
    pub fn index_terms(&self) -> impl Iterator<Item = &str> {
        self.index_query
            .split(' ')
            .filter(|term| term.chars().count() > 2)
    }
}

/// Strip surrounding double quotes. Text wrapped in quotes is searched as an
/// exact phrase; an unclosed leading quote still counts.
pub fn parse_search_text(raw: &str) -> (String, bool) {
    let trimmed = raw.trim();
    match trimmed.strip_prefix('"') {
        Some(rest) => {
            let inner = rest.strip_suffix('"').unwrap_or(rest).trim();
            if inner.is_empty() {
                (String::new(), false)
            } else {
                (inner.to_string(), true)
            }
        }
        None => (trimmed.to_string(), false),
    }
}

/// Turn free text into alias groups.
///
/// Exact searches yield a single group for the whole input. Otherwise useful
/// tokens (or every token when none is useful) are deduplicated, capped at
/// `max_terms` and expanded. When stop-word filtering leaves one token out of
/// several, a group for the whole input is put first so compound names still
/// match.
pub fn build_term_groups(
    search: &str,
    exact: bool,
    max_terms: usize,
    max_aliases_per_term: usize,
) -> Vec<SearchTermGroup> {
    let search = search.trim();
    if search.is_empty() {
        return Vec::new();
    }

    if exact {
        return SearchTermGroup::from_token(search, max_aliases_per_term)
            .into_iter()
            .collect();
    }

    let raw_tokens = tokenize(search);
    let useful: Vec<&String> = raw_tokens.iter().filter(|t| is_useful_token(t)).collect();
    let candidates: Vec<&String> = if useful.is_empty() {
        raw_tokens.iter().collect()
    } else {
        useful
    };

    let mut seen = HashSet::new();
    let tokens: Vec<&String> = candidates
        .into_iter()
        .filter(|token| seen.insert(token.to_lowercase()))
        .take(max_terms.max(1))
        .collect();

    let mut groups: Vec<SearchTermGroup> = tokens
        .iter()
        .filter_map(|token| SearchTermGroup::from_token(token, max_aliases_per_term))
        .collect();

    if tokens.len() == 1 && raw_tokens.len() > 1 {
        if let Some(whole) = SearchTermGroup::from_token(search, max_aliases_per_term) {
            groups.insert(0, whole);
        }
    }

    groups
}

/// Space-joined query string for a backing full-text index, built from the
/// normalized input and every alias longer than two characters.
pub fn build_index_query_string(search: &str, exact: bool, max_output_terms: usize) -> String {
    let defaults = SearchConfig::default();
    let groups = build_term_groups(
        search,
        exact,
        defaults.max_terms,
        defaults.max_aliases_per_term,
    );
    index_query_from_groups(search, exact, &groups, max_output_terms)
}

fn index_query_from_groups(
    search: &str,
    exact: bool,
    groups: &[SearchTermGroup],
    max_output_terms: usize,
) -> String {
    let whole = normalize(search);
    if exact {
        return whole;
    }

    let mut seen = HashSet::new();
    let terms: Vec<String> = std::iter::once(whole.clone())
        .chain(groups.iter().flat_map(|g| g.aliases.iter().cloned()))
        .map(|term| normalize(&term))
        .filter(|term| term.chars().count() > 2)
        .filter(|term| seen.insert(term.to_lowercase()))
        .take(max_output_terms)
        .collect();

    if terms.is_empty() {
        whole
    } else {
        terms.join(" ")
    }
}
