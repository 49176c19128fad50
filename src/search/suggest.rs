use anyhow::Result;
use futures::future::try_join_all;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::cache_key;
use super::filters::{ListingFilters, SortKey};
use super::query_builder::{SmartQuery, parse_search_text};
use super::source::{ListQuery, SourceAdapter, select_adapters, sources_of};
use crate::cache::CacheStore;
use crate::config::{Config, SearchConfig, SuggestConfig};
use crate::listing::{ListingRecord, Source};
use crate::text::{build_aliases, normalize, tokenize};

pub const SUGGEST_PREFIX: &str = "suggest:";

const TITLE_WEIGHT: i32 = 7;
const BRAND_WEIGHT: i32 = 8;
const MODEL_WEIGHT: i32 = 6;
const BRAND_MODEL_WEIGHT: i32 = 10;

const EXACT_SCORE: i32 = 120;
const PREFIX_SCORE: i32 = 95;
const SUBSTRING_SCORE: i32 = 72;
const TOKEN_ONLY_SCORE: i32 = 35;
const ALL_TOKENS_BONUS: i32 = 26;
const PER_TOKEN_BONUS: i32 = 6;
const COMPACTNESS_BONUS: i32 = 15;

/// Titles that carry no information.
const PLACEHOLDER_TITLES: &[&str] = &["-", "n/a", "na", "null", "none", "untitled", "no title", "بدون عنوان"];

#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionCandidate {
    pub label: String,
    pub normalized_label: String,
    pub source: Source,
    pub weight: i32,
}

impl SuggestionCandidate {
    fn new(label: &str, source: Source, weight: i32) -> Option<Self> {
        let normalized_label = normalize(label);
        if normalized_label.is_empty() {
            return None;
        }
        Some(Self {
            label: label.trim().to_string(),
            normalized_label,
            source,
            weight,
        })
    }
}

/// Title, brand, model and brand + model suggestions from one record.
pub fn extract_candidates(source: Source, record: &ListingRecord) -> Vec<SuggestionCandidate> {
    let mut candidates = Vec::with_capacity(4);

    let title = normalize(&record.title);
    if !PLACEHOLDER_TITLES.iter().any(|p| normalize(p) == title) {
        candidates.extend(SuggestionCandidate::new(&record.title, source, TITLE_WEIGHT));
    }

    let brand = record.tags.brand.trim();
    let model = record.tags.model.trim();
    candidates.extend(SuggestionCandidate::new(brand, source, BRAND_WEIGHT));
    candidates.extend(SuggestionCandidate::new(model, source, MODEL_WEIGHT));
    if !brand.is_empty() && !model.is_empty() {
        candidates.extend(SuggestionCandidate::new(
            &format!("{} {}", brand, model),
            source,
            BRAND_MODEL_WEIGHT,
        ));
    }

    candidates
}

/// Score a candidate against normalized query variants and tokens, or `None`
/// when it neither contains a variant nor shares a token with the query.
pub fn score(candidate: &SuggestionCandidate, variants: &[String], tokens: &[String]) -> Option<i32> {
    let label = &candidate.normalized_label;

    let containment = variants
        .iter()
        .filter(|variant| !variant.is_empty())
        .filter_map(|variant| {
            if label == variant {
                Some(EXACT_SCORE)
            } else if label.starts_with(variant.as_str()) {
                Some(PREFIX_SCORE)
            } else if label.contains(variant.as_str()) {
                Some(SUBSTRING_SCORE)
            } else {
                None
            }
        })
        .max();

    let overlap = tokens.iter().filter(|t| label.contains(t.as_str())).count();
    if containment.is_none() && overlap == 0 {
        return None;
    }

    let base = containment.unwrap_or(TOKEN_ONLY_SCORE);
    let token_bonus = if !tokens.is_empty() && overlap == tokens.len() {
        ALL_TOKENS_BONUS
    } else {
        PER_TOKEN_BONUS * overlap as i32
    };

    let first_len = variants.first().map_or(0, |v| v.chars().count()) as i32;
    let length_gap = (label.chars().count() as i32 - first_len).abs();
    let compactness = (COMPACTNESS_BONUS - length_gap.min(COMPACTNESS_BONUS)).max(0);

    Some(base + token_bonus + compactness + candidate.weight)
}

struct RankedGroup<'a> {
    label: &'a str,
    score: i32,
    hits: usize,
    sources: BTreeSet<Source>,
}

/// Best `limit` distinct labels for `query_text`.
///
/// Candidates sharing a normalized label are merged, keeping the best score
/// and its label. Ties fall to the number of distinct sources, then hits,
/// then the shorter label.
pub fn rank(candidates: &[SuggestionCandidate], query_text: &str, limit: usize) -> Vec<String> {
    let variants = build_aliases(query_text);
    if variants.is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let tokens: Vec<String> = tokenize(&normalize(query_text))
        .into_iter()
        .filter(|token| seen.insert(token.clone()))
        .collect();

    let mut groups: HashMap<&str, RankedGroup<'_>> = HashMap::new();
    for candidate in candidates {
        let Some(score) = score(candidate, &variants, &tokens) else {
            continue;
        };

        let group = groups
            .entry(candidate.normalized_label.as_str())
            .or_insert_with(|| RankedGroup {
                label: &candidate.label,
                score,
                hits: 0,
                sources: BTreeSet::new(),
            });
        group.hits += 1;
        group.sources.insert(candidate.source);
        if score > group.score {
            group.score = score;
            group.label = &candidate.label;
        }
    }

    let mut ranked: Vec<RankedGroup<'_>> = groups.into_values().collect();
    ranked.sort_by_key(|group| {
        (
            Reverse(group.score),
            Reverse(group.sources.len()),
            Reverse(group.hits),
            group.label.chars().count(),
            group.label,
        )
    });

    ranked
        .into_iter()
        .take(limit)
        .map(|group| group.label.to_string())
        .collect()
}

/// Autocomplete over the configured sources, cached per query.
#[derive(Debug)]
pub struct SuggestionService {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    search: SearchConfig,
    suggest: SuggestConfig,
    ttl: Duration,
    cache: CacheStore<Vec<String>>,
}

impl SuggestionService {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, config: &Config) -> Result<Self> {
        if adapters.is_empty() {
            anyhow::bail!("No source adapters configured");
        }
        info!("Initializing suggestion service over {} sources", adapters.len());

        Ok(Self {
            adapters,
            search: config.search.clone(),
            suggest: config.suggest.clone(),
            ttl: config.cache.suggest_ttl(),
            cache: CacheStore::new(config.cache.max_entries),
        })
    }

    /// Ordered suggestion labels for `text`. Queries shorter than
    /// `min_query_chars` get none.
    pub async fn suggest(&self, text: &str, sources: &[Source], limit: usize) -> Result<Vec<String>> {
        let (text, _) = parse_search_text(text);
        if normalize(&text).chars().count() < self.suggest.min_query_chars {
            return Ok(Vec::new());
        }

        let limit = limit.clamp(1, self.suggest.max_limit.max(1));
        let adapters = select_adapters(&self.adapters, sources)?;
        let key = cache_key(SUGGEST_PREFIX, &(normalize(&text), limit, sources_of(&adapters)))?;

        let query = ListQuery {
            filters: ListingFilters {
                text: Some(text.clone()),
                ..Default::default()
            },
            text: SmartQuery::build(&text, false, &self.search),
            sort: SortKey::Newest,
            skip: 0,
            take: self.suggest.scan_limit,
        };

        self.cache
            .get_or_set(&key, self.ttl, move || async move {
                let pages = try_join_all(adapters.iter().map(|a| a.list(&query))).await?;

                let candidates: Vec<SuggestionCandidate> = adapters
                    .iter()
                    .zip(&pages)
                    .flat_map(|(adapter, page)| {
                        let source = adapter.source();
                        page.items
                            .iter()
                            .flat_map(move |record| extract_candidates(source, record))
                    })
                    .collect();
                debug!(
                    "Ranking {} suggestion candidates for '{}'",
                    candidates.len(),
                    text
                );

                Ok(rank(&candidates, &text, limit))
            })
            .await
    }

    pub fn invalidate(&self, prefix: &str) -> usize {
        self.cache.clear_by_prefix(prefix)
    }
}
