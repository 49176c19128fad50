use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::path::Path;
use tracing::{debug, info};

use super::facet::{record_model_year, valid_year_range};
use super::filters::{ListingFilters, SortKey};
use super::pattern::compile_match_pattern;
use super::query_builder::SmartQuery;
use super::sorting::{compare_slim, sort_records};
use super::source::{ListQuery, SourceAdapter, SourcePage};
use crate::config::MergeConfig;
use crate::listing::{ListingRecord, SlimRecord, Source};
use crate::text::{build_aliases, is_text_match, normalize, tokenize};

#[derive(Debug)]
struct IndexedRecord {
    record: ListingRecord,
    /// Normalized searchable text
    haystack: String,
    /// Haystack followed by every alias of every haystack word
    document: String,
    /// Normalized title, tags, brand + model and city, matched whole by
    /// exact searches
    fields: Vec<String>,
}

impl IndexedRecord {
    fn new(record: ListingRecord) -> Self {
        let haystack = normalize(&record.searchable_text());

        let mut seen = HashSet::new();
        let mut document = haystack.clone();
        for word in tokenize(&haystack) {
            for alias in build_aliases(&word) {
                if seen.insert(alias.clone()) {
                    document.push(' ');
                    document.push_str(&alias);
                }
            }
        }

        let brand_model = format!("{} {}", record.tags.brand, record.tags.model);
        let fields = [
            record.title.as_str(),
            record.tags.category.as_str(),
            record.tags.brand.as_str(),
            record.tags.model.as_str(),
            brand_model.as_str(),
            record.city.as_str(),
        ]
        .iter()
        .map(|field| normalize(field))
        .filter(|field| !field.is_empty())
        .collect();

        Self {
            record,
            haystack,
            document,
            fields,
        }
    }
}

/// Free-text matcher compiled once per query.
struct TextMatcher<'a> {
    query: &'a SmartQuery,
    patterns: Vec<Vec<Regex>>,
}

impl<'a> TextMatcher<'a> {
    fn new(query: &'a SmartQuery) -> Result<Self> {
        let patterns = query
            .groups
            .iter()
            .map(|group| {
                group
                    .aliases
                    .iter()
                    .map(|alias| compile_match_pattern(alias, query.exact, query.fuzzy_arabic))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { query, patterns })
    }

    fn matches(&self, indexed: &IndexedRecord) -> bool {
        if self.query.exact {
            return self.patterns.iter().all(|patterns| {
                indexed
                    .fields
                    .iter()
                    .any(|field| patterns.iter().any(|p| p.is_match(field)))
            });
        }

        let by_alias = |token: &str| is_text_match(&indexed.haystack, token);

        // Outside the index prefilter only script-agnostic alias matches count.
        if !self.hits_index(indexed) {
            return self.query.groups.iter().all(|group| by_alias(&group.token));
        }

        self.query
            .groups
            .iter()
            .zip(&self.patterns)
            .all(|(group, patterns)| {
                patterns.iter().any(|p| p.is_match(&indexed.haystack)) || by_alias(&group.token)
            })
    }

    fn hits_index(&self, indexed: &IndexedRecord) -> bool {
        self.query
            .index_terms()
            .any(|term| indexed.document.contains(term))
    }
}

/// Source adapter over records held in memory, loaded from a JSON array.
#[derive(Debug)]
pub struct InMemorySource {
    source: Source,
    records: Vec<IndexedRecord>,
    year_range: RangeInclusive<i32>,
}

impl InMemorySource {
    pub fn new(source: Source, records: Vec<ListingRecord>) -> Self {
        let records: Vec<IndexedRecord> = records
            .into_iter()
            .map(|mut record| {
                record.source = source;
                IndexedRecord::new(record)
            })
            .collect();

        info!("Indexed {} records for source {}", records.len(), source);
        Self {
            source,
            records,
            year_range: valid_year_range(MergeConfig::default().min_model_year),
        }
    }

    pub fn with_min_model_year(mut self, min_model_year: i32) -> Self {
        self.year_range = valid_year_range(min_model_year);
        self
    }

    /// Load a JSON array of records.
    pub async fn from_json_file(source: Source, path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read listings from {}", path.display()))?;
        let records: Vec<ListingRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse listings in {}", path.display()))?;
        Ok(Self::new(source, records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn matching(&self, query: &ListQuery) -> Result<Vec<&IndexedRecord>> {
        let matcher = query.text.as_ref().map(TextMatcher::new).transpose()?;

        Ok(self
            .records
            .iter()
            .filter(|indexed| self.passes_filters(&indexed.record, &query.filters))
            .filter(|indexed| matcher.as_ref().is_none_or(|m| m.matches(indexed)))
            .collect())
    }

    fn passes_filters(&self, record: &ListingRecord, filters: &ListingFilters) -> bool {
        fn within<T: PartialOrd + Copy>(value: Option<T>, min: Option<T>, max: Option<T>) -> bool {
            if min.is_none() && max.is_none() {
                return true;
            }
            value.is_some_and(|v| min.is_none_or(|m| v >= m) && max.is_none_or(|m| v <= m))
        }

        fn text_filter(value: &str, wanted: &Option<String>) -> bool {
            wanted.as_deref().is_none_or(|w| is_text_match(value, w))
        }

        within(record.price_numeric, filters.min_price, filters.max_price)
            && within(record.mileage, filters.min_mileage, filters.max_mileage)
            && within(record.post_date_epoch_ms, filters.posted_from, filters.posted_to)
            && text_filter(&record.city, &filters.city)
            && text_filter(&record.tags.category, &filters.category)
            && text_filter(&record.tags.brand, &filters.brand)
            && text_filter(&record.tags.model, &filters.model)
            && filters
                .model_year
                .is_none_or(|year| record_model_year(record, &self.year_range) == Some(year))
    }
}

#[async_trait]
impl SourceAdapter for InMemorySource {
    fn source(&self) -> Source {
        self.source
    }

    async fn list(&self, query: &ListQuery) -> Result<SourcePage> {
        let mut items: Vec<ListingRecord> = self
            .matching(query)?
            .into_iter()
            .map(|indexed| indexed.record.clone())
            .collect();
        sort_records(&mut items, query.sort);

        let total = items.len();
        let items: Vec<ListingRecord> = items.into_iter().skip(query.skip).take(query.take).collect();
        debug!(
            "{}: {} matching, returning {} from offset {}",
            self.source,
            total,
            items.len(),
            query.skip
        );

        Ok(SourcePage {
            has_next: Some(query.skip + items.len() < total),
            total: Some(total as u64),
            items,
        })
    }

    async fn count(&self, query: &ListQuery) -> Result<u64> {
        Ok(self.matching(query)?.len() as u64)
    }

    async fn list_slim(&self, sort: SortKey, take: usize) -> Result<Vec<SlimRecord>> {
        let mut slim: Vec<SlimRecord> = self.records.iter().map(|r| r.record.slim()).collect();
        slim.sort_by(|a, b| compare_slim(a, b, sort));
        slim.truncate(take);
        Ok(slim)
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<ListingRecord>> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        Ok(self
            .records
            .iter()
            .filter(|indexed| wanted.contains(indexed.record.id.as_str()))
            .map(|indexed| indexed.record.clone())
            .collect())
    }
}
