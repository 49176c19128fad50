use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use super::filters::{ListingFilters, SortKey};
use super::query_builder::SmartQuery;
use crate::listing::{ListingRecord, SlimRecord, Source};

/// One request against a single backing source.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub filters: ListingFilters,
    /// Prepared free-text search, present when `filters.text` is searchable
    pub text: Option<SmartQuery>,
    pub sort: SortKey,
    pub skip: usize,
    /// `usize::MAX` asks for every matching record
    pub take: usize,
}

/// One source's answer to a [`ListQuery`].
#[derive(Debug, Clone, Default)]
pub struct SourcePage {
    pub items: Vec<ListingRecord>,
    pub total: Option<u64>,
    pub has_next: Option<bool>,
}

/// Contract every backing source implements. Adapters map their own storage
/// shape into [`ListingRecord`] and apply filters and sorting themselves.
#[async_trait]
pub trait SourceAdapter: Send + Sync + Debug {
    fn source(&self) -> Source;

    /// Records matching `query.filters`, sorted by `query.sort`, windowed by
    /// `skip`/`take`.
    async fn list(&self, query: &ListQuery) -> Result<SourcePage>;

    /// Authoritative number of records matching `query.filters`. The window
    /// is ignored.
    async fn count(&self, query: &ListQuery) -> Result<u64>;

    /// First `take` id + timestamp projections of the unfiltered feed.
    async fn list_slim(&self, sort: SortKey, take: usize) -> Result<Vec<SlimRecord>>;

    /// Full records for `ids`, in any order. Unknown ids are skipped.
    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<ListingRecord>>;
}

/// Adapters for `sources`, or every adapter when `sources` is empty.
pub fn select_adapters(
    adapters: &[Arc<dyn SourceAdapter>],
    sources: &[Source],
) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    if sources.is_empty() {
        return Ok(adapters.to_vec());
    }

    let selected: Vec<Arc<dyn SourceAdapter>> = adapters
        .iter()
        .filter(|adapter| sources.contains(&adapter.source()))
        .cloned()
        .collect();
    if selected.is_empty() {
        anyhow::bail!("None of the requested sources are configured: {:?}", sources);
    }
    Ok(selected)
}

/// Sorted source list, used in cache keys.
pub fn sources_of(adapters: &[Arc<dyn SourceAdapter>]) -> Vec<Source> {
    let mut sources: Vec<Source> = adapters.iter().map(|adapter| adapter.source()).collect();
    sources.sort();
    sources
}
