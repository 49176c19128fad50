use anyhow::Result;
use futures::future::try_join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::facet::{record_model_year, valid_year_range, year_options};
use super::filters::{CountMode, ListRequest, ListingFilters, PageRequest, SortKey};
use super::query_builder::SmartQuery;
use super::sorting::{compare_slim, sort_records};
use super::source::{ListQuery, SourceAdapter, select_adapters, sources_of};
use super::cache_key;
use crate::cache::CacheStore;
use crate::config::{CacheConfig, Config, MergeConfig, SearchConfig};
use crate::listing::{ListingRecord, SlimRecord, Source};

pub const LISTINGS_PREFIX: &str = "listings:";
pub const COUNT_PREFIX: &str = "count:";
pub const FACET_YEARS_PREFIX: &str = "facet:years:";

/// One page of the merged feed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedPage {
    pub items: Vec<ListingRecord>,
    pub page: usize,
    pub limit: usize,
    /// Set in exact-count mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Set in no-count mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_next: Option<bool>,
}

#[derive(Debug, Clone)]
struct PageSlice {
    items: Vec<ListingRecord>,
    has_next: Option<bool>,
}

/// Presents several source adapters as one sorted, paginated feed.
#[derive(Debug)]
pub struct SourceListMerger {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    search: SearchConfig,
    merge: MergeConfig,
    cache: CacheConfig,
    pages: CacheStore<PageSlice>,
    counts: CacheStore<u64>,
    years: CacheStore<Vec<i32>>,
}

impl SourceListMerger {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, config: &Config) -> Result<Self> {
        if adapters.is_empty() {
            anyhow::bail!("No source adapters configured");
        }

        info!(
            "Initializing listing merger over {} sources: {:?}",
            adapters.len(),
            sources_of(&adapters)
        );

        let max_entries = config.cache.max_entries;
        Ok(Self {
            adapters,
            search: config.search.clone(),
            merge: config.merge.clone(),
            cache: config.cache.clone(),
            pages: CacheStore::new(max_entries),
            counts: CacheStore::new(max_entries),
            years: CacheStore::new(max_entries),
        })
    }

    /// Fetch one page across the requested sources.
    ///
    /// In exact mode the page carries the summed total of every source; in
    /// no-count mode it carries `has_next`, derived from one look-ahead
    /// record. Any failing source fails the whole request.
    pub async fn list(&self, request: &ListRequest) -> Result<MergedPage> {
        let page = request.page.clamped(self.merge.max_page_limit);
        let adapters = select_adapters(&self.adapters, &request.sources)?;
        let sources = sources_of(&adapters);
        let query = self.base_query(&request.filters, page.sort);

        let key = cache_key(LISTINGS_PREFIX, &(&request.filters, &page, &sources))?;
        let load = {
            let adapters = adapters.clone();
            let query = query.clone();
            let merge = self.merge.clone();
            move || load_page(adapters, query, page, merge)
        };
        let slice = self.pages.get_or_set(&key, self.cache.list_ttl(), load);

        let total = async {
            match page.count_mode {
                CountMode::Exact => self
                    .count_adapters(adapters.clone(), query.clone(), &request.filters, &sources)
                    .await
                    .map(Some),
                CountMode::NoCount => Ok(None),
            }
        };

        let (slice, total) = tokio::try_join!(slice, total)?;
        Ok(MergedPage {
            items: slice.items,
            page: page.page,
            limit: page.limit,
            total,
            has_next: slice.has_next,
        })
    }

    /// Number of records matching `filters` across `sources` (all when empty).
    pub async fn count(&self, filters: &ListingFilters, sources: &[Source]) -> Result<u64> {
        let adapters = select_adapters(&self.adapters, sources)?;
        let sources = sources_of(&adapters);
        let query = self.base_query(filters, SortKey::default());
        self.count_adapters(adapters, query, filters, &sources).await
    }

    /// Model years available under `filters`, ignoring tag and year filters.
    ///
    /// Returns a contiguous descending range when the observed span is at
    /// most `year_span_threshold`, otherwise the distinct observed years.
    pub async fn model_year_facet(
        &self,
        filters: &ListingFilters,
        sources: &[Source],
    ) -> Result<Vec<i32>> {
        let adapters = select_adapters(&self.adapters, sources)?;
        let filters = filters.without_tag_and_year();
        let key = cache_key(FACET_YEARS_PREFIX, &(&filters, &sources_of(&adapters)))?;

        // Every matching record contributes, not just the first page.
        let mut query = self.base_query(&filters, SortKey::Newest);
        query.take = usize::MAX;
        let valid = valid_year_range(self.merge.min_model_year);
        let threshold = self.merge.year_span_threshold;

        self.years
            .get_or_set_stale_while_revalidate(
                &key,
                self.cache.facet_ttl(),
                self.cache.facet_stale(),
                move || async move {
                    let pages = try_join_all(adapters.iter().map(|a| a.list(&query))).await?;
                    let years = pages
                        .iter()
                        .flat_map(|page| &page.items)
                        .filter_map(|record| record_model_year(record, &valid));
                    Ok(year_options(years, threshold))
                },
            )
            .await
    }

    /// Drop cached pages, counts and facets whose key starts with `prefix`.
    pub fn invalidate(&self, prefix: &str) -> usize {
        let removed = self.pages.clear_by_prefix(prefix)
            + self.counts.clear_by_prefix(prefix)
            + self.years.clear_by_prefix(prefix);
        info!("Invalidated {} merger cache entries for '{}'", removed, prefix);
        removed
    }

    fn base_query(&self, filters: &ListingFilters, sort: SortKey) -> ListQuery {
        let text = filters
            .text
            .as_deref()
            .and_then(|text| SmartQuery::build(text, filters.exact, &self.search));
        ListQuery {
            filters: filters.clone(),
            text,
            sort,
            skip: 0,
            take: 0,
        }
    }

    async fn count_adapters(
        &self,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        query: ListQuery,
        filters: &ListingFilters,
        sources: &[Source],
    ) -> Result<u64> {
        let key = cache_key(COUNT_PREFIX, &(filters, sources))?;
        self.counts
            .get_or_set_stale_while_revalidate(
                &key,
                self.cache.count_ttl(),
                self.cache.count_stale(),
                move || async move {
                    let counts = try_join_all(adapters.iter().map(|a| a.count(&query))).await?;
                    Ok(counts.iter().sum())
                },
            )
            .await
    }
}

async fn load_page(
    adapters: Vec<Arc<dyn SourceAdapter>>,
    query: ListQuery,
    page: PageRequest,
    merge: MergeConfig,
) -> Result<PageSlice> {
    if let [adapter] = adapters.as_slice() {
        return delegate(adapter.as_ref(), query, page).await;
    }

    if query.filters.is_unfiltered()
        && page.sort.is_by_date()
        && page.window() <= merge.fast_path_ceiling
    {
        return fast_path(&adapters, page).await;
    }

    merge_all(&adapters, query, page, &merge).await
}

/// A single source paginates itself.
async fn delegate(
    adapter: &dyn SourceAdapter,
    query: ListQuery,
    page: PageRequest,
) -> Result<PageSlice> {
    let query = ListQuery {
        skip: page.offset(),
        take: page.take(),
        ..query
    };
    let result = adapter.list(&query).await?;
    debug!(
        "Delegated page {} to {}: {} records",
        page.page,
        adapter.source(),
        result.items.len()
    );
    Ok(finish(result.items, page))
}

/// Fetch the top of every source, sort the union and cut the page out.
async fn merge_all(
    adapters: &[Arc<dyn SourceAdapter>],
    query: ListQuery,
    page: PageRequest,
    merge: &MergeConfig,
) -> Result<PageSlice> {
    let mut window = page.window();
    if window > merge.max_fetch_window {
        warn!(
            "Page {} with limit {} needs {} records per source, capping at {}",
            page.page, page.limit, window, merge.max_fetch_window
        );
        window = merge.max_fetch_window;
    }

    let query = ListQuery {
        skip: 0,
        take: window,
        ..query
    };
    let results = try_join_all(adapters.iter().map(|a| a.list(&query))).await?;

    let mut merged = Vec::new();
    for (adapter, result) in adapters.iter().zip(results) {
        debug!("{} returned {} records", adapter.source(), result.items.len());
        merged.extend(result.items);
    }
    sort_records(&mut merged, page.sort);

    let items = merged
        .into_iter()
        .skip(page.offset())
        .take(page.take())
        .collect();
    Ok(finish(items, page))
}

/// Unfiltered date-sorted pages: merge id + timestamp projections, then load
/// full records for the page window only.
async fn fast_path(adapters: &[Arc<dyn SourceAdapter>], page: PageRequest) -> Result<PageSlice> {
    let window = page.window();
    let slims = try_join_all(adapters.iter().map(|a| a.list_slim(page.sort, window))).await?;

    let mut candidates: Vec<SlimRecord> = slims.into_iter().flatten().collect();
    candidates.sort_by(|a, b| compare_slim(a, b, page.sort));
    let chosen: Vec<SlimRecord> = candidates
        .into_iter()
        .skip(page.offset())
        .take(page.take())
        .collect();

    let mut ids_by_source: HashMap<Source, Vec<String>> = HashMap::new();
    for slim in &chosen {
        ids_by_source
            .entry(slim.source)
            .or_default()
            .push(slim.id.clone());
    }

    let fetches = adapters.iter().filter_map(|adapter| {
        let source = adapter.source();
        ids_by_source.get(&source).map(|ids| async move {
            let records = adapter.fetch_by_ids(ids).await?;
            Ok::<_, anyhow::Error>((source, records))
        })
    });
    let fetched = try_join_all(fetches).await?;

    let mut by_key: HashMap<(Source, String), ListingRecord> = fetched
        .into_iter()
        .flat_map(|(source, records)| records.into_iter().map(move |r| ((source, r.id.clone()), r)))
        .collect();

    let items: Vec<ListingRecord> = chosen
        .iter()
        .filter_map(|slim| by_key.remove(&(slim.source, slim.id.clone())))
        .collect();
    debug!(
        "Fast path served page {} from {} slim candidates",
        page.page, window
    );

    Ok(finish(items, page))
}

/// Trim the look-ahead record and derive `has_next` in no-count mode.
fn finish(mut items: Vec<ListingRecord>, page: PageRequest) -> PageSlice {
    let has_next = match page.count_mode {
        CountMode::Exact => None,
        CountMode::NoCount => Some(items.len() > page.limit),
    };
    items.truncate(page.limit);
    PageSlice { items, has_next }
}
