// Module declarations
pub mod facet;
pub mod filters;
pub mod memory_source;
pub mod merger;
pub mod pattern;
pub mod query_builder;
pub mod sorting;
pub mod source;
pub mod suggest;
pub mod tokenizer;

use anyhow::{Context, Result};
use serde::Serialize;

// Re-export public APIs
pub use filters::{CountMode, ListRequest, ListingFilters, PageRequest, SortKey};
pub use memory_source::InMemorySource;
pub use merger::{MergedPage, SourceListMerger};
pub use query_builder::{SearchTermGroup, SmartQuery, build_index_query_string, build_term_groups};
pub use source::{ListQuery, SourceAdapter, SourcePage};
pub use suggest::{SuggestionCandidate, SuggestionService};

/// Cache key: namespace prefix followed by the canonical JSON of the query.
pub(crate) fn cache_key(prefix: &str, query: &impl Serialize) -> Result<String> {
    let body = serde_json::to_string(query).context("Failed to serialize cache key")?;
    Ok(format!("{}{}", prefix, body))
}
