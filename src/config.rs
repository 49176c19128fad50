use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub suggest: SuggestConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached entries per store
    pub max_entries: usize,
    pub list_ttl_secs: u64,
    pub count_ttl_secs: u64,
    /// Grace window during which a stale count is served while refreshing
    pub count_stale_secs: u64,
    pub facet_ttl_secs: u64,
    pub facet_stale_secs: u64,
    pub suggest_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            list_ttl_secs: 30,
            count_ttl_secs: 60,
            count_stale_secs: 300,
            facet_ttl_secs: 300,
            facet_stale_secs: 3600,
            suggest_ttl_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum free-text tokens expanded into term groups
    pub max_terms: usize,
    pub max_aliases_per_term: usize,
    /// Maximum terms in the full-text index query string
    pub max_index_terms: usize,
    /// Use variant-tolerant patterns for Arabic text
    pub fuzzy_arabic: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_terms: 4,
            max_aliases_per_term: 8,
            max_index_terms: 12,
            fuzzy_arabic: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MergeConfig {
    pub max_page_limit: usize,
    /// Most records requested from one source for a single merged page
    pub max_fetch_window: usize,
    /// Largest slim-candidate window the date-sorted fast path may use
    pub fast_path_ceiling: usize,
    /// Widest year span exposed as a contiguous range
    pub year_span_threshold: i32,
    pub min_model_year: i32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_page_limit: 100,
            max_fetch_window: 1000,
            fast_path_ceiling: 600,
            year_span_threshold: 40,
            min_model_year: 1950,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SuggestConfig {
    /// Records fetched per request to mine suggestion candidates from
    pub scan_limit: usize,
    pub max_limit: usize,
    pub min_query_chars: usize,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            scan_limit: 60,
            max_limit: 20,
            min_query_chars: 2,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file. Missing sections and fields fall
    /// back to their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

impl CacheConfig {
    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.list_ttl_secs)
    }

    pub fn count_ttl(&self) -> Duration {
        Duration::from_secs(self.count_ttl_secs)
    }

    pub fn count_stale(&self) -> Duration {
        Duration::from_secs(self.count_stale_secs)
    }

    pub fn facet_ttl(&self) -> Duration {
        Duration::from_secs(self.facet_ttl_secs)
    }

    pub fn facet_stale(&self) -> Duration {
        Duration::from_secs(self.facet_stale_secs)
    }

    pub fn suggest_ttl(&self) -> Duration {
        Duration::from_secs(self.suggest_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"merge": {{"max_page_limit": 50}}, "search": {{"fuzzy_arabic": false}}}}"#)
            .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.merge.max_page_limit, 50);
        assert_eq!(config.merge.max_fetch_window, 1000);
        assert!(!config.search.fuzzy_arabic);
        assert_eq!(config.search.max_terms, 4);
        assert_eq!(config.cache.max_entries, 500);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = Config::load(Path::new("/nonexistent/listing-search.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
