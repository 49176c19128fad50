use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::listing::Source;

/// Structured filters applied uniformly by every source adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListingFilters {
    pub text: Option<String>,
    pub exact: bool,
    pub city: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_mileage: Option<u64>,
    pub max_mileage: Option<u64>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    /// Inclusive lower bound on the post date, epoch milliseconds
    pub posted_from: Option<i64>,
    /// Inclusive upper bound on the post date, epoch milliseconds
    pub posted_to: Option<i64>,
    pub model_year: Option<i32>,
}

impl ListingFilters {
    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    /// True when no filter narrows the result set.
    pub fn is_unfiltered(&self) -> bool {
        !self.has_text()
            && self.city.is_none()
            && self.min_price.is_none()
            && self.max_price.is_none()
            && self.min_mileage.is_none()
            && self.max_mileage.is_none()
            && self.category.is_none()
            && self.brand.is_none()
            && self.model.is_none()
            && self.posted_from.is_none()
            && self.posted_to.is_none()
            && self.model_year.is_none()
    }

    /// Same filters with tag and model-year constraints removed, as used to
    /// build facet listings for those fields.
    pub fn without_tag_and_year(&self) -> Self {
        Self {
            category: None,
            brand: None,
            model: None,
            model_year: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    #[default]
    Newest,
    Oldest,
    PriceHigh,
    PriceLow,
    Comments,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Newest => "newest",
            SortKey::Oldest => "oldest",
            SortKey::PriceHigh => "price-high",
            SortKey::PriceLow => "price-low",
            SortKey::Comments => "comments",
        }
    }

    pub fn is_by_date(&self) -> bool {
        matches!(self, SortKey::Newest | SortKey::Oldest)
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" => Ok(SortKey::Newest),
            "oldest" => Ok(SortKey::Oldest),
            "price-high" => Ok(SortKey::PriceHigh),
            "price-low" => Ok(SortKey::PriceLow),
            "comments" => Ok(SortKey::Comments),
            other => anyhow::bail!("Unknown sort key: {}", other),
        }
    }
}

/// How a page reports whether more results exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountMode {
    /// Ask every source for an authoritative count and report the total.
    #[default]
    Exact,
    /// Never count; fetch one record past the page to report `has_next`.
    #[serde(rename = "none")]
    NoCount,
}

impl FromStr for CountMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(CountMode::Exact),
            "none" => Ok(CountMode::NoCount),
            other => anyhow::bail!("Unknown count mode: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
    pub sort: SortKey,
    pub count_mode: CountMode,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            sort: SortKey::default(),
            count_mode: CountMode::default(),
        }
    }
}

impl PageRequest {
    /// Page forced to at least 1 and limit into `1..=max_limit`.
    pub fn clamped(&self, max_limit: usize) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, max_limit.max(1)),
            ..*self
        }
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    /// Records needed from the top of the sorted union to serve this page,
    /// including the look-ahead record in no-count mode.
    pub fn window(&self) -> usize {
        let window = self.page.saturating_mul(self.limit);
        match self.count_mode {
            CountMode::Exact => window,
            CountMode::NoCount => window.saturating_add(1),
        }
    }

    /// Records to take after the offset.
    pub fn take(&self) -> usize {
        match self.count_mode {
            CountMode::Exact => self.limit,
            CountMode::NoCount => self.limit + 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListRequest {
    pub filters: ListingFilters,
    pub page: PageRequest,
    /// Sources to query; empty means all configured sources
    pub sources: Vec<Source>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfiltered_ignores_blank_text() {
        let mut filters = ListingFilters {
            text: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(filters.is_unfiltered());

        filters.city = Some("Baghdad".to_string());
        assert!(!filters.is_unfiltered());
    }

    #[test]
    fn test_without_tag_and_year_keeps_other_filters() {
        let filters = ListingFilters {
            text: Some("kia".to_string()),
            brand: Some("kia".to_string()),
            model_year: Some(2015),
            max_price: Some(9000.0),
            ..Default::default()
        };
        let stripped = filters.without_tag_and_year();
        assert_eq!(stripped.brand, None);
        assert_eq!(stripped.model_year, None);
        assert_eq!(stripped.text.as_deref(), Some("kia"));
        assert_eq!(stripped.max_price, Some(9000.0));
    }

    #[test]
    fn test_page_request_windows() {
        let page = PageRequest {
            page: 3,
            limit: 10,
            sort: SortKey::Newest,
            count_mode: CountMode::NoCount,
        };
        assert_eq!(page.offset(), 20);
        assert_eq!(page.window(), 31);
        assert_eq!(page.take(), 11);

        let exact = PageRequest {
            count_mode: CountMode::Exact,
            ..page
        };
        assert_eq!(exact.window(), 30);
        assert_eq!(exact.take(), 10);
    }

    #[test]
    fn test_clamped() {
        let page = PageRequest {
            page: 0,
            limit: 500,
            ..Default::default()
        };
        let clamped = page.clamped(100);
        assert_eq!(clamped.page, 1);
        assert_eq!(clamped.limit, 100);
        assert_eq!(PageRequest { limit: 0, ..page }.clamped(100).limit, 1);
    }

    #[test]
    fn test_sort_and_count_mode_parse() {
        assert_eq!("price-high".parse::<SortKey>().unwrap(), SortKey::PriceHigh);
        assert!("cheapest".parse::<SortKey>().is_err());
        assert_eq!("none".parse::<CountMode>().unwrap(), CountMode::NoCount);
        assert_eq!(
            serde_json::to_string(&CountMode::NoCount).unwrap(),
            "\"none\""
        );
    }
}
