use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three scraped backing sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Marketplace,
    Classifieds,
    Dealers,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Marketplace, Source::Classifieds, Source::Dealers];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Marketplace => "marketplace",
            Source::Classifieds => "classifieds",
            Source::Dealers => "dealers",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|source| source.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("Unknown source: {s}"))
    }
}

/// Ordered category / brand / model tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tags {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCompare {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub current: Option<f64>,
}

/// Source-agnostic listing, produced by each source adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub post_date_epoch_ms: Option<i64>,
    #[serde(default)]
    pub price_numeric: Option<f64>,
    #[serde(default)]
    pub price_formatted: Option<String>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub car_model_year: Option<i32>,
    #[serde(default)]
    pub mileage: Option<u64>,
    #[serde(default)]
    pub images_count: u32,
    #[serde(default)]
    pub has_image: bool,
    #[serde(default)]
    pub comments_count: u32,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub url: String,
    pub source: Source,
    #[serde(default)]
    pub price_compare: Option<PriceCompare>,
}

impl ListingRecord {
    /// Text searched by free-text filters: title, tags and city.
    pub fn searchable_text(&self) -> String {
        [
            self.title.as_str(),
            self.tags.category.as_str(),
            self.tags.brand.as_str(),
            self.tags.model.as_str(),
            self.city.as_str(),
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
    }

    pub fn slim(&self) -> SlimRecord {
        SlimRecord {
            id: self.id.clone(),
            source: self.source,
            post_date_epoch_ms: self.post_date_epoch_ms,
        }
    }
}

/// Id + timestamp projection used by the date-sorted fast path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlimRecord {
    pub id: String,
    pub source: Source,
    pub post_date_epoch_ms: Option<i64>,
}
