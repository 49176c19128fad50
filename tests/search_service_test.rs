use std::sync::Arc;
use tempfile::TempDir;

use listing_search::config::Config;
use listing_search::listing::Source;
use listing_search::search::{
    CountMode, InMemorySource, ListRequest, ListingFilters, PageRequest, SortKey, SourceAdapter,
    SourceListMerger, SuggestionService,
};

const MARKETPLACE: &str = r#"[
  {"id": "m1", "title": "Toyota Camry 2018 full option", "city": "Baghdad",
   "postDateEpochMs": 1700000000000, "priceNumeric": 21000,
   "tags": {"category": "cars", "brand": "Toyota", "model": "Camry"}, "source": "marketplace"},
  {"id": "m2", "title": "BMW X5 2019", "city": "Erbil",
   "postDateEpochMs": 1700000500000, "priceNumeric": 45000,
   "tags": {"category": "cars", "brand": "BMW", "model": "X5"}, "source": "marketplace"},
  {"id": "m3", "title": "N/A", "city": "Basra", "carModelYear": 2012,
   "postDateEpochMs": 1690000000000, "priceNumeric": 6000,
   "tags": {"category": "cars", "brand": "Kia", "model": "Rio"}, "source": "marketplace"}
]"#;

const CLASSIFIEDS: &str = r#"[
  {"id": "c1", "title": "تويوتا كامري ٢٠١٥", "city": "بغداد",
   "postDateEpochMs": 1700000900000, "priceNumeric": 15000,
   "tags": {"category": "سيارات", "brand": "تويوتا", "model": "كامري"}, "source": "classifieds"},
  {"id": "c2", "title": "BMW X3 2017", "city": "Erbil",
   "postDateEpochMs": 1699000000000,
   "tags": {"category": "cars", "brand": "BMW", "model": "X3"}, "source": "classifieds"}
]"#;

async fn load(dir: &TempDir) -> Vec<Arc<dyn SourceAdapter>> {
    std::fs::write(dir.path().join("marketplace.json"), MARKETPLACE).unwrap();
    std::fs::write(dir.path().join("classifieds.json"), CLASSIFIEDS).unwrap();

    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    for source in [Source::Marketplace, Source::Classifieds] {
        let path = dir.path().join(format!("{}.json", source));
        adapters.push(Arc::new(InMemorySource::from_json_file(source, &path).await.unwrap()));
    }
    adapters
}

#[tokio::test]
async fn test_load_rejects_malformed_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dealers.json");
    std::fs::write(&path, "{not json").unwrap();

    let err = InMemorySource::from_json_file(Source::Dealers, &path)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Failed to parse listings"));
}

#[tokio::test]
async fn test_text_search_across_sources() {
    let dir = TempDir::new().unwrap();
    let merger = SourceListMerger::new(load(&dir).await, &Config::default()).unwrap();

    let request = ListRequest {
        filters: ListingFilters {
            text: Some("bmw x5".to_string()),
            ..Default::default()
        },
        page: PageRequest {
            page: 1,
            limit: 10,
            sort: SortKey::Newest,
            count_mode: CountMode::Exact,
        },
        sources: Vec::new(),
    };
    let page = merger.list(&request).await.unwrap();
    let ids: Vec<&str> = page.items.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["m2"]);
    assert_eq!(page.total, Some(1));
}

#[tokio::test]
async fn test_year_facet_fills_range() {
    let dir = TempDir::new().unwrap();
    let merger = SourceListMerger::new(load(&dir).await, &Config::default()).unwrap();

    let years = merger
        .model_year_facet(&ListingFilters::default(), &[])
        .await
        .unwrap();
    assert_eq!(
        years,
        vec![2019, 2018, 2017, 2016, 2015, 2014, 2013, 2012]
    );

    let classifieds = merger
        .model_year_facet(&ListingFilters::default(), &[Source::Classifieds])
        .await
        .unwrap();
    assert_eq!(classifieds, vec![2017, 2016, 2015]);
}

#[tokio::test]
async fn test_suggestions_rank_brand_first() {
    let dir = TempDir::new().unwrap();
    let service = SuggestionService::new(load(&dir).await, &Config::default()).unwrap();

    let labels = service.suggest("bmw", &[], 5).await.unwrap();
    assert_eq!(labels[0], "BMW");
    assert!(labels.contains(&"BMW X5".to_string()));
    assert!(labels.contains(&"BMW X3".to_string()));

    assert!(service.suggest("b", &[], 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_suggestions_skip_placeholder_titles() {
    let dir = TempDir::new().unwrap();
    let service = SuggestionService::new(load(&dir).await, &Config::default()).unwrap();

    let labels = service.suggest("kia", &[Source::Marketplace], 10).await.unwrap();
    assert_eq!(labels, vec!["Kia", "Kia Rio"]);
}
