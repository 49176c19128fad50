use chrono::Datelike;
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use crate::listing::ListingRecord;
use crate::text::normalize;

/// Model years accepted as real: `min_year` through next year.
pub fn valid_year_range(min_year: i32) -> RangeInclusive<i32> {
    let next_year = chrono::Utc::now().year() + 1;
    min_year..=next_year
}

/// The record's model year, from the dedicated field or else the first
/// four-digit year in its title.
pub fn record_model_year(record: &ListingRecord, valid: &RangeInclusive<i32>) -> Option<i32> {
    record
        .car_model_year
        .filter(|year| valid.contains(year))
        .or_else(|| extract_year(&record.title, valid))
}

/// First standalone four-digit number in `text` that falls in `valid`.
/// Arabic-Indic digits are recognised.
pub fn extract_year(text: &str, valid: &RangeInclusive<i32>) -> Option<i32> {
    normalize(text)
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| run.len() == 4)
        .filter_map(|run| run.parse::<i32>().ok())
        .find(|year| valid.contains(year))
}

/// Facet values for a set of observed years, newest first.
///
/// When the observed span fits within `span_threshold` the full contiguous
/// range is returned, years without listings included. Wider spans return
/// only the distinct observed years.
pub fn year_options(years: impl IntoIterator<Item = i32>, span_threshold: i32) -> Vec<i32> {
    let distinct: BTreeSet<i32> = years.into_iter().collect();
    let (Some(&min), Some(&max)) = (distinct.first(), distinct.last()) else {
        return Vec::new();
    };

    if max - min <= span_threshold {
        (min..=max).rev().collect()
    } else {
        distinct.into_iter().rev().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_year_from_title() {
        let valid = 1950..=2030;
        assert_eq!(extract_year("Kia Rio 2015 full option", &valid), Some(2015));
        assert_eq!(extract_year("تويوتا كامري موديل٢٠١٨", &valid), Some(2018));
        assert_eq!(extract_year("Mileage 12000 km", &valid), None);
        assert_eq!(extract_year("price 1200 model 1999", &valid), Some(1999));
        assert_eq!(extract_year("no year", &valid), None);
    }

    #[test]
    fn test_narrow_span_fills_gaps() {
        assert_eq!(year_options([2015, 2012, 2015, 2010], 40), vec![
            2015, 2014, 2013, 2012, 2011, 2010
        ]);
    }

    #[test]
    fn test_wide_span_keeps_distinct_values() {
        assert_eq!(year_options([1960, 2020, 2018], 40), vec![2020, 2018, 1960]);
    }

    #[test]
    fn test_empty_years() {
        assert!(year_options(Vec::new(), 40).is_empty());
    }

    #[test]
    fn test_valid_range_includes_next_year() {
        let range = valid_year_range(1950);
        assert_eq!(*range.start(), 1950);
        assert_eq!(*range.end(), chrono::Utc::now().year() + 1);
    }
}
