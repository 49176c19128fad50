use std::cmp::Ordering;

use super::filters::SortKey;
use crate::listing::{ListingRecord, SlimRecord};

/// Shared ordering for merged listings.
///
/// Missing dates and prices always sort last. Price and comment orderings
/// break ties by newest first; id is the final tie-break so every adapter
/// and the merger agree on one total order.
pub fn compare_records(a: &ListingRecord, b: &ListingRecord, sort: SortKey) -> Ordering {
    let primary = match sort {
        SortKey::Newest | SortKey::Oldest => Ordering::Equal,
        SortKey::PriceHigh => missing_last(a.price_numeric, b.price_numeric, |x, y| y.total_cmp(&x)),
        SortKey::PriceLow => missing_last(a.price_numeric, b.price_numeric, |x, y| x.total_cmp(&y)),
        SortKey::Comments => b.comments_count.cmp(&a.comments_count),
    };

    let date_sort = if sort == SortKey::Oldest {
        SortKey::Oldest
    } else {
        SortKey::Newest
    };

    primary
        .then_with(|| compare_dates(a.post_date_epoch_ms, b.post_date_epoch_ms, date_sort))
        .then_with(|| a.id.cmp(&b.id))
}

/// Date ordering for id + timestamp projections.
pub fn compare_slim(a: &SlimRecord, b: &SlimRecord, sort: SortKey) -> Ordering {
    compare_dates(a.post_date_epoch_ms, b.post_date_epoch_ms, sort).then_with(|| a.id.cmp(&b.id))
}

fn compare_dates(a: Option<i64>, b: Option<i64>, sort: SortKey) -> Ordering {
    match sort {
        SortKey::Oldest => missing_last(a, b, |x, y| x.cmp(&y)),
        _ => missing_last(a, b, |x, y| y.cmp(&x)),
    }
}

fn missing_last<T: Copy>(a: Option<T>, b: Option<T>, cmp: impl Fn(T, T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn sort_records(records: &mut [ListingRecord], sort: SortKey) {
    records.sort_by(|a, b| compare_records(a, b, sort));
}
