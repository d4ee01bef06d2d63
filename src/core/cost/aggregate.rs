use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use crate::core::models::cost::{AggregateBucket, GroupBy, GroupDimension, GroupKey, TimeWindow};
use crate::core::models::usage::UsageEvent;

fn key_for(event: &UsageEvent, group_by: &GroupBy) -> GroupKey {
    GroupKey {
        date: group_by
            .contains(&GroupDimension::Date)
            .then(|| event.timestamp.date_naive()),
        provider: group_by
            .contains(&GroupDimension::Provider)
            .then(|| event.provider.to_lowercase()),
        model: group_by
            .contains(&GroupDimension::Model)
            .then(|| event.model.clone()),
    }
}

/// Group the events inside `window` into one bucket per distinct key.
///
/// Events without a computed cost still count as calls and tokens but add
/// nothing to `total_cost`. The result is sorted by key, so identical inputs
/// always give identical output regardless of event order.
pub fn aggregate(
    events: &[UsageEvent],
    group_by: &GroupBy,
    window: &TimeWindow,
) -> Vec<AggregateBucket> {
    let mut buckets: HashMap<GroupKey, AggregateBucket> = HashMap::new();

    for event in events.iter().filter(|e| window.contains(&e.timestamp)) {
        let key = key_for(event, group_by);
        buckets
            .entry(key)
            .or_insert_with_key(|k| AggregateBucket::empty(k.clone()))
            .record(
                event.input_tokens,
                event.output_tokens,
                event.cost.unwrap_or(0.0),
            );
    }

    debug!(
        events = events.len(),
        buckets = buckets.len(),
        "aggregated usage events"
    );
    sorted_by_key(buckets)
}

/// Combine bucket lists computed over disjoint event sets.
///
/// Counts, costs and tokens add per key; averages are recomputed from the
/// sums. Merging is associative and commutative, so callers may aggregate
/// large inputs in chunks.
pub fn merge_buckets<'a, I>(parts: I) -> Vec<AggregateBucket>
where
    I: IntoIterator<Item = &'a [AggregateBucket]>,
{
    let mut merged: HashMap<GroupKey, AggregateBucket> = HashMap::new();
    for part in parts {
        for bucket in part {
            merged
                .entry(bucket.key.clone())
                .or_insert_with_key(|k| AggregateBucket::empty(k.clone()))
                .absorb(bucket);
        }
    }
    sorted_by_key(merged)
}

/// The `n` most expensive buckets, highest cost first. Ties keep key order.
pub fn top_by_cost(mut buckets: Vec<AggregateBucket>, n: usize) -> Vec<AggregateBucket> {
    buckets.sort_by(|a, b| {
        b.total_cost
            .partial_cmp(&a.total_cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
    buckets.truncate(n);
    buckets
}

/// Buckets in chronological order (date ascending, then the rest of the key).
pub fn time_series(mut buckets: Vec<AggregateBucket>) -> Vec<AggregateBucket> {
    buckets.sort_by(|a, b| a.key.cmp(&b.key));
    buckets
}

fn sorted_by_key(map: HashMap<GroupKey, AggregateBucket>) -> Vec<AggregateBucket> {
    let mut buckets: Vec<AggregateBucket> = map.into_values().collect();
    buckets.sort_by(|a, b| a.key.cmp(&b.key));
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate, Utc};

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn event(model: &str, when: &str, input: u64, output: u64, cost: f64) -> UsageEvent {
        let provider = if model.starts_with("claude") {
            "anthropic"
        } else {
            "openai"
        };
        UsageEvent::new("team-a", provider, model, input, output, ts(when)).with_cost(cost)
    }

    fn group(dims: &[GroupDimension]) -> GroupBy {
        dims.iter().copied().collect()
    }

    fn sample() -> Vec<UsageEvent> {
        vec![
            event("gpt-4", "2025-02-01T10:00:00Z", 1000, 500, 0.06),
            event("gpt-4", "2025-02-01T12:00:00Z", 2000, 1000, 0.12),
            event("gpt-4o", "2025-02-02T09:00:00Z", 1000, 1000, 0.0125),
            event("claude-sonnet-4-5", "2025-02-02T10:00:00Z", 1000, 1000, 0.018),
            event("claude-sonnet-4-5", "2025-02-03T10:00:00Z", 500, 500, 0.009),
        ]
    }

    fn assert_buckets_eq(a: &[AggregateBucket], b: &[AggregateBucket]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert_eq!(x.key, y.key);
            assert_eq!(x.call_count, y.call_count);
            assert_eq!(x.total_tokens, y.total_tokens);
            assert!((x.total_cost - y.total_cost).abs() < 1e-9);
            assert!((x.avg_cost_per_call - y.avg_cost_per_call).abs() < 1e-9);
        }
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let buckets = aggregate(&[], &group(&[GroupDimension::Model]), &TimeWindow::unbounded());
        assert!(buckets.is_empty());
    }

    #[test]
    fn groups_by_model() {
        let buckets = aggregate(
            &sample(),
            &group(&[GroupDimension::Model]),
            &TimeWindow::unbounded(),
        );
        assert_eq!(buckets.len(), 3);
        let gpt4 = buckets
            .iter()
            .find(|b| b.key.model.as_deref() == Some("gpt-4"))
            .unwrap();
        assert_eq!(gpt4.call_count, 2);
        assert_eq!(gpt4.total_tokens, 4500);
        assert!((gpt4.total_cost - 0.18).abs() < 1e-9);
        assert!((gpt4.avg_cost_per_call - 0.09).abs() < 1e-9);
        assert!(gpt4.key.provider.is_none());
        assert!(gpt4.key.date.is_none());
    }

    #[test]
    fn groups_by_provider_and_date() {
        let buckets = aggregate(
            &sample(),
            &group(&[GroupDimension::Provider, GroupDimension::Date]),
            &TimeWindow::unbounded(),
        );
        let keys: Vec<String> = buckets.iter().map(|b| b.key.label()).collect();
        assert_eq!(
            keys,
            vec![
                "2025-02-01 openai",
                "2025-02-02 anthropic",
                "2025-02-02 openai",
                "2025-02-03 anthropic",
            ]
        );
    }

    #[test]
    fn empty_group_by_gives_single_total() {
        let buckets = aggregate(&sample(), &GroupBy::new(), &TimeWindow::unbounded());
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].call_count, 5);
        assert!((buckets[0].total_cost - 0.2195).abs() < 1e-9);
    }

    #[test]
    fn window_filters_half_open() {
        let window = TimeWindow::new(
            Some(ts("2025-02-01T12:00:00Z")),
            Some(ts("2025-02-02T10:00:00Z")),
        )
        .unwrap();
        let buckets = aggregate(&sample(), &GroupBy::new(), &window);
        // 12:00 on the 1st is included, 10:00 on the 2nd is not
        assert_eq!(buckets[0].call_count, 2);
    }

    #[test]
    fn uncosted_events_count_calls_but_not_cost() {
        let events = vec![UsageEvent::new(
            "team-a",
            "openai",
            "gpt-4",
            100,
            100,
            ts("2025-02-01T00:00:00Z"),
        )];
        let buckets = aggregate(&events, &GroupBy::new(), &TimeWindow::unbounded());
        assert_eq!(buckets[0].call_count, 1);
        assert_eq!(buckets[0].total_cost, 0.0);
    }

    #[test]
    fn aggregation_is_associative() {
        let events = sample();
        let (a, b) = events.split_at(2);
        for dims in [
            vec![GroupDimension::Model],
            vec![GroupDimension::Provider],
            vec![GroupDimension::Date],
            vec![GroupDimension::Model, GroupDimension::Date],
            vec![],
        ] {
            let g = group(&dims);
            let whole = aggregate(&events, &g, &TimeWindow::unbounded());
            let part_a = aggregate(a, &g, &TimeWindow::unbounded());
            let part_b = aggregate(b, &g, &TimeWindow::unbounded());
            let merged = merge_buckets([part_a.as_slice(), part_b.as_slice()]);
            assert_buckets_eq(&whole, &merged);

            let swapped = merge_buckets([part_b.as_slice(), part_a.as_slice()]);
            assert_buckets_eq(&merged, &swapped);
        }
    }

    #[test]
    fn aggregation_is_deterministic() {
        let g = group(&[GroupDimension::Model, GroupDimension::Provider]);
        let first = aggregate(&sample(), &g, &TimeWindow::unbounded());
        let mut reversed = sample();
        reversed.reverse();
        let second = aggregate(&reversed, &g, &TimeWindow::unbounded());
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&aggregate(&sample(), &g, &TimeWindow::unbounded())).unwrap()
        );
        let first_keys: Vec<_> = first.iter().map(|b| b.key.clone()).collect();
        let second_keys: Vec<_> = second.iter().map(|b| b.key.clone()).collect();
        assert_eq!(first_keys, second_keys);
    }

    #[test]
    fn top_by_cost_sorts_descending() {
        let buckets = aggregate(
            &sample(),
            &group(&[GroupDimension::Model]),
            &TimeWindow::unbounded(),
        );
        let top = top_by_cost(buckets, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].key.model.as_deref(), Some("gpt-4"));
        assert_eq!(top[1].key.model.as_deref(), Some("claude-sonnet-4-5"));
    }

    #[test]
    fn time_series_is_chronological() {
        let buckets = aggregate(
            &sample(),
            &group(&[GroupDimension::Date]),
            &TimeWindow::unbounded(),
        );
        let series = time_series(top_by_cost(buckets, 10));
        let dates: Vec<NaiveDate> = series.iter().filter_map(|b| b.key.date).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 2, 2).unwrap(),
                NaiveDate::from_ymd_opt(2025, 2, 3).unwrap(),
            ]
        );
    }
}
