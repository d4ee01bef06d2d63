use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::{AnalyticsError, Result};

/// A dimension events can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupDimension {
    Model,
    Provider,
    Date,
}

impl GroupDimension {
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_lowercase().as_str() {
            "model" => Some(Self::Model),
            "provider" => Some(Self::Provider),
            "date" | "day" => Some(Self::Date),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Provider => "provider",
            Self::Date => "date",
        }
    }
}

/// The set of dimensions a query groups by. Empty means one overall bucket.
pub type GroupBy = BTreeSet<GroupDimension>;

/// Key of one aggregate bucket. Dimensions not grouped on are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl GroupKey {
    /// Human-readable label, e.g. "2025-02-24 openai/gpt-4".
    pub fn label(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(date) = self.date {
            parts.push(date.format("%Y-%m-%d").to_string());
        }
        match (&self.provider, &self.model) {
            (Some(p), Some(m)) => parts.push(format!("{}/{}", p, m)),
            (Some(p), None) => parts.push(p.clone()),
            (None, Some(m)) => parts.push(m.clone()),
            (None, None) => {}
        }
        if parts.is_empty() {
            "all".to_string()
        } else {
            parts.join(" ")
        }
    }
}

/// Summary of every event sharing one [`GroupKey`].
///
/// Buckets are derived data. `avg_cost_per_call` is always recomputed from the
/// summed fields, so merging partial buckets never averages averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateBucket {
    pub key: GroupKey,
    pub total_cost: f64,
    pub call_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub avg_cost_per_call: f64,
}

impl AggregateBucket {
    pub fn empty(key: GroupKey) -> Self {
        Self {
            key,
            total_cost: 0.0,
            call_count: 0,
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            avg_cost_per_call: 0.0,
        }
    }

    pub fn record(&mut self, input_tokens: u64, output_tokens: u64, cost: f64) {
        self.call_count += 1;
        self.input_tokens = self.input_tokens.saturating_add(input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(output_tokens);
        self.total_tokens = self.input_tokens.saturating_add(self.output_tokens);
        self.total_cost += cost;
        self.refresh_average();
    }

    pub fn absorb(&mut self, other: &AggregateBucket) {
        self.call_count += other.call_count;
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.total_tokens = self.input_tokens.saturating_add(self.output_tokens);
        self.total_cost += other.total_cost;
        self.refresh_average();
    }

    fn refresh_average(&mut self) {
        self.avg_cost_per_call = if self.call_count == 0 {
            0.0
        } else {
            self.total_cost / self.call_count as f64
        };
    }
}

/// Half-open time interval `[start, end)`. A missing bound is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s >= e {
                return Err(AnalyticsError::validation(
                    "window",
                    format!("start {} is not before end {}", s, e),
                ));
            }
        }
        Ok(Self { start, end })
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| *ts >= s) && self.end.map_or(true, |e| *ts < e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn group_dimension_ids() {
        for dim in [GroupDimension::Model, GroupDimension::Provider, GroupDimension::Date] {
            assert_eq!(GroupDimension::from_id(dim.id()), Some(dim));
        }
        assert_eq!(GroupDimension::from_id("Day"), Some(GroupDimension::Date));
        assert_eq!(GroupDimension::from_id("owner"), None);
    }

    #[test]
    fn window_is_half_open() {
        let w = TimeWindow::new(
            Some(ts("2025-02-01T00:00:00Z")),
            Some(ts("2025-02-02T00:00:00Z")),
        )
        .unwrap();
        assert!(w.contains(&ts("2025-02-01T00:00:00Z")));
        assert!(w.contains(&ts("2025-02-01T23:59:59Z")));
        assert!(!w.contains(&ts("2025-02-02T00:00:00Z")));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let err = TimeWindow::new(
            Some(ts("2025-02-02T00:00:00Z")),
            Some(ts("2025-02-01T00:00:00Z")),
        )
        .unwrap_err();
        assert!(matches!(err, AnalyticsError::Validation { field: "window", .. }));
    }

    #[test]
    fn unbounded_window_contains_everything() {
        assert!(TimeWindow::unbounded().contains(&ts("1999-01-01T00:00:00Z")));
    }

    #[test]
    fn empty_bucket_average_is_zero() {
        let bucket = AggregateBucket::empty(GroupKey::default());
        assert_eq!(bucket.avg_cost_per_call, 0.0);
    }

    #[test]
    fn bucket_average_is_recomputed_on_absorb() {
        let mut a = AggregateBucket::empty(GroupKey::default());
        a.record(10, 10, 1.0);
        let mut b = AggregateBucket::empty(GroupKey::default());
        b.record(10, 10, 2.0);
        b.record(10, 10, 3.0);
        a.absorb(&b);
        assert_eq!(a.call_count, 3);
        assert!((a.avg_cost_per_call - 2.0).abs() < 1e-12);
        assert_eq!(a.total_tokens, 60);
    }

    #[test]
    fn key_labels() {
        let key = GroupKey {
            date: NaiveDate::from_ymd_opt(2025, 2, 24),
            provider: Some("openai".into()),
            model: Some("gpt-4".into()),
        };
        assert_eq!(key.label(), "2025-02-24 openai/gpt-4");
        assert_eq!(GroupKey::default().label(), "all");
    }

    #[test]
    fn dimension_from_id() {
        assert_eq!(GroupDimension::from_id("Model"), Some(GroupDimension::Model));
        assert_eq!(GroupDimension::from_id("day"), Some(GroupDimension::Date));
        assert_eq!(GroupDimension::from_id("owner"), None);
    }
}
