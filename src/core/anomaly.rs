//! Z-score outlier detection over a cost series.
//!
//! Each point is judged against a trailing baseline of the points before it;
//! the point itself never contributes to its own mean or deviation.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::{AnalyticsError, Result};
use crate::core::models::anomaly::{AnomalyOutcome, AnomalyRecord, Severity};
use crate::core::models::cost::AggregateBucket;

/// |z| boundaries between severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityCutpoints {
    /// |z| at or above this is at least medium
    pub medium: f64,
    /// |z| at or above this is high
    pub high: f64,
}

impl Default for SeverityCutpoints {
    fn default() -> Self {
        Self {
            medium: 2.5,
            high: 3.5,
        }
    }
}

impl SeverityCutpoints {
    pub fn classify(&self, abs_z: f64) -> Severity {
        if abs_z >= self.high {
            Severity::High
        } else if abs_z >= self.medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Minimum |z| to flag a point
    pub threshold: f64,
    /// Baseline points required before a point can be judged
    pub min_samples: usize,
    /// Trailing points used as the baseline
    pub baseline_window: usize,
    pub severity: SeverityCutpoints,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            threshold: 2.0,
            min_samples: 5,
            baseline_window: 30,
            severity: SeverityCutpoints::default(),
        }
    }
}

impl AnomalyConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(AnalyticsError::validation(
                "threshold",
                format!("{} must be a positive number", self.threshold),
            ));
        }
        if self.min_samples < 2 {
            return Err(AnalyticsError::validation(
                "min_samples",
                "need at least 2 samples for a standard deviation",
            ));
        }
        if self.baseline_window < self.min_samples {
            return Err(AnalyticsError::validation(
                "baseline_window",
                format!(
                    "{} is smaller than min_samples {}",
                    self.baseline_window, self.min_samples
                ),
            ));
        }
        let cuts = self.severity;
        if !cuts.medium.is_finite() || !cuts.high.is_finite() || cuts.medium > cuts.high {
            return Err(AnalyticsError::validation(
                "severity",
                "cut-points must be finite and ascending",
            ));
        }
        Ok(())
    }
}

/// One labelled value of a series, e.g. a day and its spend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub subject_id: String,
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(subject_id: impl Into<String>, value: f64) -> Self {
        Self {
            subject_id: subject_id.into(),
            value,
        }
    }
}

/// Mean and sample standard deviation (n - 1). Caller guarantees n >= 2.
fn baseline_stats(values: &[SeriesPoint]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().map(|p| p.value).sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|p| (p.value - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    (mean, variance.sqrt())
}

/// Flag points that deviate from their trailing baseline.
///
/// Returns [`AnomalyOutcome::InsufficientData`] when no point has at least
/// `min_samples` predecessors. With a constant baseline any differing value
/// is flagged as high severity and carries no z-score.
pub fn detect_anomalies(series: &[SeriesPoint], config: &AnomalyConfig) -> Result<AnomalyOutcome> {
    config.validate()?;
    if let Some(bad) = series.iter().find(|p| !p.value.is_finite()) {
        return Err(AnalyticsError::validation(
            "series",
            format!("value for '{}' is not finite", bad.subject_id),
        ));
    }

    if series.len() <= config.min_samples {
        debug!(
            points = series.len(),
            min_samples = config.min_samples,
            "not enough data for anomaly detection"
        );
        return Ok(AnomalyOutcome::InsufficientData);
    }

    let mut records = Vec::new();
    for (idx, point) in series.iter().enumerate().skip(config.min_samples) {
        let start = idx.saturating_sub(config.baseline_window);
        let baseline = &series[start..idx];
        let (mean, std_dev) = baseline_stats(baseline);

        let record = if std_dev == 0.0 {
            (point.value != mean).then(|| AnomalyRecord {
                subject_id: point.subject_id.clone(),
                observed_value: point.value,
                expected_value: mean,
                z_score: None,
                severity: Severity::High,
            })
        } else {
            let z = (point.value - mean) / std_dev;
            (z.abs() >= config.threshold).then(|| AnomalyRecord {
                subject_id: point.subject_id.clone(),
                observed_value: point.value,
                expected_value: mean,
                z_score: Some(z),
                severity: config.severity.classify(z.abs()),
            })
        };
        records.extend(record);
    }

    debug!(
        points = series.len(),
        anomalies = records.len(),
        "anomaly detection complete"
    );
    Ok(AnomalyOutcome::Checked(records))
}

/// Turn date-grouped buckets into a chronological daily cost series.
///
/// Buckets without a date are ignored. Days between the first and last
/// bucket that had no events appear with a value of 0.0.
pub fn daily_cost_series(buckets: &[AggregateBucket]) -> Vec<SeriesPoint> {
    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for bucket in buckets {
        if let Some(date) = bucket.key.date {
            *totals.entry(date).or_insert(0.0) += bucket.total_cost;
        }
    }

    let (Some(&first), Some(&last)) = (totals.keys().next(), totals.keys().next_back()) else {
        return Vec::new();
    };
    first
        .iter_days()
        .take_while(|day| *day <= last)
        .map(|day| {
            let value = totals.get(&day).copied().unwrap_or(0.0);
            SeriesPoint::new(day.format("%Y-%m-%d").to_string(), value)
        })
        .collect()
}
