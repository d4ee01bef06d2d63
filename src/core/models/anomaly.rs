use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}

/// One observation whose value deviates from its trailing baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub subject_id: String,
    pub observed_value: f64,
    /// Baseline mean
    pub expected_value: f64,
    /// `None` when the baseline has zero variance
    pub z_score: Option<f64>,
    pub severity: Severity,
}

/// Result of an anomaly check.
///
/// `InsufficientData` means no point had a large enough baseline to be judged;
/// it is never the same thing as `Checked(vec![])`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "anomalies", rename_all = "snake_case")]
pub enum AnomalyOutcome {
    InsufficientData,
    Checked(Vec<AnomalyRecord>),
}

impl AnomalyOutcome {
    pub fn insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData)
    }

    pub fn records(&self) -> &[AnomalyRecord] {
        match self {
            Self::InsufficientData => &[],
            Self::Checked(records) => records,
        }
    }
}
