use serde::Serialize;
use thiserror::Error;

/// Errors raised by the analytics kernel.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalyticsError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("No pricing for model '{model}' from provider '{provider}'")]
    UnknownPricing { provider: String, model: String },
    #[error("Unknown provider: '{provider}'")]
    UnknownProvider { provider: String },
}

impl AnalyticsError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Reject negative, NaN and infinite values for a named numeric input.
pub fn ensure_non_negative(field: &'static str, value: f64) -> Result<f64> {
    if !value.is_finite() {
        return Err(AnalyticsError::validation(field, format!("{} is not finite", value)));
    }
    if value < 0.0 {
        return Err(AnalyticsError::validation(field, format!("{} is negative", value)));
    }
    Ok(value)
}
