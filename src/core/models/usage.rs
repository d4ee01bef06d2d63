use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::{AnalyticsError, Result};

/// One recorded metered API call.
///
/// Events are append-only: nothing in the kernel mutates one after creation.
/// Filling in a computed cost yields a new event via [`UsageEvent::with_cost`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawUsageEvent")]
pub struct UsageEvent {
    pub owner_id: String,
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Dollar cost; `None` until computed from pricing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl UsageEvent {
    pub fn new(
        owner_id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        input_tokens: u64,
        output_tokens: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            provider: provider.into(),
            model: model.into(),
            input_tokens,
            output_tokens,
            cost: None,
            timestamp,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Untyped wire shape of an event. Token counts arrive as plain JSON numbers
/// and are checked before they become `u64`.
#[derive(Deserialize)]
struct RawUsageEvent {
    owner_id: String,
    provider: String,
    model: String,
    input_tokens: f64,
    output_tokens: f64,
    #[serde(default)]
    cost: Option<f64>,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    tags: BTreeSet<String>,
}

impl TryFrom<RawUsageEvent> for UsageEvent {
    type Error = AnalyticsError;

    fn try_from(raw: RawUsageEvent) -> Result<Self> {
        let cost = match raw.cost {
            Some(c) => Some(crate::core::error::ensure_non_negative("cost", c)?),
            None => None,
        };
        Ok(Self {
            owner_id: raw.owner_id,
            provider: raw.provider,
            model: raw.model,
            input_tokens: validate_token_count("input_tokens", raw.input_tokens)?,
            output_tokens: validate_token_count("output_tokens", raw.output_tokens)?,
            cost,
            timestamp: raw.timestamp,
            tags: raw.tags,
        })
    }
}

/// Convert an untyped token count to `u64`, rejecting negative, fractional
/// and non-finite values.
pub fn validate_token_count(field: &'static str, value: f64) -> Result<u64> {
    let value = crate::core::error::ensure_non_negative(field, value)?;
    if value.fract() != 0.0 {
        return Err(AnalyticsError::validation(
            field,
            format!("{} is not a whole number of tokens", value),
        ));
    }
    if value > u64::MAX as f64 {
        return Err(AnalyticsError::validation(field, "token count overflows u64"));
    }
    Ok(value as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_event_line() {
        let json = r#"{
            "owner_id": "team-a",
            "provider": "openai",
            "model": "gpt-4",
            "input_tokens": 1000,
            "output_tokens": 500,
            "timestamp": "2025-02-24T10:00:00Z",
            "tags": ["batch", "prod"]
        }"#;
        let event: UsageEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.owner_id, "team-a");
        assert_eq!(event.input_tokens, 1000);
        assert_eq!(event.output_tokens, 500);
        assert!(event.cost.is_none());
        assert!(event.tags.contains("batch"));
        assert_eq!(event.total_tokens(), 1500);
    }

    #[test]
    fn deserialize_rejects_negative_tokens() {
        let json = r#"{"owner_id":"a","provider":"openai","model":"gpt-4",
            "input_tokens":-5,"output_tokens":1,"timestamp":"2025-02-24T10:00:00Z"}"#;
        let err = serde_json::from_str::<UsageEvent>(json).unwrap_err();
        assert!(err.to_string().contains("input_tokens"));
    }

    #[test]
    fn deserialize_rejects_negative_cost() {
        let json = r#"{"owner_id":"a","provider":"openai","model":"gpt-4",
            "input_tokens":5,"output_tokens":1,"cost":-0.5,"timestamp":"2025-02-24T10:00:00Z"}"#;
        assert!(serde_json::from_str::<UsageEvent>(json).is_err());
    }

    #[test]
    fn validate_token_count_rules() {
        assert_eq!(validate_token_count("input_tokens", 42.0), Ok(42));
        assert!(validate_token_count("input_tokens", -1.0).is_err());
        assert!(validate_token_count("input_tokens", 1.5).is_err());
        assert!(validate_token_count("input_tokens", f64::NAN).is_err());
        assert!(validate_token_count("input_tokens", f64::INFINITY).is_err());
    }

    #[test]
    fn with_cost_leaves_original_untouched() {
        let ts = "2025-02-24T10:00:00Z".parse().unwrap();
        let event = UsageEvent::new("a", "openai", "gpt-4", 10, 20, ts);
        let priced = event.clone().with_cost(0.5);
        assert!(event.cost.is_none());
        assert_eq!(priced.cost, Some(0.5));
    }

    #[test]
    fn serialize_roundtrip_keeps_cost() {
        let ts = "2025-02-24T10:00:00Z".parse().unwrap();
        let event = UsageEvent::new("a", "openai", "gpt-4", 10, 20, ts)
            .with_cost(0.25)
            .with_tag("prod");
        let json = serde_json::to_string(&event).unwrap();
        let back: UsageEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
