use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::cost::pricing::{PricingEntry, PricingLookup, PricingRegistry};
use crate::core::error::{ensure_non_negative, AnalyticsError, Result};
use crate::core::models::usage::UsageEvent;

/// Decimal places kept on every computed cost.
pub const COST_PRECISION: i32 = 6;

/// Which registry entry priced an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingSource {
    Exact,
    ProviderDefault,
}

/// A computed cost together with the pricing path that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub source: PricingSource,
    /// Model name of the entry actually used ("default" for fallbacks)
    pub priced_as: String,
}

/// Round a dollar amount to [`COST_PRECISION`] decimal places.
pub fn round_cost(value: f64) -> f64 {
    let scale = 10f64.powi(COST_PRECISION);
    (value * scale).round() / scale
}

/// Calculate cost for given token counts against one pricing entry.
pub fn price_tokens(pricing: &PricingEntry, input_tokens: u64, output_tokens: u64) -> (f64, f64) {
    let input_cost = input_tokens as f64 / 1000.0 * pricing.input_price_per_1k;
    let output_cost = output_tokens as f64 / 1000.0 * pricing.output_price_per_1k;
    (input_cost, output_cost)
}

/// Cost of one call: exact model price, else the provider default.
/// A known provider without a default gives `UnknownPricing`; an unknown
/// provider gives `UnknownProvider`.
pub fn compute_cost(
    registry: &PricingRegistry,
    provider: &str,
    model: &str,
    input_tokens: u64,
    output_tokens: u64,
) -> Result<CostBreakdown> {
    let (entry, source) = match registry.get_pricing(provider, model) {
        PricingLookup::Exact(entry) => (entry, PricingSource::Exact),
        PricingLookup::ProviderDefault(entry) => (entry, PricingSource::ProviderDefault),
        PricingLookup::NotFound if registry.knows_provider(provider) => {
            return Err(AnalyticsError::UnknownPricing {
                provider: provider.to_string(),
                model: model.to_string(),
            })
        }
        PricingLookup::NotFound => {
            return Err(AnalyticsError::UnknownProvider {
                provider: provider.to_string(),
            })
        }
    };

    let (input_cost, output_cost) = price_tokens(entry, input_tokens, output_tokens);
    Ok(CostBreakdown {
        input_cost: round_cost(input_cost),
        output_cost: round_cost(output_cost),
        total_cost: round_cost(input_cost + output_cost),
        source,
        priced_as: entry.model.clone(),
    })
}

pub fn compute_event_cost(registry: &PricingRegistry, event: &UsageEvent) -> Result<CostBreakdown> {
    compute_cost(
        registry,
        &event.provider,
        &event.model,
        event.input_tokens,
        event.output_tokens,
    )
}

/// An event priced with its provider's default entry instead of a model entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingFallback {
    pub index: usize,
    pub provider: String,
    pub model: String,
}

/// An event that could not be priced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostFailure {
    pub index: usize,
    pub provider: String,
    pub model: String,
    pub error: AnalyticsError,
}

/// Result of pricing a batch. Failed items are left out of `events`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CostFillOutcome {
    pub events: Vec<UsageEvent>,
    pub fallbacks: Vec<PricingFallback>,
    pub failures: Vec<CostFailure>,
}

/// Fill in missing costs across a batch.
///
/// Events that already carry a cost keep it. A failing item is reported and
/// skipped; the rest of the batch is still priced.
pub fn fill_costs(registry: &PricingRegistry, events: &[UsageEvent]) -> CostFillOutcome {
    let mut outcome = CostFillOutcome::default();

    for (index, event) in events.iter().enumerate() {
        if let Some(existing) = event.cost {
            match ensure_non_negative("cost", existing) {
                Ok(_) => outcome.events.push(event.clone()),
                Err(error) => outcome.failures.push(failure(index, event, error)),
            }
            continue;
        }

        match compute_event_cost(registry, event) {
            Ok(breakdown) => {
                if breakdown.source == PricingSource::ProviderDefault {
                    warn!(
                        provider = %event.provider,
                        model = %event.model,
                        "no model pricing, using provider default"
                    );
                    outcome.fallbacks.push(PricingFallback {
                        index,
                        provider: event.provider.clone(),
                        model: event.model.clone(),
                    });
                }
                outcome.events.push(event.clone().with_cost(breakdown.total_cost));
            }
            Err(error) => {
                warn!(index, provider = %event.provider, %error, "skipping unpriced event");
                outcome.failures.push(failure(index, event, error));
            }
        }
    }

    debug!(
        priced = outcome.events.len(),
        fallbacks = outcome.fallbacks.len(),
        failures = outcome.failures.len(),
        "filled event costs"
    );
    outcome
}

fn failure(index: usize, event: &UsageEvent, error: AnalyticsError) -> CostFailure {
    CostFailure {
        index,
        provider: event.provider.clone(),
        model: event.model.clone(),
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cost::pricing::ModelTier;

    fn event(provider: &str, model: &str, input: u64, output: u64) -> UsageEvent {
        UsageEvent::new(
            "team-a",
            provider,
            model,
            input,
            output,
            "2025-02-24T10:00:00Z".parse().unwrap(),
        )
    }

    #[test]
    fn gpt4_end_to_end_example() {
        let registry = PricingRegistry::builtin();
        let cost = compute_cost(&registry, "openai", "gpt-4", 1000, 500).unwrap();
        assert!((cost.input_cost - 0.03).abs() < 1e-9);
        assert!((cost.output_cost - 0.03).abs() < 1e-9);
        assert!((cost.total_cost - 0.06).abs() < 1e-9);
        assert_eq!(cost.source, PricingSource::Exact);
    }

    #[test]
    fn cost_is_linear_in_tokens() {
        let registry = PricingRegistry::builtin();
        let single = compute_cost(&registry, "anthropic", "claude-sonnet-4-5", 4000, 2000).unwrap();
        let double = compute_cost(&registry, "anthropic", "claude-sonnet-4-5", 8000, 4000).unwrap();
        assert!((double.total_cost - 2.0 * single.total_cost).abs() < 1e-9);
    }

    #[test]
    fn cost_is_non_negative() {
        let registry = PricingRegistry::builtin();
        for entry in registry.entries() {
            let cost = compute_cost(&registry, &entry.provider, &entry.model, 0, 0).unwrap();
            assert_eq!(cost.total_cost, 0.0);
            let cost = compute_cost(&registry, &entry.provider, &entry.model, 123, 456).unwrap();
            assert!(cost.total_cost >= 0.0);
        }
    }

    #[test]
    fn cost_is_rounded_to_six_places() {
        let mut registry = PricingRegistry::new();
        registry
            .insert(PricingEntry::new("acme", "tiny", 0.0000001, 0.0, ModelTier::Economy))
            .unwrap();
        let cost = compute_cost(&registry, "acme", "tiny", 1, 0).unwrap();
        assert_eq!(cost.total_cost, 0.0);
        assert_eq!(round_cost(0.1234564), 0.123456);
        assert_eq!(round_cost(0.1234566), 0.123457);
    }

    #[test]
    fn unknown_model_uses_provider_default_and_records_it() {
        let registry = PricingRegistry::builtin();
        let cost = compute_cost(&registry, "openai", "gpt-unknown", 1000, 1000).unwrap();
        assert_eq!(cost.source, PricingSource::ProviderDefault);
        assert_eq!(cost.priced_as, "default");
        assert!((cost.total_cost - 0.0125).abs() < 1e-9);
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let registry = PricingRegistry::builtin();
        let err = compute_cost(&registry, "acme", "rocket", 10, 10).unwrap_err();
        assert_eq!(
            err,
            AnalyticsError::UnknownProvider {
                provider: "acme".into()
            }
        );
    }

    #[test]
    fn unknown_model_without_default_is_unknown_pricing() {
        let mut registry = PricingRegistry::new();
        registry
            .insert(PricingEntry::new("acme", "rocket-1", 0.01, 0.02, ModelTier::Standard))
            .unwrap();
        assert!(compute_cost(&registry, "acme", "rocket-1", 10, 10).is_ok());

        let err = compute_cost(&registry, "acme", "rocket-2", 10, 10).unwrap_err();
        assert_eq!(
            err,
            AnalyticsError::UnknownPricing {
                provider: "acme".into(),
                model: "rocket-2".into(),
            }
        );

        let event = UsageEvent::new("team-a", "acme", "rocket-2", 10, 10, chrono::Utc::now());
        let outcome = fill_costs(&registry, &[event]);
        assert!(matches!(
            outcome.failures[0].error,
            AnalyticsError::UnknownPricing { .. }
        ));
    }

    #[test]
    fn fill_costs_skips_and_reports_failures() {
        let registry = PricingRegistry::builtin();
        let events = vec![
            event("openai", "gpt-4", 1000, 500),
            event("acme", "rocket", 10, 10),
            event("openai", "gpt-unknown", 1000, 1000),
            event("openai", "gpt-4", 1, 1).with_cost(9.0),
        ];
        let outcome = fill_costs(&registry, &events);

        assert_eq!(outcome.events.len(), 3);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 1);
        assert_eq!(outcome.fallbacks.len(), 1);
        assert_eq!(outcome.fallbacks[0].index, 2);
        assert!((outcome.events[0].cost.unwrap() - 0.06).abs() < 1e-9);
        // Pre-computed costs are kept as-is
        assert_eq!(outcome.events[2].cost, Some(9.0));
        // Inputs are untouched
        assert!(events[0].cost.is_none());
    }

    #[test]
    fn fill_costs_rejects_negative_existing_cost() {
        let registry = PricingRegistry::builtin();
        let events = vec![event("openai", "gpt-4", 1, 1).with_cost(-1.0)];
        let outcome = fill_costs(&registry, &events);
        assert!(outcome.events.is_empty());
        assert!(matches!(
            outcome.failures[0].error,
            AnalyticsError::Validation { field: "cost", .. }
        ));
    }
}
