//! Savings recommendations: cheaper model substitutes plus a small catalogue
//! of usage-pattern tips. Everything here is a pure function of the events,
//! the pricing registry and the configuration.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::cost::aggregate::aggregate;
use crate::core::cost::calculator::{fill_costs, price_tokens, round_cost};
use crate::core::cost::pricing::{ModelTier, PricingEntry, PricingLookup, PricingRegistry};
use crate::core::error::{AnalyticsError, Result};
use crate::core::models::cost::{AggregateBucket, GroupBy, GroupDimension, TimeWindow};
use crate::core::models::recommendation::{
    Priority, Recommendation, RecommendationKind, RecommendationReport, SkippedItem,
};
use crate::core::models::usage::UsageEvent;

/// When a catalogue tip fires and what it is worth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TipConfig {
    /// Share of calls (0.0 - 1.0) showing the pattern before the tip fires
    pub trigger: f64,
    /// Fraction of the affected cost the tip is expected to save
    pub savings_pct: f64,
    pub confidence: f64,
}

/// Confidence given to a substitute by capability tier distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityScores {
    pub same_tier: f64,
    pub one_tier_down: f64,
    pub two_tiers_down: f64,
    pub cross_provider_penalty: f64,
}

impl Default for SimilarityScores {
    fn default() -> Self {
        Self {
            same_tier: 0.9,
            one_tier_down: 0.6,
            two_tiers_down: 0.3,
            cross_provider_penalty: 0.15,
        }
    }
}

impl SimilarityScores {
    fn score(&self, current: ModelTier, alternative: ModelTier, cross_provider: bool) -> f64 {
        let base = match current.rank().saturating_sub(alternative.rank()) {
            0 => self.same_tier,
            1 => self.one_tier_down,
            _ => self.two_tiers_down,
        };
        let penalty = if cross_provider {
            self.cross_provider_penalty
        } else {
            0.0
        };
        (base - penalty).clamp(0.0, 1.0)
    }
}

/// Savings share of total spend at which priority rises.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityCutpoints {
    pub high_share: f64,
    pub medium_share: f64,
}

impl Default for PriorityCutpoints {
    fn default() -> Self {
        Self {
            high_share: 0.2,
            medium_share: 0.05,
        }
    }
}

impl PriorityCutpoints {
    fn classify(&self, savings: f64, total_spend: f64) -> Priority {
        if total_spend <= 0.0 {
            return Priority::Low;
        }
        let share = savings / total_spend;
        if share >= self.high_share {
            Priority::High
        } else if share >= self.medium_share {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    /// Priced events required before anything is recommended
    pub min_events: usize,
    /// Dollar spend a (provider, model) group needs before a switch is suggested
    pub materiality_floor: f64,
    pub min_confidence: f64,
    /// Calls below this many total tokens count as small
    pub small_call_tokens: u64,
    /// Input/output token ratio above which a prompt counts as long
    pub prompt_ratio: f64,
    /// provider -> providers whose models count as substitutes
    pub adjacent_providers: BTreeMap<String, Vec<String>>,
    pub similarity: SimilarityScores,
    pub priority: PriorityCutpoints,
    pub caching: TipConfig,
    pub batching: TipConfig,
    pub prompt_reduction: TipConfig,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            min_events: 10,
            materiality_floor: 1.0,
            min_confidence: 0.5,
            small_call_tokens: 1000,
            prompt_ratio: 8.0,
            adjacent_providers: BTreeMap::new(),
            similarity: SimilarityScores::default(),
            priority: PriorityCutpoints::default(),
            caching: TipConfig {
                trigger: 0.2,
                savings_pct: 0.5,
                confidence: 0.7,
            },
            batching: TipConfig {
                trigger: 0.5,
                savings_pct: 0.2,
                confidence: 0.6,
            },
            prompt_reduction: TipConfig {
                trigger: 0.3,
                savings_pct: 0.15,
                confidence: 0.5,
            },
        }
    }
}

fn check_fraction(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(AnalyticsError::validation(
            field,
            format!("{} is outside 0.0 - 1.0", value),
        ));
    }
    Ok(())
}

impl RecommendationConfig {
    pub fn validate(&self) -> Result<()> {
        crate::core::error::ensure_non_negative("materiality_floor", self.materiality_floor)?;
        crate::core::error::ensure_non_negative("prompt_ratio", self.prompt_ratio)?;
        check_fraction("min_confidence", self.min_confidence)?;
        check_fraction("similarity.same_tier", self.similarity.same_tier)?;
        check_fraction("similarity.one_tier_down", self.similarity.one_tier_down)?;
        check_fraction("similarity.two_tiers_down", self.similarity.two_tiers_down)?;
        check_fraction(
            "similarity.cross_provider_penalty",
            self.similarity.cross_provider_penalty,
        )?;
        check_fraction("priority.high_share", self.priority.high_share)?;
        check_fraction("priority.medium_share", self.priority.medium_share)?;
        for tip in [&self.caching, &self.batching, &self.prompt_reduction] {
            check_fraction("trigger", tip.trigger)?;
            check_fraction("savings_pct", tip.savings_pct)?;
            check_fraction("confidence", tip.confidence)?;
        }
        Ok(())
    }

    fn is_adjacent(&self, provider: &str, candidate: &str) -> bool {
        let lists = |from: &str, to: &str| {
            self.adjacent_providers
                .iter()
                .filter(|(key, _)| key.eq_ignore_ascii_case(from))
                .any(|(_, list)| list.iter().any(|p| p.eq_ignore_ascii_case(to)))
        };
        lists(provider, candidate) || lists(candidate, provider)
    }
}

/// Build recommendations from usage events.
///
/// Events missing a cost are priced first; unpriceable events are listed in
/// `skipped`. Below `min_events` priced events the report is marked
/// `insufficient_data` and carries no recommendations.
pub fn generate_recommendations(
    events: &[UsageEvent],
    registry: &PricingRegistry,
    config: &RecommendationConfig,
) -> Result<RecommendationReport> {
    config.validate()?;

    let filled = fill_costs(registry, events);
    let skipped: Vec<SkippedItem> = filled
        .failures
        .iter()
        .map(|f| SkippedItem {
            index: f.index,
            provider: f.provider.clone(),
            model: f.model.clone(),
            reason: f.error.to_string(),
        })
        .collect();
    let priced = filled.events;

    if priced.len() < config.min_events {
        debug!(
            priced = priced.len(),
            min_events = config.min_events,
            "not enough events for recommendations"
        );
        return Ok(RecommendationReport {
            recommendations: Vec::new(),
            insufficient_data: true,
            skipped,
        });
    }

    let total_spend: f64 = priced.iter().filter_map(|e| e.cost).sum();

    let mut generated: Vec<Recommendation> = Vec::new();
    generated.extend(model_switches(&priced, registry, config, total_spend));
    generated.extend(caching_tip(&priced, config, total_spend));
    generated.extend(batching_tip(&priced, config, total_spend));
    generated.extend(prompt_reduction_tip(&priced, config, total_spend));

    let mut ordered: Vec<(usize, Recommendation)> = generated
        .into_iter()
        .filter(|r| r.potential_savings > 0.0)
        .enumerate()
        .collect();
    ordered.sort_by(|(ia, a), (ib, b)| {
        b.potential_savings
            .partial_cmp(&a.potential_savings)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| ia.cmp(ib))
    });

    let recommendations: Vec<Recommendation> = ordered.into_iter().map(|(_, r)| r).collect();
    debug!(
        events = priced.len(),
        recommendations = recommendations.len(),
        skipped = skipped.len(),
        "generated recommendations"
    );

    Ok(RecommendationReport {
        recommendations,
        insufficient_data: false,
        skipped,
    })
}

// ── Model switching ───────────────────────────────────────────────────

struct Substitute<'a> {
    entry: &'a PricingEntry,
    cost: f64,
    savings: f64,
    confidence: f64,
}

fn model_switches(
    events: &[UsageEvent],
    registry: &PricingRegistry,
    config: &RecommendationConfig,
    total_spend: f64,
) -> Vec<Recommendation> {
    let group_by: GroupBy = [GroupDimension::Provider, GroupDimension::Model]
        .into_iter()
        .collect();
    let buckets = aggregate(events, &group_by, &TimeWindow::unbounded());

    buckets
        .iter()
        .filter(|b| b.total_cost > config.materiality_floor)
        .filter_map(|bucket| {
            let substitute = best_substitute(bucket, registry, config)?;
            let provider = bucket.key.provider.clone().unwrap_or_default();
            let model = bucket.key.model.clone().unwrap_or_default();
            Some(Recommendation {
                kind: RecommendationKind::ModelSwitch,
                title: format!("Switch {} to {}", model, substitute.entry.model),
                description: format!(
                    "{} calls to {}/{} cost ${:.2}; the same token volume on {}/{} would cost ${:.2}.",
                    bucket.call_count,
                    provider,
                    model,
                    bucket.total_cost,
                    substitute.entry.provider,
                    substitute.entry.model,
                    substitute.cost
                ),
                potential_savings: substitute.savings,
                confidence: substitute.confidence,
                priority: config.priority.classify(substitute.savings, total_spend),
                provider: Some(provider),
                model: Some(model),
                suggested_model: Some(substitute.entry.model.clone()),
            })
        })
        .collect()
}

/// Cheapest acceptable substitute for one (provider, model) group.
fn best_substitute<'a>(
    bucket: &AggregateBucket,
    registry: &'a PricingRegistry,
    config: &RecommendationConfig,
) -> Option<Substitute<'a>> {
    let provider = bucket.key.provider.as_deref()?;
    let model = bucket.key.model.as_deref()?;

    let current = match registry.get_pricing(provider, model) {
        PricingLookup::Exact(entry) | PricingLookup::ProviderDefault(entry) => entry,
        PricingLookup::NotFound => return None,
    };
    let current_model = registry.lookup(provider, model).map(|e| e.model.as_str());

    let mut best: Option<Substitute<'a>> = None;
    for entry in registry.entries() {
        let same_provider = entry.provider == provider;
        if !same_provider && !config.is_adjacent(provider, &entry.provider) {
            continue;
        }
        if same_provider && Some(entry.model.as_str()) == current_model {
            continue;
        }

        let (input_cost, output_cost) =
            price_tokens(entry, bucket.input_tokens, bucket.output_tokens);
        let cost = round_cost(input_cost + output_cost);
        let savings = round_cost(bucket.total_cost - cost);
        let confidence = config
            .similarity
            .score(current.tier, entry.tier, !same_provider);
        if savings <= 0.0 || confidence < config.min_confidence {
            continue;
        }

        let better = match &best {
            None => true,
            Some(b) => savings > b.savings || (savings == b.savings && confidence > b.confidence),
        };
        if better {
            best = Some(Substitute {
                entry,
                cost,
                savings,
                confidence,
            });
        }
    }
    best
}

// ── Optimization catalogue ────────────────────────────────────────────

fn tip(
    title: &str,
    description: String,
    savings: f64,
    tip_config: &TipConfig,
    config: &RecommendationConfig,
    total_spend: f64,
) -> Option<Recommendation> {
    let savings = round_cost(savings);
    (savings > 0.0).then(|| Recommendation {
        kind: RecommendationKind::Optimization,
        title: title.to_string(),
        description,
        potential_savings: savings,
        confidence: tip_config.confidence,
        priority: config.priority.classify(savings, total_spend),
        provider: None,
        model: None,
        suggested_model: None,
    })
}

/// Share of calls matching `pred` and the cost of those calls.
fn slice<F>(events: &[UsageEvent], pred: F) -> (f64, f64)
where
    F: Fn(&UsageEvent) -> bool,
{
    let mut count = 0usize;
    let mut cost = 0.0;
    for event in events.iter().filter(|e| pred(e)) {
        count += 1;
        cost += event.cost.unwrap_or(0.0);
    }
    let rate = if events.is_empty() {
        0.0
    } else {
        count as f64 / events.len() as f64
    };
    (rate, cost)
}

fn caching_tip(
    events: &[UsageEvent],
    config: &RecommendationConfig,
    total_spend: f64,
) -> Option<Recommendation> {
    // A call repeats a prompt shape when an earlier call used the same
    // provider, model and input size.
    let mut ordered: Vec<&UsageEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.timestamp);

    let mut seen: HashSet<(String, &str, u64)> = HashSet::new();
    let mut repeated = 0usize;
    let mut repeated_cost = 0.0;
    for event in ordered {
        let shape = (
            event.provider.to_lowercase(),
            event.model.as_str(),
            event.input_tokens,
        );
        if !seen.insert(shape) {
            repeated += 1;
            repeated_cost += event.cost.unwrap_or(0.0);
        }
    }

    let rate = repeated as f64 / events.len().max(1) as f64;
    if rate <= config.caching.trigger {
        return None;
    }
    tip(
        "Cache repeated responses",
        format!(
            "{:.0}% of calls repeat an earlier prompt shape. Caching those responses avoids paying for them again.",
            rate * 100.0
        ),
        repeated_cost * config.caching.savings_pct,
        &config.caching,
        config,
        total_spend,
    )
}

fn batching_tip(
    events: &[UsageEvent],
    config: &RecommendationConfig,
    total_spend: f64,
) -> Option<Recommendation> {
    let (rate, cost) = slice(events, |e| e.total_tokens() < config.small_call_tokens);
    if rate <= config.batching.trigger {
        return None;
    }
    tip(
        "Batch small requests",
        format!(
            "{:.0}% of calls use fewer than {} tokens. Grouping them into batch requests cuts per-call overhead.",
            rate * 100.0,
            config.small_call_tokens
        ),
        cost * config.batching.savings_pct,
        &config.batching,
        config,
        total_spend,
    )
}

fn prompt_reduction_tip(
    events: &[UsageEvent],
    config: &RecommendationConfig,
    total_spend: f64,
) -> Option<Recommendation> {
    let long_prompt = |e: &UsageEvent| {
        if e.output_tokens == 0 {
            e.input_tokens > 0
        } else {
            e.input_tokens as f64 / e.output_tokens as f64 > config.prompt_ratio
        }
    };
    let (rate, cost) = slice(events, long_prompt);
    if rate <= config.prompt_reduction.trigger {
        return None;
    }
    tip(
        "Shorten prompts",
        format!(
            "{:.0}% of calls send more than {:.0}x as many input tokens as they get back. Trimming context and instructions lowers input spend.",
            rate * 100.0,
            config.prompt_ratio
        ),
        cost * config.prompt_reduction.savings_pct,
        &config.prompt_reduction,
        config,
        total_spend,
    )
}
