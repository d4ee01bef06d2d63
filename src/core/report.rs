use serde::Serialize;
use tracing::debug;

use crate::core::anomaly::{daily_cost_series, detect_anomalies};
use crate::core::budget::evaluate;
use crate::core::config::AnalyticsConfig;
use crate::core::cost::aggregate::{aggregate, time_series, top_by_cost};
use crate::core::cost::calculator::{fill_costs, CostFailure, PricingFallback};
use crate::core::cost::pricing::PricingRegistry;
use crate::core::error::Result;
use crate::core::models::anomaly::AnomalyOutcome;
use crate::core::models::budget::{Budget, BudgetEvaluation};
use crate::core::models::cost::{AggregateBucket, GroupBy, GroupDimension, TimeWindow};
use crate::core::models::recommendation::RecommendationReport;
use crate::core::models::usage::UsageEvent;
use crate::core::recommend::generate_recommendations;

/// Everything the kernel derives from one snapshot of events.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub total_cost: f64,
    pub call_count: u64,
    pub total_tokens: u64,
    /// Most expensive models first
    pub by_model: Vec<AggregateBucket>,
    pub by_provider: Vec<AggregateBucket>,
    /// One bucket per day, oldest first
    pub daily: Vec<AggregateBucket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetEvaluation>,
    pub anomalies: AnomalyOutcome,
    pub recommendations: RecommendationReport,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pricing_fallbacks: Vec<PricingFallback>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<CostFailure>,
}

fn group(dims: &[GroupDimension]) -> GroupBy {
    dims.iter().copied().collect()
}

/// Price, aggregate and analyse a batch of events.
///
/// Events that cannot be priced are reported in `failures` and left out of
/// every figure; they do not abort the report.
pub fn build_report(
    events: &[UsageEvent],
    registry: &PricingRegistry,
    budget: Option<&Budget>,
    config: &AnalyticsConfig,
) -> Result<AnalyticsReport> {
    let filled = fill_costs(registry, events);
    let priced = &filled.events;
    let window = TimeWindow::unbounded();

    let overall = aggregate(priced, &GroupBy::new(), &window);
    let (total_cost, call_count, total_tokens) = overall
        .first()
        .map(|b| (b.total_cost, b.call_count, b.total_tokens))
        .unwrap_or((0.0, 0, 0));

    let by_model = top_by_cost(
        aggregate(priced, &group(&[GroupDimension::Provider, GroupDimension::Model]), &window),
        config.top_models,
    );
    let by_provider = top_by_cost(
        aggregate(priced, &group(&[GroupDimension::Provider]), &window),
        usize::MAX,
    );
    let daily = time_series(aggregate(priced, &group(&[GroupDimension::Date]), &window));

    let budget = match budget {
        Some(b) => Some(evaluate(b, total_cost)?),
        None => None,
    };

    let anomalies = detect_anomalies(&daily_cost_series(&daily), &config.anomaly)?;
    let recommendations = generate_recommendations(priced, registry, &config.recommendations)?;

    debug!(
        events = events.len(),
        priced = priced.len(),
        total_cost,
        "built analytics report"
    );

    Ok(AnalyticsReport {
        total_cost,
        call_count,
        total_tokens,
        by_model,
        by_provider,
        daily,
        budget,
        anomalies,
        recommendations,
        pricing_fallbacks: filled.fallbacks,
        failures: filled.failures,
    })
}
