use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::Args;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cli::output::OutputOptions;
use crate::cli::renderer;
use crate::core::anomaly::{daily_cost_series, detect_anomalies};
use crate::core::budget::evaluate_budget;
use crate::core::config::AppConfig;
use crate::core::cost::aggregate::{aggregate, time_series, top_by_cost};
use crate::core::cost::calculator::{compute_cost, fill_costs, CostBreakdown};
use crate::core::models::budget::{default_alert_threshold, Budget, BudgetPeriod};
use crate::core::models::cost::{GroupBy, GroupDimension, TimeWindow};
use crate::core::models::usage::UsageEvent;
use crate::core::recommend::generate_recommendations;
use crate::core::report::build_report;
use crate::core::store::{EventStore, JsonlEventStore};

/// Which events to analyse.
#[derive(Args, Debug, Clone)]
pub struct EventQuery {
    /// JSON Lines file with one usage event per line
    #[arg(short, long)]
    pub events: PathBuf,

    /// Only events for this owner
    #[arg(long)]
    pub owner: Option<String>,

    /// Inclusive start (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub since: Option<String>,

    /// Exclusive end (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub until: Option<String>,
}

impl EventQuery {
    pub fn window(&self) -> Result<TimeWindow> {
        let start = self.since.as_deref().map(parse_bound).transpose()?;
        let end = self.until.as_deref().map(parse_bound).transpose()?;
        Ok(TimeWindow::new(start, end)?)
    }

    pub fn load(&self) -> Result<Vec<UsageEvent>> {
        let window = self.window()?;
        let store = JsonlEventStore::new(&self.events);
        let events = store.events_in(self.owner.as_deref(), &window)?;
        debug!(path = %store.path().display(), events = events.len(), "selected usage events");
        Ok(events)
    }
}

/// Parse a window bound; a bare date means midnight UTC.
pub fn parse_bound(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}' (expected YYYY-MM-DD or RFC 3339)", value))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("Invalid date '{}'", value))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

pub fn parse_group_by(ids: &[String]) -> Result<GroupBy> {
    let mut group_by = GroupBy::new();
    for id in ids {
        match GroupDimension::from_id(id.trim()) {
            Some(dim) => {
                group_by.insert(dim);
            }
            None => bail!("Unknown group dimension '{}' (expected model, provider or date)", id),
        }
    }
    Ok(group_by)
}

/// Budget to evaluate: `--budget` overrides the amount from the config.
fn resolve_budget(config: &AppConfig, owner: Option<&str>, amount: Option<f64>) -> Option<Budget> {
    let owner = owner.unwrap_or("all");
    match (amount, &config.budget) {
        (Some(amount), Some(configured)) => Some(Budget {
            amount,
            ..configured.for_owner(owner)
        }),
        (Some(amount), None) => Some(Budget {
            owner_id: owner.to_string(),
            amount,
            period: BudgetPeriod::default(),
            alert_threshold: default_alert_threshold(),
        }),
        (None, Some(configured)) => Some(configured.for_owner(owner)),
        (None, None) => None,
    }
}

pub fn report(
    query: &EventQuery,
    budget_amount: Option<f64>,
    config: &AppConfig,
    opts: &OutputOptions,
) -> Result<()> {
    let events = query.load()?;
    let registry = config.pricing_registry()?;
    let budget = resolve_budget(config, query.owner.as_deref(), budget_amount);
    let report = build_report(&events, &registry, budget.as_ref(), &config.analytics())?;
    opts.emit(&report, renderer::render_report)
}

#[derive(Serialize)]
struct CostPayload<'a> {
    provider: &'a str,
    model: &'a str,
    input_tokens: u64,
    output_tokens: u64,
    #[serde(flatten)]
    cost: CostBreakdown,
}

pub fn cost(
    provider: &str,
    model: &str,
    input_tokens: u64,
    output_tokens: u64,
    config: &AppConfig,
    opts: &OutputOptions,
) -> Result<()> {
    let registry = config.pricing_registry()?;
    let cost = compute_cost(&registry, provider, model, input_tokens, output_tokens)?;
    let payload = CostPayload {
        provider,
        model,
        input_tokens,
        output_tokens,
        cost,
    };
    opts.emit(&payload, |p, color| renderer::render_cost(p.provider, p.model, &p.cost, color))
}

pub fn aggregate_cmd(
    query: &EventQuery,
    group_by: &[String],
    top: Option<usize>,
    config: &AppConfig,
    opts: &OutputOptions,
) -> Result<()> {
    let dims = parse_group_by(group_by)?;
    let events = query.load()?;
    let registry = config.pricing_registry()?;
    let filled = fill_costs(&registry, &events);
    if !filled.failures.is_empty() {
        warn!(skipped = filled.failures.len(), "events with unknown providers left out");
    }

    let buckets = aggregate(&filled.events, &dims, &TimeWindow::unbounded());
    let buckets = match top {
        Some(n) => top_by_cost(buckets, n),
        None if dims.contains(&GroupDimension::Date) => time_series(buckets),
        None => buckets,
    };
    let title = if dims.is_empty() {
        "Totals".to_string()
    } else {
        let names: Vec<&str> = dims.iter().map(|d| d.id()).collect();
        format!("By {}", names.join(", "))
    };
    opts.emit(&buckets, |b, color| renderer::render_buckets(&title, b, color))
}

pub fn budget(
    amount: f64,
    spend: f64,
    threshold: Option<f64>,
    config: &AppConfig,
    opts: &OutputOptions,
) -> Result<()> {
    let threshold = threshold
        .or_else(|| config.budget.as_ref().map(|b| b.alert_threshold))
        .unwrap_or_else(default_alert_threshold);
    let evaluation = evaluate_budget(amount, threshold, spend)?;
    opts.emit(&evaluation, renderer::render_budget)
}

pub fn anomalies(
    query: &EventQuery,
    threshold: Option<f64>,
    min_samples: Option<usize>,
    config: &AppConfig,
    opts: &OutputOptions,
) -> Result<()> {
    let mut anomaly = config.anomaly.clone();
    if let Some(threshold) = threshold {
        anomaly.threshold = threshold;
    }
    if let Some(min_samples) = min_samples {
        anomaly.min_samples = min_samples;
        anomaly.baseline_window = anomaly.baseline_window.max(min_samples);
    }

    let events = query.load()?;
    let registry = config.pricing_registry()?;
    let filled = fill_costs(&registry, &events);
    let daily = time_series(aggregate(
        &filled.events,
        &GroupBy::from([GroupDimension::Date]),
        &TimeWindow::unbounded(),
    ));
    let outcome = detect_anomalies(&daily_cost_series(&daily), &anomaly)?;
    opts.emit(&outcome, renderer::render_anomalies)
}

pub fn recommend(query: &EventQuery, config: &AppConfig, opts: &OutputOptions) -> Result<()> {
    let events = query.load()?;
    let registry = config.pricing_registry()?;
    let report = generate_recommendations(&events, &registry, &config.recommendations)?;
    opts.emit(&report, renderer::render_recommendations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::BudgetConfig;
    use std::io::Write;

    #[test]
    fn parse_bound_accepts_date_and_rfc3339() {
        let date = parse_bound("2025-02-24").unwrap();
        assert_eq!(date.to_rfc3339(), "2025-02-24T00:00:00+00:00");

        let ts = parse_bound("2025-02-24T10:30:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-02-24T08:30:00+00:00");

        assert!(parse_bound("yesterday").is_err());
    }

    #[test]
    fn parse_group_by_dimensions() {
        let dims = parse_group_by(&["model".into(), " date".into()]).unwrap();
        assert!(dims.contains(&GroupDimension::Model));
        assert!(dims.contains(&GroupDimension::Date));
        assert!(!dims.contains(&GroupDimension::Provider));

        assert!(parse_group_by(&[]).unwrap().is_empty());
        assert!(parse_group_by(&["owner".into()]).is_err());
    }

    #[test]
    fn inverted_window_is_rejected() {
        let query = EventQuery {
            events: PathBuf::from("unused.jsonl"),
            owner: None,
            since: Some("2025-03-01".into()),
            until: Some("2025-02-01".into()),
        };
        let err = query.window().unwrap_err();
        assert!(err.to_string().contains("window"));
    }

    #[test]
    fn query_loads_owner_and_window() {
        let dir = std::env::temp_dir().join("tkc_test_analyze");
        let _ = std::fs::create_dir_all(&dir);
        let file_path = dir.join("events.jsonl");
        let mut f = std::fs::File::create(&file_path).unwrap();
        writeln!(f, r#"{{"owner_id":"team-a","provider":"openai","model":"gpt-4","input_tokens":1000,"output_tokens":500,"timestamp":"2025-02-24T10:00:00Z"}}"#).unwrap();
        writeln!(f, r#"{{"owner_id":"team-a","provider":"openai","model":"gpt-4","input_tokens":1000,"output_tokens":500,"timestamp":"2025-02-25T10:00:00Z"}}"#).unwrap();
        writeln!(f, r#"{{"owner_id":"team-b","provider":"openai","model":"gpt-4","input_tokens":1000,"output_tokens":500,"timestamp":"2025-02-24T12:00:00Z"}}"#).unwrap();
        drop(f);

        let query = EventQuery {
            events: file_path.clone(),
            owner: Some("team-a".into()),
            since: None,
            until: Some("2025-02-25".into()),
        };
        let events = query.load().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].owner_id, "team-a");

        let _ = std::fs::remove_file(&file_path);
    }

    #[test]
    fn budget_flag_overrides_configured_amount() {
        let mut config = AppConfig::default();
        assert!(resolve_budget(&config, None, None).is_none());

        let budget = resolve_budget(&config, Some("team-a"), Some(50.0)).unwrap();
        assert_eq!(budget.owner_id, "team-a");
        assert_eq!(budget.alert_threshold, 0.8);

        config.budget = Some(BudgetConfig {
            amount: 200.0,
            period: BudgetPeriod::Weekly,
            alert_threshold: 0.9,
        });
        let budget = resolve_budget(&config, None, Some(50.0)).unwrap();
        assert_eq!(budget.amount, 50.0);
        assert_eq!(budget.period, BudgetPeriod::Weekly);
        assert_eq!(budget.alert_threshold, 0.9);
        assert_eq!(budget.owner_id, "all");

        let budget = resolve_budget(&config, None, None).unwrap();
        assert_eq!(budget.amount, 200.0);
    }
}
