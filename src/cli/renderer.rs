use colored::{control, ColoredString, Colorize};

use crate::core::cost::calculator::{CostBreakdown, PricingSource};
use crate::core::formatter::{
    format_money, format_tokens, format_usage_bar, format_used_percent, format_z_score,
};
use crate::core::models::anomaly::{AnomalyOutcome, Severity};
use crate::core::models::budget::{BudgetEvaluation, BudgetStatus};
use crate::core::models::cost::AggregateBucket;
use crate::core::models::recommendation::{Priority, RecommendationReport};
use crate::core::report::AnalyticsReport;

const BAR_WIDTH: usize = 12;
const RECENT_DAYS: usize = 10;

/// Render a full analytics report.
///
/// Layout:
/// ```text
///  Usage report
///   Total     $4.22 (70 calls, 108.7K tokens)
///   Budget    Exceeded  106% used [████████████]
///   By Model:
///     openai/gpt-4             $4.22     (73.0K in / 35.0K out)
///   Recent Days:
///     Feb 11       $2.41
///   Anomalies:
///     2025-02-11   $2.41 vs $0.18 expected  +40.1σ  High
///   Recommendations:
///     [high] Switch gpt-4 to gpt-5-mini  saves $3.90 (90% confidence)
/// ```
pub fn render_report(report: &AnalyticsReport, use_color: bool) -> String {
    control::set_override(use_color);

    let mut lines: Vec<String> = Vec::new();
    lines.push(" Usage report".bold().to_string());
    lines.push(format!(
        "  {}     {} ({} calls, {} tokens)",
        "Total".cyan(),
        format_money(report.total_cost),
        report.call_count,
        format_tokens(report.total_tokens)
    ));

    if let Some(budget) = &report.budget {
        push_budget_line(&mut lines, budget);
    }

    if !report.by_model.is_empty() {
        lines.push(format!("  {}:", "By Model".cyan()));
        push_bucket_lines(&mut lines, &report.by_model);
    }

    if report.by_provider.len() > 1 {
        lines.push(format!("  {}:", "By Provider".cyan()));
        push_bucket_lines(&mut lines, &report.by_provider);
    }

    if !report.daily.is_empty() {
        lines.push(format!("  {}:", "Recent Days".cyan()));
        let skip = report.daily.len().saturating_sub(RECENT_DAYS);
        for day in report.daily.iter().skip(skip) {
            let label = day.key.date.map(|d| d.format("%b %d").to_string()).unwrap_or_default();
            lines.push(format!("    {:<12} {}", label, format_money(day.total_cost)));
        }
    }

    lines.push(format!("  {}:", "Anomalies".cyan()));
    push_anomaly_lines(&mut lines, &report.anomalies);

    lines.push(format!("  {}:", "Recommendations".cyan()));
    push_recommendation_lines(&mut lines, &report.recommendations);

    if !report.pricing_fallbacks.is_empty() {
        lines.push(format!(
            "  {} {} event(s) priced with a provider default",
            "Note".yellow(),
            report.pricing_fallbacks.len()
        ));
    }
    for failure in &report.failures {
        lines.push(format!(
            "  {} event {} ({}/{}): {}",
            "Skipped".red(),
            failure.index,
            failure.provider,
            failure.model,
            failure.error
        ));
    }

    lines.join("\n")
}

/// Render a list of aggregate buckets under a heading.
pub fn render_buckets(title: &str, buckets: &[AggregateBucket], use_color: bool) -> String {
    control::set_override(use_color);

    let mut lines = vec![format!(" {}", title).bold().to_string()];
    if buckets.is_empty() {
        lines.push(format!("  {}", "No events in range".dimmed()));
    } else {
        push_bucket_lines(&mut lines, buckets);
    }
    lines.join("\n")
}

/// Render one priced call.
pub fn render_cost(provider: &str, model: &str, cost: &CostBreakdown, use_color: bool) -> String {
    control::set_override(use_color);

    let source = match cost.source {
        PricingSource::Exact => cost.priced_as.normal(),
        PricingSource::ProviderDefault => format!("{} default", provider).yellow(),
    };
    [
        format!(" {}/{}", provider, model).bold().to_string(),
        format!("  {}     {}", "Input".cyan(), format_money(cost.input_cost)),
        format!("  {}    {}", "Output".cyan(), format_money(cost.output_cost)),
        format!("  {}     {}", "Total".cyan(), format_money(cost.total_cost)),
        format!("  {} {}", "Priced as".cyan(), source),
    ]
    .join("\n")
}

pub fn render_budget(budget: &BudgetEvaluation, use_color: bool) -> String {
    control::set_override(use_color);

    let mut lines = vec![" Budget".bold().to_string()];
    push_budget_line(&mut lines, budget);
    lines.push(format!(
        "  {}     {} of {}",
        "Spend".cyan(),
        format_money(budget.spend),
        format_money(budget.amount)
    ));
    if budget.overage > 0.0 {
        lines.push(format!("  {}   {}", "Overage".cyan(), format_money(budget.overage).red()));
    } else {
        lines.push(format!("  {} {}", "Remaining".cyan(), format_money(budget.remaining)));
    }
    lines.join("\n")
}

pub fn render_anomalies(outcome: &AnomalyOutcome, use_color: bool) -> String {
    control::set_override(use_color);

    let mut lines = vec![" Anomalies".bold().to_string()];
    push_anomaly_lines(&mut lines, outcome);
    lines.join("\n")
}

pub fn render_recommendations(report: &RecommendationReport, use_color: bool) -> String {
    control::set_override(use_color);

    let mut lines = vec![" Recommendations".bold().to_string()];
    push_recommendation_lines(&mut lines, report);
    for skipped in &report.skipped {
        lines.push(format!(
            "  {} event {} ({}/{}): {}",
            "Skipped".red(),
            skipped.index,
            skipped.provider,
            skipped.model,
            skipped.reason
        ));
    }
    lines.join("\n")
}

fn push_budget_line(lines: &mut Vec<String>, budget: &BudgetEvaluation) {
    let percent = format_used_percent(budget.used_fraction);
    let bar = format_usage_bar(budget.used_fraction, BAR_WIDTH);
    lines.push(format!(
        "  {}    {}  {} {}",
        "Budget".cyan(),
        color_by_status(budget.status, &format!("{:<8}", budget.status.to_string())),
        percent,
        bar.magenta()
    ));
}

fn push_bucket_lines(lines: &mut Vec<String>, buckets: &[AggregateBucket]) {
    for bucket in buckets {
        lines.push(format!(
            "    {:<24} {:<9} ({} in / {} out, {} calls)",
            bucket.key.label(),
            format_money(bucket.total_cost),
            format_tokens(bucket.input_tokens),
            format_tokens(bucket.output_tokens),
            bucket.call_count
        ));
    }
}

fn push_anomaly_lines(lines: &mut Vec<String>, outcome: &AnomalyOutcome) {
    match outcome {
        AnomalyOutcome::InsufficientData => {
            lines.push(format!("    {}", "Not enough history".dimmed()));
        }
        AnomalyOutcome::Checked(records) if records.is_empty() => {
            lines.push(format!("    {}", "None".green()));
        }
        AnomalyOutcome::Checked(records) => {
            for record in records {
                lines.push(format!(
                    "    {:<12} {} vs {} expected  {}  {}",
                    record.subject_id,
                    format_money(record.observed_value),
                    format_money(record.expected_value),
                    format_z_score(record.z_score),
                    color_by_severity(record.severity)
                ));
            }
        }
    }
}

fn push_recommendation_lines(lines: &mut Vec<String>, report: &RecommendationReport) {
    if report.insufficient_data {
        lines.push(format!("    {}", "Not enough priced events".dimmed()));
        return;
    }
    if report.recommendations.is_empty() {
        lines.push(format!("    {}", "None".green()));
        return;
    }
    for rec in &report.recommendations {
        lines.push(format!(
            "    {} {}  saves {} ({:.0}% confidence)",
            color_by_priority(rec.priority),
            rec.title,
            format_money(rec.potential_savings),
            rec.confidence * 100.0
        ));
        lines.push(format!("      {}", rec.description.dimmed()));
    }
}

fn color_by_status(status: BudgetStatus, text: &str) -> ColoredString {
    match status {
        BudgetStatus::Ok => text.green(),
        BudgetStatus::Warning => text.yellow(),
        BudgetStatus::Exceeded => text.red(),
    }
}

fn color_by_severity(severity: Severity) -> ColoredString {
    let text = severity.to_string();
    match severity {
        Severity::Low => text.normal(),
        Severity::Medium => text.yellow(),
        Severity::High => text.red(),
    }
}

fn color_by_priority(priority: Priority) -> ColoredString {
    let text = format!("[{}]", priority);
    match priority {
        Priority::Low => text.dimmed(),
        Priority::Medium => text.yellow(),
        Priority::High => text.red(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::budget::evaluate_budget;
    use crate::core::config::AnalyticsConfig;
    use crate::core::cost::calculator::compute_cost;
    use crate::core::cost::pricing::PricingRegistry;
    use crate::core::models::anomaly::AnomalyRecord;
    use crate::core::models::usage::UsageEvent;
    use crate::core::report::build_report;
    use chrono::{Duration, Utc};

    fn make_report() -> AnalyticsReport {
        let start = Utc::now() - Duration::days(3);
        let events: Vec<UsageEvent> = (0..3)
            .map(|day| {
                UsageEvent::new("team-a", "openai", "gpt-4", 1000, 500, start + Duration::days(day))
            })
            .collect();
        build_report(&events, &PricingRegistry::builtin(), None, &AnalyticsConfig::default())
            .unwrap()
    }

    #[test]
    fn render_report_contains_sections() {
        let output = render_report(&make_report(), false);
        assert!(output.contains("Usage report"));
        assert!(output.contains("$0.18"));
        assert!(output.contains("openai/gpt-4"));
        assert!(output.contains("Recent Days"));
        assert!(output.contains("Not enough history"));
        assert!(output.contains("Not enough priced events"));
    }

    #[test]
    fn render_no_ansi_when_color_false() {
        let output = render_report(&make_report(), false);
        // ANSI escape sequences start with ESC (0x1b)
        assert!(!output.contains('\x1b'), "output should not contain ANSI codes");
    }

    #[test]
    fn render_budget_exceeded() {
        let budget = evaluate_budget(100.0, 0.8, 101.0).unwrap();
        let output = render_budget(&budget, false);
        assert!(output.contains("Exceeded"));
        assert!(output.contains("101% used"));
        assert!(output.contains("[████████████]"));
        assert!(output.contains("Overage"));
        assert!(output.contains("$1.00"));
    }

    #[test]
    fn render_budget_ok_shows_remaining() {
        let budget = evaluate_budget(100.0, 0.8, 25.0).unwrap();
        let output = render_budget(&budget, false);
        assert!(output.contains("OK"));
        assert!(output.contains("Remaining"));
        assert!(output.contains("$75.00"));
    }

    #[test]
    fn render_cost_marks_default_pricing() {
        let registry = PricingRegistry::builtin();
        let exact = compute_cost(&registry, "openai", "gpt-4", 1000, 500).unwrap();
        let output = render_cost("openai", "gpt-4", &exact, false);
        assert!(output.contains("$0.06"));
        assert!(output.contains("gpt-4"));

        let fallback = compute_cost(&registry, "openai", "gpt-unknown", 1000, 500).unwrap();
        let output = render_cost("openai", "gpt-unknown", &fallback, false);
        assert!(output.contains("openai default"));
    }

    #[test]
    fn render_anomalies_lists_records() {
        let outcome = AnomalyOutcome::Checked(vec![AnomalyRecord {
            subject_id: "2025-02-11".into(),
            observed_value: 50.0,
            expected_value: 10.0,
            z_score: None,
            severity: Severity::High,
        }]);
        let output = render_anomalies(&outcome, false);
        assert!(output.contains("2025-02-11"));
        assert!(output.contains("const"));
        assert!(output.contains("High"));

        let none = render_anomalies(&AnomalyOutcome::Checked(vec![]), false);
        assert!(none.contains("None"));
    }

    #[test]
    fn render_empty_buckets() {
        let output = render_buckets("By model", &[], false);
        assert!(output.contains("No events in range"));
    }
}
