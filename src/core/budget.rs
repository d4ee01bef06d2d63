//! Budget evaluation against caller-supplied spend.
//!
//! The evaluator never tracks or mutates spend itself; it classifies a figure
//! handed to it. A warning or exceeded result is logged with `tracing::warn`.

use tracing::warn;

use crate::core::error::{ensure_non_negative, AnalyticsError, Result};
use crate::core::models::budget::{Budget, BudgetEvaluation, BudgetStatus};

/// Classify `spend` against a limit of `amount` with a warning line at
/// `amount * alert_threshold`.
///
/// A zero budget is valid and is always exceeded, since `spend >= amount`.
pub fn evaluate_budget(amount: f64, alert_threshold: f64, spend: f64) -> Result<BudgetEvaluation> {
    let amount = ensure_non_negative("amount", amount)?;
    let spend = ensure_non_negative("spend", spend)?;
    let alert_threshold = ensure_non_negative("alert_threshold", alert_threshold)?;
    if alert_threshold > 1.0 {
        return Err(AnalyticsError::validation(
            "alert_threshold",
            format!("{} is above 1.0", alert_threshold),
        ));
    }

    let status = if spend >= amount {
        BudgetStatus::Exceeded
    } else if spend >= amount * alert_threshold {
        BudgetStatus::Warning
    } else {
        BudgetStatus::Ok
    };

    let used_fraction = if amount > 0.0 {
        spend / amount
    } else if spend > 0.0 {
        1.0
    } else {
        0.0
    };

    Ok(BudgetEvaluation {
        status,
        amount,
        spend,
        remaining: (amount - spend).max(0.0),
        overage: (spend - amount).max(0.0),
        used_fraction,
    })
}

/// Evaluate a stored budget. Logs when the owner is at or past the alert line.
pub fn evaluate(budget: &Budget, spend: f64) -> Result<BudgetEvaluation> {
    let evaluation = evaluate_budget(budget.amount, budget.alert_threshold, spend)?;
    match evaluation.status {
        BudgetStatus::Ok => {}
        BudgetStatus::Warning => warn!(
            owner = %budget.owner_id,
            period = %budget.period,
            spend,
            amount = budget.amount,
            "approaching budget limit"
        ),
        BudgetStatus::Exceeded => warn!(
            owner = %budget.owner_id,
            period = %budget.period,
            spend,
            amount = budget.amount,
            overage = evaluation.overage,
            "budget exceeded"
        ),
    }
    Ok(evaluation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::budget::BudgetPeriod;

    #[test]
    fn below_threshold_is_ok() {
        let eval = evaluate_budget(100.0, 0.8, 79.0).unwrap();
        assert_eq!(eval.status, BudgetStatus::Ok);
        assert!((eval.remaining - 21.0).abs() < 1e-9);
        assert_eq!(eval.overage, 0.0);
    }

    #[test]
    fn threshold_boundary_is_warning() {
        assert_eq!(evaluate_budget(100.0, 0.8, 80.0).unwrap().status, BudgetStatus::Warning);
        assert_eq!(evaluate_budget(100.0, 0.8, 85.0).unwrap().status, BudgetStatus::Warning);
    }

    #[test]
    fn at_or_over_amount_is_exceeded() {
        let at = evaluate_budget(100.0, 0.8, 100.0).unwrap();
        assert_eq!(at.status, BudgetStatus::Exceeded);
        assert_eq!(at.remaining, 0.0);
        assert_eq!(at.overage, 0.0);

        let over = evaluate_budget(100.0, 0.8, 101.0).unwrap();
        assert_eq!(over.status, BudgetStatus::Exceeded);
        assert!((over.overage - 1.0).abs() < 1e-9);
        assert_eq!(over.remaining, 0.0);
    }

    #[test]
    fn zero_budget() {
        assert_eq!(evaluate_budget(0.0, 0.8, 0.01).unwrap().status, BudgetStatus::Exceeded);
        let idle = evaluate_budget(0.0, 0.8, 0.0).unwrap();
        assert_eq!(idle.status, BudgetStatus::Exceeded);
        assert_eq!(idle.used_fraction, 0.0);
        assert_eq!(idle.remaining, 0.0);
        assert_eq!(idle.overage, 0.0);
    }

    #[test]
    fn negative_spend_is_rejected() {
        let err = evaluate_budget(100.0, 0.8, -1.0).unwrap_err();
        assert!(matches!(err, AnalyticsError::Validation { field: "spend", .. }));
    }

    #[test]
    fn invalid_threshold_is_rejected() {
        assert!(evaluate_budget(100.0, 1.5, 10.0).is_err());
        assert!(evaluate_budget(100.0, f64::NAN, 10.0).is_err());
        assert!(evaluate_budget(f64::INFINITY, 0.8, 10.0).is_err());
    }

    #[test]
    fn evaluate_uses_budget_threshold() {
        let budget = Budget {
            owner_id: "team-a".into(),
            amount: 50.0,
            period: BudgetPeriod::Monthly,
            alert_threshold: 0.5,
        };
        let eval = evaluate(&budget, 30.0).unwrap();
        assert_eq!(eval.status, BudgetStatus::Warning);
        assert!((eval.used_fraction - 0.6).abs() < 1e-9);
    }
}
