//! Straight-through-processing metrics over persisted decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{DecisionHistoryEntry, DecisionResult, DecisionType, SchemeId};

/// Aggregated decision counts and rates for one scheme over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StpMetrics {
    pub scheme_id: SchemeId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total: usize,
    pub auto_approved: usize,
    pub auto_rejected: usize,
    pub routed_to_officer: usize,
    pub routed_to_fraud: usize,
    pub auto_approval_rate: f64,
    pub straight_through_rate: f64,
    /// Mean seconds from evaluation to the first final (non-under_review)
    /// status; `None` when no decision in the window has reached one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_seconds_to_final: Option<f64>,
}

/// Aggregate decisions (each paired with its history) whose `evaluated_at`
/// falls inside `[period_start, period_end)`. Read-only.
pub fn aggregate(
    scheme_id: SchemeId,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    records: &[(DecisionResult, Vec<DecisionHistoryEntry>)],
) -> StpMetrics {
    let mut auto_approved = 0;
    let mut auto_rejected = 0;
    let mut routed_to_officer = 0;
    let mut routed_to_fraud = 0;
    let mut final_durations: Vec<f64> = Vec::new();

    for (decision, history) in records {
        match decision.decision_type {
            DecisionType::AutoApprove => auto_approved += 1,
            DecisionType::AutoReject => auto_rejected += 1,
            DecisionType::RouteToOfficer => routed_to_officer += 1,
            DecisionType::RouteToFraud => routed_to_fraud += 1,
        }

        if let Some(finalized_at) = first_final_transition(history) {
            let seconds = (finalized_at - decision.evaluated_at).num_milliseconds() as f64 / 1000.0;
            final_durations.push(seconds.max(0.0));
        }
    }

    let total = records.len();
    let auto_approval_rate = rate(auto_approved, total);
    let straight_through_rate = rate(auto_approved + auto_rejected, total);
    let avg_seconds_to_final = if final_durations.is_empty() {
        None
    } else {
        Some(final_durations.iter().sum::<f64>() / final_durations.len() as f64)
    };

    StpMetrics {
        scheme_id,
        period_start,
        period_end,
        total,
        auto_approved,
        auto_rejected,
        routed_to_officer,
        routed_to_fraud,
        auto_approval_rate,
        straight_through_rate,
        avg_seconds_to_final,
    }
}

fn rate(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Timestamp of the first history transition landing on a final status.
fn first_final_transition(history: &[DecisionHistoryEntry]) -> Option<DateTime<Utc>> {
    history
        .iter()
        .filter(|entry| {
            DecisionType::from_label(&entry.to_state)
                .map(|decision_type| decision_type.status().is_final())
                .unwrap_or(false)
        })
        .map(|entry| entry.timestamp)
        .min()
}
