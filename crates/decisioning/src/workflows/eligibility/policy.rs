//! Decision derivation and queue routing.

use super::domain::{DecisionType, RiskAssessment, RiskBand, RoutingTarget, SchemeId};
use super::evaluator::RuleOutcomes;

/// Queue receiving every fraud referral, regardless of scheme.
pub const FRAUD_QUEUE: &str = "fraud-review";

/// Derive the decision from rule outcomes and the (possibly unknown) risk
/// read. Strict priority order:
///
/// 1. critical failure in a fraud-indicative category → fraud review
/// 2. any other critical failure → auto-reject
/// 3. risk unknown → officer review (never auto-approve without a risk read)
/// 4. all rules passed and band LOW → auto-approve
/// 5. everything else → officer review
pub fn decide(outcomes: &RuleOutcomes, risk: Option<&RiskAssessment>) -> DecisionType {
    let critical = outcomes.critical_failures();
    if critical
        .iter()
        .any(|evaluation| evaluation.category.is_fraud_indicative())
    {
        return DecisionType::RouteToFraud;
    }
    if !critical.is_empty() {
        return DecisionType::AutoReject;
    }

    let Some(risk) = risk else {
        return DecisionType::RouteToOfficer;
    };

    if outcomes.all_passed() && risk.band == RiskBand::Low {
        return DecisionType::AutoApprove;
    }

    DecisionType::RouteToOfficer
}

/// Map a decision to its downstream queue. Fraud referrals share one
/// dedicated queue; everything else is per scheme.
pub fn routing_target(decision: DecisionType, scheme_id: &SchemeId) -> RoutingTarget {
    let queue = match decision {
        DecisionType::RouteToFraud => FRAUD_QUEUE.to_string(),
        DecisionType::RouteToOfficer => format!("officer-review:{scheme_id}"),
        DecisionType::AutoApprove => format!("submissions:{scheme_id}"),
        DecisionType::AutoReject => format!("rejections:{scheme_id}"),
    };
    RoutingTarget(queue)
}
