//! Cross-version drift analysis: re-run evaluation and policy under two
//! frozen versions with identical inputs and report whether the decision
//! flips. This is the regression-safety check run before publishing a rule
//! change scheme-wide.

use serde::{Deserialize, Serialize};

use super::domain::{
    ApplicantFacts, DecisionType, RiskAssessment, RoutingTarget, RuleEvaluation, RuleVersion,
    SchemeId,
};
use super::{evaluator, policy};

/// Outcome of one side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSide {
    pub version: u32,
    pub decision_type: DecisionType,
    pub routing_target: RoutingTarget,
    pub evaluations: Vec<RuleEvaluation>,
}

/// Paired outcomes for the same facts under two rule versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionComparison {
    pub old: ComparisonSide,
    pub new: ComparisonSide,
    pub diverged: bool,
}

/// Pure comparison: nothing is persisted and nothing is dispatched. Both
/// sides share one facts map and one risk assessment, so any divergence is
/// attributable to the rule change alone.
pub fn compare(
    old_version: &RuleVersion,
    new_version: &RuleVersion,
    facts: &ApplicantFacts,
    risk: Option<&RiskAssessment>,
    scheme_id: &SchemeId,
) -> VersionComparison {
    let old = run_side(old_version, facts, risk, scheme_id);
    let new = run_side(new_version, facts, risk, scheme_id);
    let diverged = old.decision_type != new.decision_type;
    VersionComparison { old, new, diverged }
}

fn run_side(
    version: &RuleVersion,
    facts: &ApplicantFacts,
    risk: Option<&RiskAssessment>,
    scheme_id: &SchemeId,
) -> ComparisonSide {
    let outcomes = evaluator::evaluate(version, facts);
    let decision_type = policy::decide(&outcomes, risk);
    ComparisonSide {
        version: version.version,
        decision_type,
        routing_target: policy::routing_target(decision_type, scheme_id),
        evaluations: outcomes.evaluations,
    }
}
