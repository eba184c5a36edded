//! Welfare scheme eligibility decisioning.
//!
//! Versioned rule lifecycle, severity-weighted evaluation, risk-band-driven
//! routing, officer overrides with an append-only audit trail, cross-version
//! comparison, and STP metrics.

pub mod comparison;
pub mod domain;
pub mod evaluator;
pub mod expr;
pub mod metrics;
pub mod overrides;
pub mod policy;
pub mod repository;
pub mod risk;
pub mod router;
pub mod service;
pub mod store;
pub mod worklist;

#[cfg(test)]
mod tests;

pub use comparison::{ComparisonSide, VersionComparison};
pub use domain::{
    ApplicantFacts, ApplicantId, ChangedByType, DecisionHistoryEntry, DecisionId, DecisionResult,
    DecisionStatus, DecisionType, FactValue, OfficerId, Override, RiskAssessment, RiskBand,
    RiskFactor, RoutingTarget, Rule, RuleCategory, RuleEvaluation, RuleId, RuleSetSnapshot,
    RuleVersion, SchemeId, Severity,
};
pub use evaluator::RuleOutcomes;
pub use expr::{CompareOp, ExprError, RuleExpr};
pub use metrics::StpMetrics;
pub use overrides::{OverrideError, OverrideManager};
pub use repository::{
    DecisionRepository, DispatchError, FactProvider, FactProviderError, QueueDispatcher,
    RepositoryError,
};
pub use risk::{RawScore, RiskAdapter, RiskScorer, RiskThresholds, ScoringError};
pub use router::eligibility_router;
pub use service::{DecisionConfig, DecisionService, DecisionServiceError};
pub use store::{NewRule, RuleStore, RuleStoreError};
pub use worklist::{WorklistCandidate, WorklistCriteria, WorklistHandle};
