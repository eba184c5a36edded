use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for welfare schemes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemeId(pub String);

impl fmt::Display for SchemeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for applicants, owned by the golden-record collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicantId(pub String);

impl fmt::Display for ApplicantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for eligibility rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for persisted decisions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionId(pub String);

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for reviewing officers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OfficerId(pub String);

impl fmt::Display for OfficerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Typed value for a single applicant fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

/// Value categories used by the static expression validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactKind {
    Text,
    Number,
    Bool,
    Date,
}

impl FactKind {
    pub const fn label(self) -> &'static str {
        match self {
            FactKind::Text => "text",
            FactKind::Number => "number",
            FactKind::Bool => "bool",
            FactKind::Date => "date",
        }
    }
}

impl FactValue {
    pub const fn kind(&self) -> FactKind {
        match self {
            FactValue::Text(_) => FactKind::Text,
            FactValue::Number(_) => FactKind::Number,
            FactValue::Bool(_) => FactKind::Bool,
            FactValue::Date(_) => FactKind::Date,
        }
    }
}

/// Flat fact mapping for one applicant+scheme pair, supplied by the
/// golden-record collaborator. Transient; the engine never owns or stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicantFacts {
    pub applicant_id: ApplicantId,
    pub scheme_id: SchemeId,
    pub fields: BTreeMap<String, FactValue>,
}

impl ApplicantFacts {
    pub fn new(applicant_id: ApplicantId, scheme_id: SchemeId) -> Self {
        Self {
            applicant_id,
            scheme_id,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FactValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FactValue> {
        self.fields.get(name)
    }
}

/// Rule severity; a CRITICAL failure alone can sink an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Info,
}

impl Severity {
    pub const fn label(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Major => "major",
            Severity::Minor => "minor",
            Severity::Info => "info",
        }
    }
}

/// Category of an eligibility rule. Identity and duplicate checks are
/// fraud-indicative: a critical failure there routes to fraud review instead
/// of auto-rejection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    IdentityVerification,
    DuplicateDetection,
    Income,
    Residency,
    Documentation,
    Demographic,
}

impl RuleCategory {
    pub const fn label(self) -> &'static str {
        match self {
            RuleCategory::IdentityVerification => "identity_verification",
            RuleCategory::DuplicateDetection => "duplicate_detection",
            RuleCategory::Income => "income",
            RuleCategory::Residency => "residency",
            RuleCategory::Documentation => "documentation",
            RuleCategory::Demographic => "demographic",
        }
    }

    pub const fn is_fraud_indicative(self) -> bool {
        matches!(
            self,
            RuleCategory::IdentityVerification | RuleCategory::DuplicateDetection
        )
    }
}

/// One eligibility rule. Mutable only while it lives in the draft set; the
/// copies frozen into a [`RuleVersion`] never change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub scheme_id: SchemeId,
    pub category: RuleCategory,
    pub name: String,
    pub expr: super::expr::RuleExpr,
    pub severity: Severity,
    pub active: bool,
    pub failure_message: String,
}

/// Immutable set of rules frozen at publish time. Superseded versions are
/// retained for audit and comparison, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleVersion {
    pub scheme_id: SchemeId,
    pub version: u32,
    pub rules: Vec<Rule>,
    pub published_at: DateTime<Utc>,
}

/// Named, user-taggable pointer to a specific rule version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetSnapshot {
    pub name: String,
    pub scheme_id: SchemeId,
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

/// Result of evaluating one rule against one set of applicant facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub rule_id: RuleId,
    pub name: String,
    pub category: RuleCategory,
    pub severity: Severity,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Coarse risk bucket derived from the continuous score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    pub const fn label(self) -> &'static str {
        match self {
            RiskBand::Low => "low",
            RiskBand::Medium => "medium",
            RiskBand::High => "high",
        }
    }
}

/// A factor the risk model reports as contributing to the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub weight: f64,
}

/// Banded risk read for one applicant, produced by the scorer adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub band: RiskBand,
    pub model_version: String,
    pub top_factors: Vec<RiskFactor>,
}

/// Terminal outcome of the decision policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    AutoApprove,
    RouteToOfficer,
    RouteToFraud,
    AutoReject,
}

impl DecisionType {
    pub const fn label(self) -> &'static str {
        match self {
            DecisionType::AutoApprove => "auto_approve",
            DecisionType::RouteToOfficer => "route_to_officer",
            DecisionType::RouteToFraud => "route_to_fraud",
            DecisionType::AutoReject => "auto_reject",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "auto_approve" => Some(DecisionType::AutoApprove),
            "route_to_officer" => Some(DecisionType::RouteToOfficer),
            "route_to_fraud" => Some(DecisionType::RouteToFraud),
            "auto_reject" => Some(DecisionType::AutoReject),
            _ => None,
        }
    }

    pub const fn status(self) -> DecisionStatus {
        match self {
            DecisionType::AutoApprove => DecisionStatus::Approved,
            DecisionType::AutoReject => DecisionStatus::Rejected,
            DecisionType::RouteToOfficer | DecisionType::RouteToFraud => {
                DecisionStatus::UnderReview
            }
        }
    }
}

/// High level status derived from the decision type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Approved,
    Rejected,
    UnderReview,
}

impl DecisionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DecisionStatus::Approved => "approved",
            DecisionStatus::Rejected => "rejected",
            DecisionStatus::UnderReview => "under_review",
        }
    }

    pub const fn is_final(self) -> bool {
        !matches!(self, DecisionStatus::UnderReview)
    }
}

/// Downstream queue name a decision is dispatched to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingTarget(pub String);

impl fmt::Display for RoutingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One decision per (applicant, scheme, evaluation trigger). Immutable once
/// created; corrections happen via [`Override`], never mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub id: DecisionId,
    pub applicant_id: ApplicantId,
    pub scheme_id: SchemeId,
    pub rule_version: u32,
    pub decision_type: DecisionType,
    pub status: DecisionStatus,
    pub evaluations: Vec<RuleEvaluation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskAssessment>,
    pub routing_target: RoutingTarget,
    pub evaluated_at: DateTime<Utc>,
}

/// Officer correction of an automated decision. Appended to the decision's
/// override chain; `revision` is its 1-based position in that chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Override {
    pub decision_id: DecisionId,
    pub revision: u32,
    pub decision_type: DecisionType,
    pub reason: String,
    pub officer_id: OfficerId,
    pub created_at: DateTime<Utc>,
}

/// Actor class recorded on a history transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangedByType {
    System,
    Officer,
}

/// Append-only audit trail record of one decision state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionHistoryEntry {
    pub decision_id: DecisionId,
    pub from_state: String,
    pub to_state: String,
    pub actor: String,
    pub changed_by_type: ChangedByType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// State label for a decision that has been requested but not yet derived.
pub const EVALUATING_STATE: &str = "evaluating";

impl DecisionHistoryEntry {
    /// Transition recorded when the policy derives the initial decision.
    pub fn initial(decision: &DecisionResult) -> Self {
        Self {
            decision_id: decision.id.clone(),
            from_state: EVALUATING_STATE.to_string(),
            to_state: decision.decision_type.label().to_string(),
            actor: "system".to_string(),
            changed_by_type: ChangedByType::System,
            reason: None,
            timestamp: decision.evaluated_at,
        }
    }

    /// Transition recorded when an officer overrides a decision.
    pub fn for_override(previous: DecisionType, record: &Override) -> Self {
        Self {
            decision_id: record.decision_id.clone(),
            from_state: previous.label().to_string(),
            to_state: record.decision_type.label().to_string(),
            actor: record.officer_id.0.clone(),
            changed_by_type: ChangedByType::Officer,
            reason: Some(record.reason.clone()),
            timestamp: record.created_at,
        }
    }
}
