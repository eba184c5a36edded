use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::workflows::eligibility::domain::{
    ApplicantFacts, ApplicantId, DecisionHistoryEntry, DecisionId, DecisionResult, FactValue,
    Override, RoutingTarget, RuleCategory, SchemeId, Severity,
};
use crate::workflows::eligibility::expr::{CompareOp, RuleExpr};
use crate::workflows::eligibility::repository::{
    DecisionRepository, DispatchError, FactProvider, FactProviderError, QueueDispatcher,
    RepositoryError,
};
use crate::workflows::eligibility::risk::{RawScore, RiskScorer, ScoringError};
use crate::workflows::eligibility::service::{DecisionConfig, DecisionService};
use crate::workflows::eligibility::store::{NewRule, RuleStore};

pub(super) fn scheme() -> SchemeId {
    SchemeId("old-age-pension".to_string())
}

pub(super) fn applicant(suffix: &str) -> ApplicantId {
    ApplicantId(format!("applicant-{suffix}"))
}

/// Facts that pass every seeded rule.
pub(super) fn passing_facts(applicant_id: &ApplicantId) -> ApplicantFacts {
    ApplicantFacts::new(applicant_id.clone(), scheme())
        .with_field("income", FactValue::Number(50_000.0))
        .with_field("age", FactValue::Number(70.0))
        .with_field("duplicate_flag", FactValue::Bool(false))
        .with_field("residency_certificate", FactValue::Bool(true))
        .with_field("district", FactValue::Text("north".to_string()))
}

pub(super) fn income_rule(scheme_id: &SchemeId) -> NewRule {
    NewRule {
        scheme_id: scheme_id.clone(),
        category: RuleCategory::Income,
        name: "income-ceiling".to_string(),
        expr: RuleExpr::compare(
            CompareOp::Le,
            RuleExpr::field("income"),
            RuleExpr::number(60_000.0),
        ),
        severity: Severity::Major,
        failure_message: "declared income exceeds the scheme ceiling".to_string(),
    }
}

pub(super) fn age_rule(scheme_id: &SchemeId) -> NewRule {
    NewRule {
        scheme_id: scheme_id.clone(),
        category: RuleCategory::Demographic,
        name: "minimum-age".to_string(),
        expr: RuleExpr::compare(
            CompareOp::Ge,
            RuleExpr::field("age"),
            RuleExpr::number(65.0),
        ),
        severity: Severity::Critical,
        failure_message: "applicant is below the minimum age".to_string(),
    }
}

pub(super) fn duplicate_rule(scheme_id: &SchemeId) -> NewRule {
    NewRule {
        scheme_id: scheme_id.clone(),
        category: RuleCategory::DuplicateDetection,
        name: "duplicate-beneficiary".to_string(),
        expr: RuleExpr::compare(
            CompareOp::Eq,
            RuleExpr::field("duplicate_flag"),
            RuleExpr::boolean(false),
        ),
        severity: Severity::Critical,
        failure_message: "duplicate beneficiary record".to_string(),
    }
}

pub(super) fn residency_rule(scheme_id: &SchemeId) -> NewRule {
    NewRule {
        scheme_id: scheme_id.clone(),
        category: RuleCategory::Documentation,
        name: "residency-certificate".to_string(),
        expr: RuleExpr::compare(
            CompareOp::Eq,
            RuleExpr::field("residency_certificate"),
            RuleExpr::boolean(true),
        ),
        severity: Severity::Minor,
        failure_message: "residency certificate missing".to_string(),
    }
}

/// Store seeded with the standard rule set and one published version.
pub(super) fn seeded_store() -> Arc<RuleStore> {
    let store = Arc::new(RuleStore::new());
    let scheme_id = scheme();
    store
        .create_rule(income_rule(&scheme_id))
        .expect("income rule");
    store.create_rule(age_rule(&scheme_id)).expect("age rule");
    store
        .create_rule(duplicate_rule(&scheme_id))
        .expect("duplicate rule");
    store
        .create_rule(residency_rule(&scheme_id))
        .expect("residency rule");
    store.publish(&scheme_id).expect("publish v1");
    store
}

#[derive(Default)]
pub(super) struct MemoryDecisionRepository {
    decisions: Mutex<HashMap<DecisionId, DecisionResult>>,
    overrides: Mutex<HashMap<DecisionId, Vec<Override>>>,
    history: Mutex<HashMap<DecisionId, Vec<DecisionHistoryEntry>>>,
}

impl DecisionRepository for MemoryDecisionRepository {
    fn insert_decision(
        &self,
        decision: DecisionResult,
    ) -> Result<DecisionResult, RepositoryError> {
        let mut guard = self.decisions.lock().expect("decision mutex poisoned");
        if guard.contains_key(&decision.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(decision.id.clone(), decision.clone());
        Ok(decision)
    }

    fn decision(&self, id: &DecisionId) -> Result<Option<DecisionResult>, RepositoryError> {
        let guard = self.decisions.lock().expect("decision mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn decisions_in_window(
        &self,
        scheme_id: &SchemeId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DecisionResult>, RepositoryError> {
        let guard = self.decisions.lock().expect("decision mutex poisoned");
        let mut decisions: Vec<DecisionResult> = guard
            .values()
            .filter(|decision| {
                &decision.scheme_id == scheme_id
                    && decision.evaluated_at >= start
                    && decision.evaluated_at < end
            })
            .cloned()
            .collect();
        decisions.sort_by(|a, b| a.evaluated_at.cmp(&b.evaluated_at));
        Ok(decisions)
    }

    fn append_override(
        &self,
        mut record: Override,
        expected_revision: u32,
    ) -> Result<Override, RepositoryError> {
        let mut guard = self.overrides.lock().expect("override mutex poisoned");
        let chain = guard.entry(record.decision_id.clone()).or_default();
        let current = chain.len() as u32;
        if current != expected_revision {
            return Err(RepositoryError::RevisionConflict {
                expected: expected_revision,
                current,
            });
        }
        record.revision = current + 1;
        chain.push(record.clone());
        Ok(record)
    }

    fn overrides(&self, id: &DecisionId) -> Result<Vec<Override>, RepositoryError> {
        let guard = self.overrides.lock().expect("override mutex poisoned");
        Ok(guard.get(id).cloned().unwrap_or_default())
    }

    fn append_history(&self, entry: DecisionHistoryEntry) -> Result<(), RepositoryError> {
        let mut guard = self.history.lock().expect("history mutex poisoned");
        guard.entry(entry.decision_id.clone()).or_default().push(entry);
        Ok(())
    }

    fn history(&self, id: &DecisionId) -> Result<Vec<DecisionHistoryEntry>, RepositoryError> {
        let guard = self.history.lock().expect("history mutex poisoned");
        Ok(guard.get(id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub(super) struct StaticFactProvider {
    facts: Mutex<HashMap<(ApplicantId, SchemeId), ApplicantFacts>>,
}

impl StaticFactProvider {
    pub(super) fn register(&self, facts: ApplicantFacts) {
        let key = (facts.applicant_id.clone(), facts.scheme_id.clone());
        self.facts
            .lock()
            .expect("facts mutex poisoned")
            .insert(key, facts);
    }
}

#[async_trait]
impl FactProvider for StaticFactProvider {
    async fn facts(
        &self,
        applicant_id: &ApplicantId,
        scheme_id: &SchemeId,
    ) -> Result<ApplicantFacts, FactProviderError> {
        let guard = self.facts.lock().expect("facts mutex poisoned");
        guard
            .get(&(applicant_id.clone(), scheme_id.clone()))
            .cloned()
            .ok_or_else(|| FactProviderError::UnknownApplicant(applicant_id.clone()))
    }

    async fn pending_applicants(
        &self,
        scheme_id: &SchemeId,
    ) -> Result<Vec<ApplicantId>, FactProviderError> {
        let guard = self.facts.lock().expect("facts mutex poisoned");
        let mut applicants: Vec<ApplicantId> = guard
            .keys()
            .filter(|(_, scheme)| scheme == scheme_id)
            .map(|(applicant, _)| applicant.clone())
            .collect();
        applicants.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(applicants)
    }
}

pub(super) struct FixedScorer {
    pub(super) score: f64,
}

#[async_trait]
impl RiskScorer for FixedScorer {
    async fn score(
        &self,
        _scheme_id: &SchemeId,
        _facts: &ApplicantFacts,
    ) -> Result<RawScore, ScoringError> {
        Ok(RawScore {
            score: self.score,
            model_version: "risk-model-1.4.0".to_string(),
            top_factors: Vec::new(),
        })
    }
}

pub(super) struct UnavailableScorer;

#[async_trait]
impl RiskScorer for UnavailableScorer {
    async fn score(
        &self,
        _scheme_id: &SchemeId,
        _facts: &ApplicantFacts,
    ) -> Result<RawScore, ScoringError> {
        Err(ScoringError::Unavailable("connection refused".to_string()))
    }
}

pub(super) struct SlowScorer {
    pub(super) delay: Duration,
    pub(super) score: f64,
}

#[async_trait]
impl RiskScorer for SlowScorer {
    async fn score(
        &self,
        _scheme_id: &SchemeId,
        _facts: &ApplicantFacts,
    ) -> Result<RawScore, ScoringError> {
        tokio::time::sleep(self.delay).await;
        Ok(RawScore {
            score: self.score,
            model_version: "risk-model-1.4.0".to_string(),
            top_factors: Vec::new(),
        })
    }
}

#[derive(Default)]
pub(super) struct RecordingDispatcher {
    events: Mutex<Vec<(RoutingTarget, DecisionId)>>,
}

impl RecordingDispatcher {
    pub(super) fn events(&self) -> Vec<(RoutingTarget, DecisionId)> {
        self.events.lock().expect("dispatch mutex poisoned").clone()
    }
}

impl QueueDispatcher for RecordingDispatcher {
    fn dispatch(
        &self,
        target: &RoutingTarget,
        decision: &DecisionResult,
    ) -> Result<(), DispatchError> {
        self.events
            .lock()
            .expect("dispatch mutex poisoned")
            .push((target.clone(), decision.id.clone()));
        Ok(())
    }
}

pub(super) struct FailingDispatcher;

impl QueueDispatcher for FailingDispatcher {
    fn dispatch(
        &self,
        _target: &RoutingTarget,
        _decision: &DecisionResult,
    ) -> Result<(), DispatchError> {
        Err(DispatchError::Transport("queue offline".to_string()))
    }
}

pub(super) type TestService<S> =
    DecisionService<StaticFactProvider, S, MemoryDecisionRepository, RecordingDispatcher>;

pub(super) struct TestHarness<S: RiskScorer + 'static> {
    pub(super) service: Arc<TestService<S>>,
    pub(super) provider: Arc<StaticFactProvider>,
    pub(super) repository: Arc<MemoryDecisionRepository>,
    pub(super) dispatcher: Arc<RecordingDispatcher>,
}

pub(super) fn test_config() -> DecisionConfig {
    DecisionConfig {
        scorer_timeout: Duration::from_millis(250),
        worklist_concurrency: 4,
        ..DecisionConfig::default()
    }
}

/// Service over the seeded store with the given scorer.
pub(super) fn harness_with<S: RiskScorer + 'static>(scorer: S) -> TestHarness<S> {
    let provider = Arc::new(StaticFactProvider::default());
    let repository = Arc::new(MemoryDecisionRepository::default());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let service = Arc::new(DecisionService::new(
        seeded_store(),
        provider.clone(),
        Arc::new(scorer),
        repository.clone(),
        dispatcher.clone(),
        test_config(),
    ));
    TestHarness {
        service,
        provider,
        repository,
        dispatcher,
    }
}

pub(super) fn harness() -> TestHarness<FixedScorer> {
    harness_with(FixedScorer { score: 0.15 })
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
