use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use decisioning::config::DecisioningConfig;
use decisioning::workflows::eligibility::{
    ApplicantFacts, ApplicantId, DecisionConfig, DecisionHistoryEntry, DecisionId,
    DecisionRepository, DecisionResult, DispatchError, FactProvider, FactProviderError,
    FactValue, Override, QueueDispatcher, RawScore, RepositoryError, RiskScorer, RoutingTarget,
    SchemeId, ScoringError,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// In-memory decision store backing the service until a database-backed
/// repository lands.
#[derive(Default)]
pub(crate) struct InMemoryDecisionRepository {
    decisions: Mutex<HashMap<DecisionId, DecisionResult>>,
    overrides: Mutex<HashMap<DecisionId, Vec<Override>>>,
    history: Mutex<HashMap<DecisionId, Vec<DecisionHistoryEntry>>>,
}

impl DecisionRepository for InMemoryDecisionRepository {
    fn insert_decision(&self, decision: DecisionResult) -> Result<DecisionResult, RepositoryError> {
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
        guard
            .entry(entry.decision_id.clone())
            .or_default()
            .push(entry);
        Ok(())
    }

    fn history(&self, id: &DecisionId) -> Result<Vec<DecisionHistoryEntry>, RepositoryError> {
        let guard = self.history.lock().expect("history mutex poisoned");
        Ok(guard.get(id).cloned().unwrap_or_default())
    }
}

/// In-memory stand-in for the golden-record fact provider.
#[derive(Default)]
pub(crate) struct InMemoryFactProvider {
    facts: Mutex<HashMap<(ApplicantId, SchemeId), ApplicantFacts>>,
}

impl InMemoryFactProvider {
    pub(crate) fn register(&self, facts: ApplicantFacts) {
        let key = (facts.applicant_id.clone(), facts.scheme_id.clone());
        self.facts
            .lock()
            .expect("facts mutex poisoned")
            .insert(key, facts);
    }
}

#[async_trait]
impl FactProvider for InMemoryFactProvider {
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

/// Stand-in for the external scoring model: reads a `risk_hint` fact when
/// present and otherwise reports a mid-band score, so demo traffic is
/// deterministic.
pub(crate) struct StubRiskScorer;

#[async_trait]
impl RiskScorer for StubRiskScorer {
    async fn score(
        &self,
        _scheme_id: &SchemeId,
        facts: &ApplicantFacts,
    ) -> Result<RawScore, ScoringError> {
        let score = match facts.get("risk_hint") {
            Some(FactValue::Number(score)) => *score,
            _ => 0.5,
        };
        Ok(RawScore {
            score,
            model_version: "stub-risk-model-0.1.0".to_string(),
            top_factors: Vec::new(),
        })
    }
}

/// Dispatcher that logs each handoff; the real queue transport is a
/// deployment concern.
#[derive(Default)]
pub(crate) struct LoggingQueueDispatcher;

impl QueueDispatcher for LoggingQueueDispatcher {
    fn dispatch(
        &self,
        target: &RoutingTarget,
        decision: &DecisionResult,
    ) -> Result<(), DispatchError> {
        info!(
            decision = %decision.id,
            queue = %target,
            "decision dispatched"
        );
        Ok(())
    }
}

pub(crate) fn decision_config(config: &DecisioningConfig) -> DecisionConfig {
    DecisionConfig {
        scorer_timeout: config.scorer_timeout,
        worklist_concurrency: config.worklist_concurrency,
        default_thresholds: config.risk_thresholds,
        scheme_thresholds: HashMap::new(),
    }
}
