//! Service composing the rule store, evaluator, risk adapter, repository,
//! and queue dispatcher into the exposed decisioning operations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

use super::comparison::{self, VersionComparison};
use super::domain::{
    ApplicantFacts, ApplicantId, DecisionHistoryEntry, DecisionId, DecisionResult, DecisionType,
    OfficerId, Override, SchemeId,
};
use super::evaluator;
use super::metrics::{self, StpMetrics};
use super::overrides::{OverrideError, OverrideManager};
use super::policy;
use super::repository::{
    DecisionRepository, FactProvider, FactProviderError, QueueDispatcher, RepositoryError,
};
use super::risk::{RiskAdapter, RiskScorer, RiskThresholds};
use super::store::{RuleStore, RuleStoreError};
use super::worklist::{self, WorklistCriteria, WorklistHandle};

/// Tunables for the decision service.
#[derive(Debug, Clone)]
pub struct DecisionConfig {
    /// Upper bound on one scorer call; a timeout is treated as "risk
    /// unknown", never as a band.
    pub scorer_timeout: Duration,
    /// Concurrent evaluations during a worklist scan; bounds load on the
    /// scorer, which is the remote bottleneck.
    pub worklist_concurrency: usize,
    pub default_thresholds: RiskThresholds,
    /// Per-scheme threshold overrides.
    pub scheme_thresholds: HashMap<SchemeId, RiskThresholds>,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            scorer_timeout: Duration::from_secs(3),
            worklist_concurrency: 8,
            default_thresholds: RiskThresholds::default(),
            scheme_thresholds: HashMap::new(),
        }
    }
}

impl DecisionConfig {
    pub fn thresholds_for(&self, scheme_id: &SchemeId) -> RiskThresholds {
        self.scheme_thresholds
            .get(scheme_id)
            .copied()
            .unwrap_or(self.default_thresholds)
    }
}

/// Error raised by the decision service.
#[derive(Debug, thiserror::Error)]
pub enum DecisionServiceError {
    #[error(transparent)]
    Store(#[from] RuleStoreError),
    #[error(transparent)]
    Facts(#[from] FactProviderError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Override(#[from] OverrideError),
}

static DECISION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_decision_id() -> DecisionId {
    let id = DECISION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    DecisionId(format!("dec-{id:06}"))
}

/// Service orchestrating one applicant evaluation end to end, plus the
/// override, comparison, worklist, and metrics operations around it.
pub struct DecisionService<P, S, R, Q> {
    store: Arc<RuleStore>,
    facts: Arc<P>,
    risk: RiskAdapter<S>,
    repository: Arc<R>,
    dispatcher: Arc<Q>,
    overrides: OverrideManager<R>,
    config: DecisionConfig,
}

impl<P, S, R, Q> Clone for DecisionService<P, S, R, Q> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            facts: self.facts.clone(),
            risk: self.risk.clone(),
            repository: self.repository.clone(),
            dispatcher: self.dispatcher.clone(),
            overrides: self.overrides.clone(),
            config: self.config.clone(),
        }
    }
}

impl<P, S, R, Q> DecisionService<P, S, R, Q>
where
    P: FactProvider + 'static,
    S: RiskScorer + 'static,
    R: DecisionRepository + 'static,
    Q: QueueDispatcher + 'static,
{
    pub fn new(
        store: Arc<RuleStore>,
        facts: Arc<P>,
        scorer: Arc<S>,
        repository: Arc<R>,
        dispatcher: Arc<Q>,
        config: DecisionConfig,
    ) -> Self {
        let risk = RiskAdapter::new(scorer, config.scorer_timeout);
        let overrides = OverrideManager::new(repository.clone());
        Self {
            store,
            facts,
            risk,
            repository,
            dispatcher,
            overrides,
            config,
        }
    }

    /// The rule store backing this service, for authoring and version
    /// administration.
    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    /// Evaluate one applicant against the scheme's active rule version,
    /// persist the decision with its audit transition, and dispatch it
    /// downstream.
    pub async fn evaluate(
        &self,
        applicant_id: &ApplicantId,
        scheme_id: &SchemeId,
    ) -> Result<DecisionResult, DecisionServiceError> {
        let (decision, _facts) = self.evaluate_inner(applicant_id, scheme_id).await?;
        Ok(decision)
    }

    async fn evaluate_inner(
        &self,
        applicant_id: &ApplicantId,
        scheme_id: &SchemeId,
    ) -> Result<(DecisionResult, ApplicantFacts), DecisionServiceError> {
        let facts = self.facts.facts(applicant_id, scheme_id).await?;
        let version = self.store.active_version(scheme_id)?;
        let outcomes = evaluator::evaluate(&version, &facts);

        let risk = match self
            .risk
            .assess(scheme_id, &facts, self.config.thresholds_for(scheme_id))
            .await
        {
            Ok(assessment) => Some(assessment),
            Err(err) => {
                warn!(
                    applicant = %applicant_id,
                    scheme = %scheme_id,
                    error = %err,
                    "risk read unavailable; routing to officer"
                );
                None
            }
        };

        let decision_type = policy::decide(&outcomes, risk.as_ref());
        let decision = DecisionResult {
            id: next_decision_id(),
            applicant_id: applicant_id.clone(),
            scheme_id: scheme_id.clone(),
            rule_version: version.version,
            decision_type,
            status: decision_type.status(),
            evaluations: outcomes.evaluations,
            risk,
            routing_target: policy::routing_target(decision_type, scheme_id),
            evaluated_at: Utc::now(),
        };

        let stored = self.repository.insert_decision(decision)?;
        self.repository
            .append_history(DecisionHistoryEntry::initial(&stored))?;

        if let Err(err) = self.dispatcher.dispatch(&stored.routing_target, &stored) {
            warn!(
                decision = %stored.id,
                target = %stored.routing_target,
                error = %err,
                "queue dispatch failed; decision persisted, delivery will be retried downstream"
            );
        }

        info!(
            decision = %stored.id,
            applicant = %applicant_id,
            scheme = %scheme_id,
            outcome = stored.decision_type.label(),
            "applicant evaluated"
        );
        Ok((stored, facts))
    }

    pub fn decision(&self, id: &DecisionId) -> Result<DecisionResult, DecisionServiceError> {
        Ok(self
            .repository
            .decision(id)?
            .ok_or(RepositoryError::NotFound)?)
    }

    /// Officer override with mandatory reason and optimistic revision check.
    pub fn override_decision(
        &self,
        decision_id: &DecisionId,
        decision_type: DecisionType,
        reason: &str,
        officer_id: OfficerId,
        expected_revision: u32,
    ) -> Result<Override, DecisionServiceError> {
        Ok(self.overrides.override_decision(
            decision_id,
            decision_type,
            reason,
            officer_id,
            expected_revision,
        )?)
    }

    pub fn effective_decision(
        &self,
        decision_id: &DecisionId,
    ) -> Result<DecisionType, DecisionServiceError> {
        Ok(self.overrides.effective_decision(decision_id)?)
    }

    pub fn decision_overrides(
        &self,
        decision_id: &DecisionId,
    ) -> Result<Vec<Override>, DecisionServiceError> {
        Ok(self.overrides.overrides(decision_id)?)
    }

    pub fn decision_history(
        &self,
        decision_id: &DecisionId,
    ) -> Result<Vec<DecisionHistoryEntry>, DecisionServiceError> {
        Ok(self.overrides.history(decision_id)?)
    }

    /// Re-run one applicant under two frozen versions with identical facts
    /// and one shared risk read. Persists nothing.
    pub async fn compare_versions(
        &self,
        scheme_id: &SchemeId,
        version_old: u32,
        version_new: u32,
        applicant_id: &ApplicantId,
    ) -> Result<VersionComparison, DecisionServiceError> {
        let facts = self.facts.facts(applicant_id, scheme_id).await?;
        let old = self.store.version(scheme_id, version_old)?;
        let new = self.store.version(scheme_id, version_new)?;

        let risk = match self
            .risk
            .assess(scheme_id, &facts, self.config.thresholds_for(scheme_id))
            .await
        {
            Ok(assessment) => Some(assessment),
            Err(err) => {
                warn!(
                    applicant = %applicant_id,
                    scheme = %scheme_id,
                    error = %err,
                    "risk read unavailable; comparing with unknown risk"
                );
                None
            }
        };

        Ok(comparison::compare(
            &old,
            &new,
            &facts,
            risk.as_ref(),
            scheme_id,
        ))
    }

    /// STP rates for a scheme over `[start, end)`.
    pub fn stp_metrics(
        &self,
        scheme_id: &SchemeId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<StpMetrics, DecisionServiceError> {
        let decisions = self
            .repository
            .decisions_in_window(scheme_id, period_start, period_end)?;

        let mut records = Vec::with_capacity(decisions.len());
        for decision in decisions {
            let history = self.repository.history(&decision.id)?;
            records.push((decision, history));
        }

        Ok(metrics::aggregate(
            scheme_id.clone(),
            period_start,
            period_end,
            &records,
        ))
    }

    /// Scan the scheme's pending applicants with bounded concurrency,
    /// streaming qualifying candidates as they are found. The scan checks
    /// its cancellation flag before each applicant; per-applicant failures
    /// are logged and skipped, never fatal to the batch.
    pub async fn generate_worklist(
        &self,
        scheme_id: SchemeId,
        criteria: WorklistCriteria,
    ) -> Result<WorklistHandle, DecisionServiceError> {
        let applicants = self.facts.pending_applicants(&scheme_id).await?;

        let (tx, rx) = mpsc::channel(16);
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = WorklistHandle::new(rx, cancel.clone());

        let service = self.clone();
        let semaphore = Arc::new(Semaphore::new(self.config.worklist_concurrency.max(1)));
        let emitted = Arc::new(AtomicUsize::new(0));
        let criteria = Arc::new(criteria);

        tokio::spawn(async move {
            let mut workers = Vec::new();
            for applicant_id in applicants {
                if cancel.load(Ordering::Acquire) {
                    info!(scheme = %scheme_id, "worklist scan cancelled");
                    break;
                }
                if emitted.load(Ordering::Acquire) >= criteria.limit {
                    break;
                }

                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let service = service.clone();
                let scheme_id = scheme_id.clone();
                let criteria = criteria.clone();
                let emitted = emitted.clone();
                let tx = tx.clone();

                workers.push(tokio::spawn(async move {
                    let _permit = permit;
                    let (decision, facts) =
                        match service.evaluate_inner(&applicant_id, &scheme_id).await {
                            Ok(result) => result,
                            Err(err) => {
                                warn!(
                                    applicant = %applicant_id,
                                    scheme = %scheme_id,
                                    error = %err,
                                    "worklist applicant skipped"
                                );
                                return;
                            }
                        };

                    if let Some(candidate) = worklist::qualify(&decision, &facts, &criteria) {
                        if emitted.fetch_add(1, Ordering::AcqRel) < criteria.limit {
                            let _ = tx.send(candidate).await;
                        }
                    }
                }));
            }

            for worker in workers {
                let _ = worker.await;
            }
        });

        Ok(handle)
    }
}
