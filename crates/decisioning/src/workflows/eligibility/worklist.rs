//! Batch worklist generation types.
//!
//! The fan-out itself lives in the decision service; this module holds the
//! criteria, the streamed candidate shape, and the consumer handle with its
//! cancellation flag. Qualifying candidates are streamed over a bounded
//! channel so the full result set is never materialized in the core.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::domain::{
    ApplicantFacts, ApplicantId, DecisionId, DecisionResult, DecisionType, FactValue,
    RoutingTarget,
};

/// Selection criteria for a worklist scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorklistCriteria {
    /// Minimum risk score a candidate must carry.
    pub min_score: f64,
    /// Optional district fact filter (matches the `district` fact exactly).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    /// Maximum number of candidates to stream.
    pub limit: usize,
}

/// One qualifying applicant streamed to the consumer. Carries the risk score
/// so the consuming officer queue can rank; streaming precludes a global
/// sort here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorklistCandidate {
    pub applicant_id: ApplicantId,
    pub decision_id: DecisionId,
    pub risk_score: f64,
    pub decision_type: DecisionType,
    pub routing_target: RoutingTarget,
}

/// Consumer side of a running worklist scan.
pub struct WorklistHandle {
    receiver: mpsc::Receiver<WorklistCandidate>,
    cancel: Arc<AtomicBool>,
}

impl WorklistHandle {
    pub(crate) fn new(
        receiver: mpsc::Receiver<WorklistCandidate>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self { receiver, cancel }
    }

    /// Stop the scan before the next unit of work. Already-emitted
    /// candidates stay emitted.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Next qualifying candidate, or `None` once the scan is drained.
    pub async fn next(&mut self) -> Option<WorklistCandidate> {
        self.receiver.recv().await
    }

    /// Drain the remaining candidates. Intended for boundaries (HTTP, tests)
    /// that need the whole batch.
    pub async fn collect(mut self) -> Vec<WorklistCandidate> {
        let mut candidates = Vec::new();
        while let Some(candidate) = self.receiver.recv().await {
            candidates.push(candidate);
        }
        candidates
    }
}

/// Whether a decision qualifies for the worklist under the given criteria.
pub(crate) fn qualify(
    decision: &DecisionResult,
    facts: &ApplicantFacts,
    criteria: &WorklistCriteria,
) -> Option<WorklistCandidate> {
    if decision.decision_type != DecisionType::RouteToOfficer {
        return None;
    }

    let score = decision.risk.as_ref().map(|risk| risk.score)?;
    if score < criteria.min_score {
        return None;
    }

    if let Some(district) = &criteria.district {
        match facts.get("district") {
            Some(FactValue::Text(value)) if value == district => {}
            _ => return None,
        }
    }

    Some(WorklistCandidate {
        applicant_id: decision.applicant_id.clone(),
        decision_id: decision.id.clone(),
        risk_score: score,
        decision_type: decision.decision_type,
        routing_target: decision.routing_target.clone(),
    })
}
