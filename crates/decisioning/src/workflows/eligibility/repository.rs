//! Boundary traits for collaborators: decision persistence, the applicant
//! fact provider, and the downstream queue dispatcher.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::domain::{
    ApplicantFacts, ApplicantId, DecisionHistoryEntry, DecisionId, DecisionResult, Override,
    RoutingTarget, SchemeId,
};

/// Failures raised by decision persistence.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("decision already recorded")]
    Conflict,
    #[error("decision not found")]
    NotFound,
    #[error("override chain moved: expected revision {expected}, found {current}")]
    RevisionConflict { expected: u32, current: u32 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction for decisions, overrides, and the audit trail.
/// Decisions and history entries are append-only; nothing here mutates a
/// stored record in place.
pub trait DecisionRepository: Send + Sync {
    fn insert_decision(&self, decision: DecisionResult)
        -> Result<DecisionResult, RepositoryError>;

    fn decision(&self, id: &DecisionId) -> Result<Option<DecisionResult>, RepositoryError>;

    /// Decisions for a scheme with `evaluated_at` in `[start, end)`.
    fn decisions_in_window(
        &self,
        scheme_id: &SchemeId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DecisionResult>, RepositoryError>;

    /// Append an override to a decision's chain. `expected_revision` is the
    /// chain length the caller observed; the append fails with
    /// [`RepositoryError::RevisionConflict`] when the chain has moved, and
    /// the stored record comes back with its assigned 1-based revision.
    fn append_override(
        &self,
        record: Override,
        expected_revision: u32,
    ) -> Result<Override, RepositoryError>;

    fn overrides(&self, id: &DecisionId) -> Result<Vec<Override>, RepositoryError>;

    fn append_history(&self, entry: DecisionHistoryEntry) -> Result<(), RepositoryError>;

    fn history(&self, id: &DecisionId) -> Result<Vec<DecisionHistoryEntry>, RepositoryError>;
}

/// Failures fetching applicant facts.
#[derive(Debug, thiserror::Error)]
pub enum FactProviderError {
    #[error("unknown applicant {0}")]
    UnknownApplicant(ApplicantId),
    #[error("unknown scheme {0}")]
    UnknownScheme(SchemeId),
    #[error("fact source unavailable: {0}")]
    Unavailable(String),
}

/// Golden-record collaborator supplying applicant facts. Must fail
/// explicitly for unknown applicant/scheme pairs; partial facts are never
/// returned silently.
#[async_trait]
pub trait FactProvider: Send + Sync {
    async fn facts(
        &self,
        applicant_id: &ApplicantId,
        scheme_id: &SchemeId,
    ) -> Result<ApplicantFacts, FactProviderError>;

    /// Roster of applicants awaiting evaluation for a scheme, consumed by
    /// batch worklist generation.
    async fn pending_applicants(
        &self,
        scheme_id: &SchemeId,
    ) -> Result<Vec<ApplicantId>, FactProviderError>;
}

/// Failures dispatching to a downstream queue.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("queue transport unavailable: {0}")]
    Transport(String),
}

/// Fire-and-forget handoff to officer/fraud/submission queues. Delivery is
/// at-least-once; consumers dedupe on decision id.
pub trait QueueDispatcher: Send + Sync {
    fn dispatch(
        &self,
        target: &RoutingTarget,
        decision: &DecisionResult,
    ) -> Result<(), DispatchError>;
}
