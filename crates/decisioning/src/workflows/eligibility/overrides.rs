//! Officer overrides and the audit trail around them.
//!
//! The original decision is never touched; an override is appended to the
//! decision's chain together with a history transition. The current
//! effective decision is the latest override when one exists, otherwise the
//! automated decision itself.

use std::sync::Arc;

use chrono::Utc;

use super::domain::{
    DecisionHistoryEntry, DecisionId, DecisionResult, DecisionType, OfficerId, Override,
};
use super::repository::{DecisionRepository, RepositoryError};

/// Failures raised by override handling.
#[derive(Debug, thiserror::Error)]
pub enum OverrideError {
    #[error("override reason must not be empty")]
    EmptyReason,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Manager appending overrides and resolving effective decisions.
pub struct OverrideManager<R> {
    repository: Arc<R>,
}

impl<R> Clone for OverrideManager<R> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
        }
    }
}

impl<R> OverrideManager<R>
where
    R: DecisionRepository,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Append an officer override. The reason is mandatory and rejected
    /// before any state changes; `expected_revision` is the override-chain
    /// length the officer read, so a concurrent override surfaces as a
    /// conflict instead of being silently overwritten.
    pub fn override_decision(
        &self,
        decision_id: &DecisionId,
        decision_type: DecisionType,
        reason: &str,
        officer_id: OfficerId,
        expected_revision: u32,
    ) -> Result<Override, OverrideError> {
        if reason.trim().is_empty() {
            return Err(OverrideError::EmptyReason);
        }

        let decision = self
            .repository
            .decision(decision_id)?
            .ok_or(RepositoryError::NotFound)?;
        let previous = self.effective_type(&decision)?;

        let record = Override {
            decision_id: decision_id.clone(),
            revision: 0,
            decision_type,
            reason: reason.trim().to_string(),
            officer_id,
            created_at: Utc::now(),
        };
        let stored = self.repository.append_override(record, expected_revision)?;

        self.repository
            .append_history(DecisionHistoryEntry::for_override(previous, &stored))?;
        Ok(stored)
    }

    /// Latest override's decision type if any, else the automated decision.
    pub fn effective_decision(
        &self,
        decision_id: &DecisionId,
    ) -> Result<DecisionType, OverrideError> {
        let decision = self
            .repository
            .decision(decision_id)?
            .ok_or(RepositoryError::NotFound)?;
        self.effective_type(&decision)
    }

    pub fn overrides(&self, decision_id: &DecisionId) -> Result<Vec<Override>, OverrideError> {
        Ok(self.repository.overrides(decision_id)?)
    }

    pub fn history(
        &self,
        decision_id: &DecisionId,
    ) -> Result<Vec<DecisionHistoryEntry>, OverrideError> {
        Ok(self.repository.history(decision_id)?)
    }

    fn effective_type(&self, decision: &DecisionResult) -> Result<DecisionType, OverrideError> {
        let chain = self.repository.overrides(&decision.id)?;
        Ok(chain
            .last()
            .map(|record| record.decision_type)
            .unwrap_or(decision.decision_type))
    }
}
