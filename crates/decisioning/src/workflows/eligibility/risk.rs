//! Boundary to the external risk scoring model.
//!
//! The model itself is opaque; this adapter's only responsibilities are the
//! call timeout and deterministic banding of the continuous score. A timeout
//! and an unreachable scorer look identical to callers: risk is unknown, and
//! the decision policy routes to an officer rather than guessing a band.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::{ApplicantFacts, RiskAssessment, RiskBand, RiskFactor, SchemeId};

/// Raw output of the external scoring function.
#[derive(Debug, Clone, PartialEq)]
pub struct RawScore {
    pub score: f64,
    pub model_version: String,
    pub top_factors: Vec<RiskFactor>,
}

/// Failures reaching the scoring service.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("risk scoring service unavailable: {0}")]
    Unavailable(String),
    #[error("risk scoring call exceeded {0:?}")]
    Timeout(Duration),
}

/// Contract for the external, versioned scoring function.
#[async_trait]
pub trait RiskScorer: Send + Sync {
    async fn score(
        &self,
        scheme_id: &SchemeId,
        facts: &ApplicantFacts,
    ) -> Result<RawScore, ScoringError>;
}

/// Per-scheme band boundaries: `score < medium` is LOW, `score < high` is
/// MEDIUM, anything else HIGH.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub medium: f64,
    pub high: f64,
}

pub const DEFAULT_MEDIUM_THRESHOLD: f64 = 0.3;
pub const DEFAULT_HIGH_THRESHOLD: f64 = 0.7;

impl RiskThresholds {
    /// Build thresholds, falling back to the defaults when the pair is not a
    /// usable ordering inside [0, 1].
    pub fn new(medium: f64, high: f64) -> Self {
        let valid = medium.is_finite()
            && high.is_finite()
            && (0.0..=1.0).contains(&medium)
            && (0.0..=1.0).contains(&high)
            && medium <= high;
        if valid {
            Self { medium, high }
        } else {
            Self::default()
        }
    }

    pub fn band(&self, score: f64) -> RiskBand {
        if score < self.medium {
            RiskBand::Low
        } else if score < self.high {
            RiskBand::Medium
        } else {
            RiskBand::High
        }
    }
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium: DEFAULT_MEDIUM_THRESHOLD,
            high: DEFAULT_HIGH_THRESHOLD,
        }
    }
}

/// Adapter owning the timeout and banding around a [`RiskScorer`].
pub struct RiskAdapter<S> {
    scorer: Arc<S>,
    timeout: Duration,
}

impl<S> Clone for RiskAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            scorer: self.scorer.clone(),
            timeout: self.timeout,
        }
    }
}

impl<S> RiskAdapter<S>
where
    S: RiskScorer,
{
    pub fn new(scorer: Arc<S>, timeout: Duration) -> Self {
        Self { scorer, timeout }
    }

    /// Score and band one applicant. Scores outside [0, 1] are clamped before
    /// banding so a misbehaving model cannot invent a band.
    pub async fn assess(
        &self,
        scheme_id: &SchemeId,
        facts: &ApplicantFacts,
        thresholds: RiskThresholds,
    ) -> Result<RiskAssessment, ScoringError> {
        let raw = tokio::time::timeout(self.timeout, self.scorer.score(scheme_id, facts))
            .await
            .map_err(|_| ScoringError::Timeout(self.timeout))??;

        let score = raw.score.clamp(0.0, 1.0);
        Ok(RiskAssessment {
            score,
            band: thresholds.band(score),
            model_version: raw.model_version,
            top_factors: raw.top_factors,
        })
    }
}
