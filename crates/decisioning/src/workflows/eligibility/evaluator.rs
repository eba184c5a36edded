//! Pure evaluation of a frozen rule version against one applicant's facts.

use super::domain::{ApplicantFacts, RuleEvaluation, RuleVersion, Severity};

/// Evaluations for every rule in a version, stably ordered by category then
/// name so repeated runs and cross-version diffs line up.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcomes {
    pub evaluations: Vec<RuleEvaluation>,
}

impl RuleOutcomes {
    pub fn all_passed(&self) -> bool {
        self.evaluations.iter().all(|evaluation| evaluation.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RuleEvaluation> {
        self.evaluations
            .iter()
            .filter(|evaluation| !evaluation.passed)
    }

    pub fn critical_failures(&self) -> Vec<&RuleEvaluation> {
        self.failures()
            .filter(|evaluation| evaluation.severity == Severity::Critical)
            .collect()
    }
}

/// Evaluate every rule in the version. A missing referenced field fails its
/// rule with "missing field: <name>"; a type-mismatched fact fails it with
/// the mismatch description. Nothing here can pass a rule by accident.
pub fn evaluate(version: &RuleVersion, facts: &ApplicantFacts) -> RuleOutcomes {
    let mut evaluations: Vec<RuleEvaluation> = version
        .rules
        .iter()
        .map(|rule| {
            let (passed, message) = match rule.expr.evaluate(facts) {
                Ok(true) => (true, None),
                Ok(false) => (false, Some(rule.failure_message.clone())),
                Err(failure) => (false, Some(failure.message())),
            };
            RuleEvaluation {
                rule_id: rule.id.clone(),
                name: rule.name.clone(),
                category: rule.category,
                severity: rule.severity,
                passed,
                message,
            }
        })
        .collect();

    evaluations.sort_by(|a, b| (a.category, &a.name).cmp(&(b.category, &b.name)));
    RuleOutcomes { evaluations }
}
