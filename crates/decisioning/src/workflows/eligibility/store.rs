//! In-memory rule store: draft lifecycle, immutable published versions, and
//! named snapshots.
//!
//! Thread-safe via `std::sync::RwLock`; publish and rollback take the write
//! lock, which serializes version creation per store. Published versions are
//! immutable, so concurrent readers never need coordination.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use super::domain::{Rule, RuleCategory, RuleId, RuleSetSnapshot, RuleVersion, SchemeId, Severity};
use super::expr::{ExprError, RuleExpr};

/// Failures raised by rule store operations.
#[derive(Debug, thiserror::Error)]
pub enum RuleStoreError {
    #[error("rule {0} not found")]
    RuleNotFound(RuleId),
    #[error("scheme {0} has no published rule version")]
    NoActiveVersion(SchemeId),
    #[error("version {version} not found for scheme {scheme_id}")]
    VersionNotFound { scheme_id: SchemeId, version: u32 },
    #[error("snapshot {0} not found")]
    SnapshotNotFound(String),
    #[error("snapshot name {0} is already taken")]
    SnapshotNameTaken(String),
    #[error("scheme {0} has no active draft rules to publish")]
    NothingToPublish(SchemeId),
    #[error("rule {name}: {source}")]
    Validation {
        name: String,
        #[source]
        source: ExprError,
    },
}

/// Fields required to create a draft rule.
#[derive(Debug, Clone)]
pub struct NewRule {
    pub scheme_id: SchemeId,
    pub category: RuleCategory,
    pub name: String,
    pub expr: RuleExpr,
    pub severity: Severity,
    pub failure_message: String,
}

#[derive(Default)]
struct StoreInner {
    drafts: HashMap<RuleId, Rule>,
    versions: HashMap<SchemeId, Vec<RuleVersion>>,
    active: HashMap<SchemeId, u32>,
    snapshots: HashMap<String, RuleSetSnapshot>,
    rule_sequence: u64,
}

impl StoreInner {
    fn next_rule_id(&mut self) -> RuleId {
        self.rule_sequence += 1;
        RuleId(format!("rule-{:06}", self.rule_sequence))
    }

    fn version_list(&self, scheme_id: &SchemeId) -> Option<&Vec<RuleVersion>> {
        self.versions.get(scheme_id)
    }

    fn find_version(
        &self,
        scheme_id: &SchemeId,
        version: u32,
    ) -> Result<&RuleVersion, RuleStoreError> {
        self.version_list(scheme_id)
            .and_then(|list| list.iter().find(|v| v.version == version))
            .ok_or_else(|| RuleStoreError::VersionNotFound {
                scheme_id: scheme_id.clone(),
                version,
            })
    }
}

/// Store holding draft rules, published versions, the per-scheme active
/// version pointer, and named snapshots.
#[derive(Default)]
pub struct RuleStore {
    inner: RwLock<StoreInner>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a draft rule. The expression is validated up front so authoring
    /// mistakes surface immediately rather than at publish.
    pub fn create_rule(&self, new_rule: NewRule) -> Result<Rule, RuleStoreError> {
        new_rule
            .expr
            .validate()
            .map_err(|source| RuleStoreError::Validation {
                name: new_rule.name.clone(),
                source,
            })?;

        let mut inner = self.inner.write().expect("rule store lock poisoned");
        let rule = Rule {
            id: inner.next_rule_id(),
            scheme_id: new_rule.scheme_id,
            category: new_rule.category,
            name: new_rule.name,
            expr: new_rule.expr,
            severity: new_rule.severity,
            active: true,
            failure_message: new_rule.failure_message,
        };
        inner.drafts.insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    /// Replace an existing draft. Published copies are untouched.
    pub fn update_rule(&self, rule: Rule) -> Result<Rule, RuleStoreError> {
        rule.expr
            .validate()
            .map_err(|source| RuleStoreError::Validation {
                name: rule.name.clone(),
                source,
            })?;

        let mut inner = self.inner.write().expect("rule store lock poisoned");
        if !inner.drafts.contains_key(&rule.id) {
            return Err(RuleStoreError::RuleNotFound(rule.id));
        }
        inner.drafts.insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    /// Remove a draft. Frozen copies inside published versions survive.
    pub fn delete_rule(&self, rule_id: &RuleId) -> Result<(), RuleStoreError> {
        let mut inner = self.inner.write().expect("rule store lock poisoned");
        inner
            .drafts
            .remove(rule_id)
            .map(|_| ())
            .ok_or_else(|| RuleStoreError::RuleNotFound(rule_id.clone()))
    }

    pub fn rule(&self, rule_id: &RuleId) -> Result<Rule, RuleStoreError> {
        let inner = self.inner.read().expect("rule store lock poisoned");
        inner
            .drafts
            .get(rule_id)
            .cloned()
            .ok_or_else(|| RuleStoreError::RuleNotFound(rule_id.clone()))
    }

    pub fn draft_rules(&self, scheme_id: &SchemeId) -> Vec<Rule> {
        let inner = self.inner.read().expect("rule store lock poisoned");
        let mut rules: Vec<Rule> = inner
            .drafts
            .values()
            .filter(|rule| &rule.scheme_id == scheme_id)
            .cloned()
            .collect();
        rules.sort_by(|a, b| (a.category, &a.name).cmp(&(b.category, &b.name)));
        rules
    }

    /// Duplicate a draft as a new inactive draft named "<name> (copy)".
    pub fn clone_rule(&self, rule_id: &RuleId) -> Result<Rule, RuleStoreError> {
        let mut inner = self.inner.write().expect("rule store lock poisoned");
        let source = inner
            .drafts
            .get(rule_id)
            .cloned()
            .ok_or_else(|| RuleStoreError::RuleNotFound(rule_id.clone()))?;

        let clone = Rule {
            id: inner.next_rule_id(),
            name: format!("{} (copy)", source.name),
            active: false,
            ..source
        };
        inner.drafts.insert(clone.id.clone(), clone.clone());
        Ok(clone)
    }

    /// Freeze all active drafts for a scheme into a new immutable version and
    /// move the scheme's active pointer onto it. Every expression is
    /// re-validated first; nothing is frozen if any rule fails.
    pub fn publish(&self, scheme_id: &SchemeId) -> Result<RuleVersion, RuleStoreError> {
        let mut inner = self.inner.write().expect("rule store lock poisoned");

        let mut rules: Vec<Rule> = inner
            .drafts
            .values()
            .filter(|rule| &rule.scheme_id == scheme_id && rule.active)
            .cloned()
            .collect();
        if rules.is_empty() {
            return Err(RuleStoreError::NothingToPublish(scheme_id.clone()));
        }
        rules.sort_by(|a, b| (a.category, &a.name).cmp(&(b.category, &b.name)));

        for rule in &rules {
            rule.expr
                .validate()
                .map_err(|source| RuleStoreError::Validation {
                    name: rule.name.clone(),
                    source,
                })?;
        }

        let next = inner
            .version_list(scheme_id)
            .and_then(|list| list.last())
            .map(|latest| latest.version + 1)
            .unwrap_or(1);

        let version = RuleVersion {
            scheme_id: scheme_id.clone(),
            version: next,
            rules,
            published_at: Utc::now(),
        };

        inner
            .versions
            .entry(scheme_id.clone())
            .or_default()
            .push(version.clone());
        inner.active.insert(scheme_id.clone(), next);
        Ok(version)
    }

    /// Forward-only rollback: re-publish a prior version's content as a new
    /// version and reset the scheme's drafts to match. History is never
    /// rewritten.
    pub fn rollback(
        &self,
        scheme_id: &SchemeId,
        target_version: u32,
    ) -> Result<RuleVersion, RuleStoreError> {
        let mut inner = self.inner.write().expect("rule store lock poisoned");

        let target = inner.find_version(scheme_id, target_version)?.clone();
        let next = inner
            .version_list(scheme_id)
            .and_then(|list| list.last())
            .map(|latest| latest.version + 1)
            .unwrap_or(1);

        let version = RuleVersion {
            scheme_id: scheme_id.clone(),
            version: next,
            rules: target.rules.clone(),
            published_at: Utc::now(),
        };

        inner
            .drafts
            .retain(|_, rule| &rule.scheme_id != scheme_id);
        for rule in &target.rules {
            inner.drafts.insert(rule.id.clone(), rule.clone());
        }

        inner
            .versions
            .entry(scheme_id.clone())
            .or_default()
            .push(version.clone());
        inner.active.insert(scheme_id.clone(), next);
        Ok(version)
    }

    /// Tag a version under a unique name for reproducible retrieval.
    pub fn snapshot(
        &self,
        scheme_id: &SchemeId,
        version: u32,
        name: impl Into<String>,
    ) -> Result<RuleSetSnapshot, RuleStoreError> {
        let name = name.into();
        let mut inner = self.inner.write().expect("rule store lock poisoned");

        inner.find_version(scheme_id, version)?;
        if inner.snapshots.contains_key(&name) {
            return Err(RuleStoreError::SnapshotNameTaken(name));
        }

        let snapshot = RuleSetSnapshot {
            name: name.clone(),
            scheme_id: scheme_id.clone(),
            version,
            created_at: Utc::now(),
        };
        inner.snapshots.insert(name, snapshot.clone());
        Ok(snapshot)
    }

    pub fn snapshot_by_name(&self, name: &str) -> Result<RuleSetSnapshot, RuleStoreError> {
        let inner = self.inner.read().expect("rule store lock poisoned");
        inner
            .snapshots
            .get(name)
            .cloned()
            .ok_or_else(|| RuleStoreError::SnapshotNotFound(name.to_string()))
    }

    pub fn version(
        &self,
        scheme_id: &SchemeId,
        version: u32,
    ) -> Result<RuleVersion, RuleStoreError> {
        let inner = self.inner.read().expect("rule store lock poisoned");
        inner.find_version(scheme_id, version).cloned()
    }

    /// The version the scheme's active pointer currently designates.
    pub fn active_version(&self, scheme_id: &SchemeId) -> Result<RuleVersion, RuleStoreError> {
        let inner = self.inner.read().expect("rule store lock poisoned");
        let active = inner
            .active
            .get(scheme_id)
            .copied()
            .ok_or_else(|| RuleStoreError::NoActiveVersion(scheme_id.clone()))?;
        inner.find_version(scheme_id, active).cloned()
    }

    pub fn versions(&self, scheme_id: &SchemeId) -> Vec<RuleVersion> {
        let inner = self.inner.read().expect("rule store lock poisoned");
        inner
            .version_list(scheme_id)
            .cloned()
            .unwrap_or_default()
    }
}
