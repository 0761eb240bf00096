//! Rule Store - Versioned safety rules, age-group policies and topics
//!
//! Writers serialize on one mutex, build a new compiled [`RuleSet`] and publish
//! it with [`ArcSwap`]; readers (the pipeline) never lock. Every mutation:
//! - validates before touching state (failures leave the store unchanged)
//! - archives superseded rule versions so audit entries stay resolvable
//! - bumps the monotonic rule-set version, which is part of the cache key
//! - emits a [`SafetyEvent`] after the new snapshot is live

pub mod export;
pub mod testing;
pub mod validation;

use arc_swap::ArcSwap;
use nestguard_core::{
    AgeGroup, AgeGroupPolicy, ContentType, GuardError, GuardResult, NotificationHub, RuleAction,
    RuleCategory, RuleDraft, SafetyEvent, SafetyRule,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{default_rules, default_topics, TopicCatalog};
use crate::ruleset::{compile_pattern, RuleSet};
use export::{ConfigurationDocument, ExportFormat, ImportMode};
use testing::{RuleTestReport, TestSample};
use validation::{detect_conflicts, validate_draft, RuleConflict};

/// Stored rule plus the conflicts it introduced
#[derive(Debug, Clone, PartialEq)]
pub struct RuleChange {
    pub rule: SafetyRule,
    pub warnings: Vec<RuleConflict>,
}

/// What an import changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub mode: ImportMode,
    pub rule_set_version: u64,
    pub rules_added: usize,
    pub rules_updated: usize,
    pub rules_removed: usize,
    pub policies_updated: usize,
    pub topics_updated: usize,
    pub warnings: Vec<RuleConflict>,
}

/// Filters for [`RuleStore::get_rules`]; empty fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleFilter {
    #[serde(default)]
    pub category: Option<RuleCategory>,
    #[serde(default)]
    pub action: Option<RuleAction>,
    #[serde(default)]
    pub age_group: Option<AgeGroup>,
    #[serde(default)]
    pub content_type: Option<ContentType>,
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Case-insensitive substring of the rule name
    #[serde(default)]
    pub name_contains: Option<String>,
}

impl RuleFilter {
    pub fn category(mut self, category: RuleCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn age_group(mut self, age: AgeGroup) -> Self {
        self.age_group = Some(age);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn matches(&self, rule: &SafetyRule) -> bool {
        if self.category.is_some_and(|c| c != rule.category) {
            return false;
        }
        if self.action.is_some_and(|a| a != rule.action) {
            return false;
        }
        if self.age_group.is_some_and(|a| !rule.age_groups.contains(&a)) {
            return false;
        }
        if self.content_type.is_some_and(|c| !rule.contexts.contains(&c)) {
            return false;
        }
        if self.enabled.is_some_and(|e| e != rule.enabled) {
            return false;
        }
        if let Some(ref needle) = self.name_contains {
            if !rule.name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
struct StoreState {
    rules: BTreeMap<String, SafetyRule>,
    /// Superseded versions per rule id, oldest first
    archive: BTreeMap<String, Vec<SafetyRule>>,
    policies: BTreeMap<AgeGroup, AgeGroupPolicy>,
    topics: TopicCatalog,
    version: u64,
}

impl StoreState {
    fn archive(&mut self, rule: SafetyRule) {
        self.archive.entry(rule.id.clone()).or_default().push(rule);
    }

    /// Every blocked topic must resolve in the catalog
    fn check_topics(&self) -> GuardResult<()> {
        for policy in self.policies.values() {
            policy.validate()?;
            for topic in &policy.blocked_topics {
                if !self.topics.contains_key(topic) {
                    return Err(GuardError::config(format!(
                        "{} policy blocks unknown topic '{}'",
                        policy.age_group, topic
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Versioned store of rules, policies and the topic catalog
pub struct RuleStore {
    state: Mutex<StoreState>,
    active: ArcSwap<RuleSet>,
    events: NotificationHub,
}

impl RuleStore {
    /// Store with default policies and topics and no rules
    pub fn new() -> Self {
        Self::from_rules(Vec::new())
    }

    /// Store preloaded with the built-in profanity and harmful-instruction rules
    pub fn with_defaults() -> Self {
        let rules = default_rules()
            .into_iter()
            .map(|(id, draft)| SafetyRule::from_draft(id, draft))
            .collect();
        Self::from_rules(rules)
    }

    fn from_rules(rules: Vec<SafetyRule>) -> Self {
        let state = StoreState {
            rules: rules.into_iter().map(|r| (r.id.clone(), r)).collect(),
            archive: BTreeMap::new(),
            policies: AgeGroup::ALL
                .into_iter()
                .map(|age| (age, AgeGroupPolicy::default_for(age)))
                .collect(),
            topics: default_topics(),
            version: 1,
        };
        let set = RuleSet::build(state.version, state.rules.values(), &state.policies, &state.topics)
            .expect("built-in rule catalog compiles");

        Self {
            state: Mutex::new(state),
            active: ArcSwap::from_pointee(set),
            events: NotificationHub::new(),
        }
    }

    /// Store loaded from an export document (replace semantics over defaults)
    pub fn from_document(doc: ConfigurationDocument) -> GuardResult<Self> {
        let store = Self::new();
        store.import_document(doc, ImportMode::Replace)?;
        Ok(store)
    }

    /// Emit change events through this hub
    pub fn with_events(mut self, events: NotificationHub) -> Self {
        self.events = events;
        self
    }

    /// Hub change events are emitted on
    pub fn events(&self) -> &NotificationHub {
        &self.events
    }

    /// Current compiled snapshot
    pub fn snapshot(&self) -> Arc<RuleSet> {
        self.active.load_full()
    }

    /// Current rule-set version
    pub fn version(&self) -> u64 {
        self.active.load().version()
    }

    /// Apply a mutation to a copy of the state and publish it on success
    fn apply<T>(&self, f: impl FnOnce(&mut StoreState) -> GuardResult<T>) -> GuardResult<(T, u64)> {
        let mut guard = self.state.lock();
        let mut next = guard.clone();
        let out = f(&mut next)?;

        next.version = guard.version + 1;
        let set = RuleSet::build(next.version, next.rules.values(), &next.policies, &next.topics)?;
        let version = next.version;
        *guard = next;
        self.active.store(Arc::new(set));
        Ok((out, version))
    }

    // ------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------

    pub fn create_rule(&self, draft: RuleDraft) -> GuardResult<RuleChange> {
        self.create_rule_with_id(Uuid::new_v4().to_string(), draft)
    }

    /// Create a rule under a caller-chosen id
    pub fn create_rule_with_id(
        &self,
        id: impl Into<String>,
        draft: RuleDraft,
    ) -> GuardResult<RuleChange> {
        validate_draft(&draft)?;
        let id = id.into();
        if id.trim().is_empty() {
            return Err(GuardError::invalid_rule("rule id must not be empty"));
        }

        let (change, version) = self.apply(|state| {
            if state.rules.contains_key(&id) {
                return Err(GuardError::invalid_rule(format!("rule {} already exists", id)));
            }
            let rule = SafetyRule::from_draft(id.clone(), draft);
            let warnings = detect_conflicts(&rule, state.rules.values());
            state.rules.insert(id.clone(), rule.clone());
            Ok(RuleChange { rule, warnings })
        })?;

        for warning in &change.warnings {
            warn!(rule_id = %change.rule.id, "rule conflict: {}", warning);
        }
        info!(rule_id = %change.rule.id, name = %change.rule.name, version, "rule created");
        self.events.emit(SafetyEvent::RuleCreated {
            rule_id: change.rule.id.clone(),
            version: change.rule.version,
        });
        Ok(change)
    }

    /// Store a new version of a rule; the previous version is archived
    pub fn update_rule(&self, id: &str, draft: RuleDraft) -> GuardResult<RuleChange> {
        validate_draft(&draft)?;

        let (change, version) = self.apply(|state| {
            let current = state
                .rules
                .get(id)
                .cloned()
                .ok_or_else(|| GuardError::RuleNotFound(id.to_string()))?;
            let rule = current.revise(draft);
            state.archive(current);
            let warnings = detect_conflicts(&rule, state.rules.values());
            state.rules.insert(id.to_string(), rule.clone());
            Ok(RuleChange { rule, warnings })
        })?;

        for warning in &change.warnings {
            warn!(rule_id = %id, "rule conflict: {}", warning);
        }
        info!(rule_id = %id, rule_version = change.rule.version, version, "rule updated");
        self.events.emit(SafetyEvent::RuleUpdated {
            rule_id: id.to_string(),
            version: change.rule.version,
        });
        Ok(change)
    }

    /// Remove a rule from the active set; its history stays retrievable
    pub fn delete_rule(&self, id: &str) -> GuardResult<SafetyRule> {
        let (rule, version) = self.apply(|state| {
            let rule = state
                .rules
                .remove(id)
                .ok_or_else(|| GuardError::RuleNotFound(id.to_string()))?;
            state.archive(rule.clone());
            Ok(rule)
        })?;

        info!(rule_id = %id, version, "rule deleted");
        self.events.emit(SafetyEvent::RuleDeleted {
            rule_id: id.to_string(),
        });
        Ok(rule)
    }

    pub fn get_rule(&self, id: &str) -> Option<SafetyRule> {
        self.state.lock().rules.get(id).cloned()
    }

    /// A specific version of a rule, current or archived
    pub fn get_rule_version(&self, id: &str, version: u32) -> Option<SafetyRule> {
        let state = self.state.lock();
        if let Some(rule) = state.rules.get(id).filter(|r| r.version == version) {
            return Some(rule.clone());
        }
        state
            .archive
            .get(id)
            .and_then(|versions| versions.iter().find(|r| r.version == version))
            .cloned()
    }

    /// All versions of a rule, oldest first (current last if it still exists)
    pub fn rule_history(&self, id: &str) -> Vec<SafetyRule> {
        let state = self.state.lock();
        let mut history = state.archive.get(id).cloned().unwrap_or_default();
        if let Some(rule) = state.rules.get(id) {
            history.push(rule.clone());
        }
        history
    }

    /// Active rules matching the filter, ordered by id
    pub fn get_rules(&self, filter: &RuleFilter) -> Vec<SafetyRule> {
        self.snapshot()
            .rules()
            .iter()
            .map(|c| &c.rule)
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    /// Check a draft without storing it; returns the conflicts it would introduce
    pub fn validate_rule(&self, draft: &RuleDraft) -> GuardResult<Vec<RuleConflict>> {
        validate_draft(draft)?;
        let candidate = SafetyRule::from_draft("<candidate>", draft.clone());
        let state = self.state.lock();
        Ok(detect_conflicts(&candidate, state.rules.values()))
    }

    /// Every pairwise conflict in the active rule set
    pub fn conflicts(&self) -> Vec<RuleConflict> {
        let state = self.state.lock();
        let rules: Vec<&SafetyRule> = state.rules.values().collect();
        rules
            .iter()
            .enumerate()
            .flat_map(|(i, rule)| detect_conflicts(rule, rules[i + 1..].iter().copied()))
            .collect()
    }

    /// Run a draft against labelled samples
    pub fn test_rule(&self, draft: &RuleDraft, samples: &[TestSample]) -> GuardResult<RuleTestReport> {
        testing::test_rule(draft, samples)
    }

    // ------------------------------------------------------------------
    // Policies and topics
    // ------------------------------------------------------------------

    pub fn policy(&self, age: AgeGroup) -> AgeGroupPolicy {
        self.snapshot().policy(age).clone()
    }

    pub fn policies(&self) -> Vec<AgeGroupPolicy> {
        self.state.lock().policies.values().cloned().collect()
    }

    /// Replace one age group's policy
    pub fn set_policy(&self, policy: AgeGroupPolicy) -> GuardResult<u64> {
        let age = policy.age_group;
        let ((), version) = self.apply(|state| {
            state.policies.insert(age, policy);
            state.check_topics()
        })?;
        info!(age_group = %age, version, "policy updated");
        Ok(version)
    }

    pub fn topics(&self) -> TopicCatalog {
        self.state.lock().topics.clone()
    }

    /// Add or replace a topic's patterns
    pub fn set_topic(&self, name: &str, patterns: Vec<String>) -> GuardResult<u64> {
        if name.trim().is_empty() {
            return Err(GuardError::config("topic name must not be empty"));
        }
        if patterns.is_empty() {
            return Err(GuardError::config(format!("topic '{}' needs at least one pattern", name)));
        }
        for pattern in &patterns {
            compile_pattern(pattern).map_err(|e| {
                GuardError::config(format!("topic '{}': pattern does not compile: {}", name, e))
            })?;
        }

        let ((), version) = self.apply(|state| {
            state.topics.insert(name.to_string(), patterns);
            Ok(())
        })?;
        debug!(topic = name, version, "topic updated");
        Ok(version)
    }

    /// Remove a topic no policy blocks any more
    pub fn remove_topic(&self, name: &str) -> GuardResult<u64> {
        let ((), version) = self.apply(|state| {
            if state.topics.remove(name).is_none() {
                return Err(GuardError::config(format!("unknown topic '{}'", name)));
            }
            state.check_topics()
        })?;
        Ok(version)
    }

    // ------------------------------------------------------------------
    // Export / import
    // ------------------------------------------------------------------

    pub fn export_document(&self) -> GuardResult<ConfigurationDocument> {
        let state = self.state.lock();
        ConfigurationDocument::new(
            state.version,
            state.rules.values().cloned().collect(),
            state.policies.values().cloned().collect(),
            state.topics.clone(),
        )
    }

    pub fn export(&self, format: ExportFormat) -> GuardResult<String> {
        self.export_document()?.render(format)
    }

    /// Parse (JSON or YAML) and import a document
    pub fn import(&self, text: &str, mode: ImportMode) -> GuardResult<ImportSummary> {
        let doc = ConfigurationDocument::parse(text)?;
        self.import_document(doc, mode)
    }

    /// Atomically import a document
    ///
    /// - `Replace`: the rule set becomes exactly the document's rules; listed
    ///   policies replace the current ones; a non-empty topic catalog replaces
    ///   the current catalog.
    /// - `Merge`: document rules are upserted by id; listed policies replace the
    ///   current ones; topics are upserted by name.
    ///
    /// Rules whose editable fields changed get a new version and the old one is
    /// archived. Nothing is applied unless the whole document validates.
    pub fn import_document(
        &self,
        doc: ConfigurationDocument,
        mode: ImportMode,
    ) -> GuardResult<ImportSummary> {
        doc.verify()?;

        let mut seen = BTreeSet::new();
        for rule in &doc.rules {
            if rule.id.trim().is_empty() {
                return Err(GuardError::import(format!("rule '{}' has no id", rule.name)));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(GuardError::import(format!("duplicate rule id {}", rule.id)));
            }
            validate_draft(&rule.to_draft())
                .map_err(|e| GuardError::import(format!("rule {}: {}", rule.id, e)))?;
        }
        let mut ages = BTreeSet::new();
        for policy in &doc.policies {
            if !ages.insert(policy.age_group) {
                return Err(GuardError::import(format!(
                    "duplicate policy for {}",
                    policy.age_group
                )));
            }
        }

        let rule_count = doc.rules.len();
        let (mut summary, version) = self
            .apply(|state| {
                let mut summary = ImportSummary {
                    mode,
                    rule_set_version: 0,
                    rules_added: 0,
                    rules_updated: 0,
                    rules_removed: 0,
                    policies_updated: doc.policies.len(),
                    topics_updated: doc.topics.len(),
                    warnings: Vec::new(),
                };

                if mode == ImportMode::Replace {
                    let incoming: BTreeSet<&str> = doc.rules.iter().map(|r| r.id.as_str()).collect();
                    let removed: Vec<String> = state
                        .rules
                        .keys()
                        .filter(|id| !incoming.contains(id.as_str()))
                        .cloned()
                        .collect();
                    for id in removed {
                        if let Some(rule) = state.rules.remove(&id) {
                            state.archive(rule);
                            summary.rules_removed += 1;
                        }
                    }
                    if !doc.topics.is_empty() {
                        state.topics = doc.topics.clone();
                    }
                } else {
                    for (name, patterns) in &doc.topics {
                        state.topics.insert(name.clone(), patterns.clone());
                    }
                }

                for incoming in &doc.rules {
                    match state.rules.get(&incoming.id).cloned() {
                        Some(current) if current.to_draft() == incoming.to_draft() => {}
                        Some(current) => {
                            let mut rule = incoming.clone();
                            rule.version = incoming.version.max(current.version + 1);
                            rule.created_at = current.created_at;
                            state.archive(current);
                            state.rules.insert(rule.id.clone(), rule);
                            summary.rules_updated += 1;
                        }
                        None => {
                            state.rules.insert(incoming.id.clone(), incoming.clone());
                            summary.rules_added += 1;
                        }
                    }
                }

                for policy in &doc.policies {
                    state.policies.insert(policy.age_group, policy.clone());
                }
                state
                    .check_topics()
                    .map_err(|e| GuardError::import(e.to_string()))?;

                let rules: Vec<&SafetyRule> = state.rules.values().collect();
                summary.warnings = rules
                    .iter()
                    .enumerate()
                    .flat_map(|(i, rule)| detect_conflicts(rule, rules[i + 1..].iter().copied()))
                    .collect();
                Ok(summary)
            })
            .map_err(|e| match e {
                GuardError::Import(_) => e,
                other => GuardError::import(other.to_string()),
            })?;

        summary.rule_set_version = version;
        info!(
            ?mode,
            version,
            added = summary.rules_added,
            updated = summary.rules_updated,
            removed = summary.rules_removed,
            "configuration imported"
        );
        self.events.emit(SafetyEvent::ConfigurationImported {
            rule_set_version: version,
            rule_count,
        });
        Ok(summary)
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for RuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set = self.snapshot();
        f.debug_struct("RuleStore")
            .field("version", &set.version())
            .field("rules", &set.rules().len())
            .finish()
    }
}
