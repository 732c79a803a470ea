use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::RuleError;
use crate::filesystem::security::PathValidator;
use crate::model::{ActionType, FileRecord, Suggestion, SuggestionSource};

use super::{Rule, RuleDraft};

/// Confidence carried by every rule match.
pub const RULE_CONFIDENCE: f64 = 1.0;

/// The winning rule for a file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleMatch {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub action: ActionType,
    /// Empty for deletes
    pub destination: String,
    pub confidence: f64,
    pub reason: String,
}

impl RuleMatch {
    pub fn into_suggestion(self) -> Suggestion {
        Suggestion {
            destination: self.destination,
            confidence: self.confidence,
            source: SuggestionSource::Rule,
            action: self.action,
            reason: self.reason,
            rule_id: Some(self.rule_id),
        }
    }
}

/// Validates drafts and picks the first matching rule for a file.
///
/// Evaluation touches nothing on disk. Rules are tried by descending
/// priority, then oldest first, then by id, so the same inputs always pick
/// the same winner.
#[derive(Clone)]
pub struct RuleEngine {
    validator: Arc<PathValidator>,
}

impl RuleEngine {
    pub fn new(validator: Arc<PathValidator>) -> Self {
        Self { validator }
    }

    pub fn author(&self, draft: RuleDraft) -> Result<Rule, RuleError> {
        Rule::from_draft(draft, &self.validator)
    }

    pub fn evaluate(&self, file: &FileRecord, rules: &[Rule]) -> Option<RuleMatch> {
        self.evaluate_at(file, rules, Utc::now())
    }

    pub fn evaluate_at(
        &self,
        file: &FileRecord,
        rules: &[Rule],
        now: DateTime<Utc>,
    ) -> Option<RuleMatch> {
        Self::ordered(rules).into_iter().find_map(|rule| {
            let hits = rule.matched_conditions(file, now)?;
            let conditions: Vec<String> = hits.iter().map(|c| c.describe()).collect();
            Some(RuleMatch {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                action: rule.action,
                destination: rule.destination.clone().unwrap_or_default(),
                confidence: RULE_CONFIDENCE,
                reason: format!("Matched rule '{}': {}", rule.name, conditions.join(", ")),
            })
        })
    }

    /// Enabled rules in evaluation order.
    pub fn ordered(rules: &[Rule]) -> Vec<&Rule> {
        let mut enabled: Vec<&Rule> = rules.iter().filter(|r| r.enabled).collect();
        enabled.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        enabled
    }
}
