//! User-authored organization rules and their deterministic evaluation.

mod condition;
mod engine;
mod size;

pub use condition::RuleCondition;
pub use engine::{RuleEngine, RuleMatch};
pub use size::{format_size, parse_size};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RuleError;
use crate::filesystem::security::PathValidator;
use crate::model::{ActionType, FileRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

/// Rule as typed by the user, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    pub conditions: Vec<RuleCondition>,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    pub action: ActionType,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub name: String,
    /// Ordered, without duplicates
    pub conditions: Vec<RuleCondition>,
    pub logical_operator: LogicalOperator,
    pub action: ActionType,
    /// Normalized relative destination. `None` only for deletes.
    pub destination: Option<String>,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Rule {
    /// Validate a draft. Destinations are checked against the validator's root
    /// now and again before every execution.
    pub fn from_draft(draft: RuleDraft, validator: &PathValidator) -> Result<Rule, RuleError> {
        let mut conditions: Vec<RuleCondition> = Vec::with_capacity(draft.conditions.len());
        for condition in draft.conditions {
            if !conditions.contains(&condition) {
                conditions.push(condition);
            }
        }
        if conditions.is_empty() {
            return Err(RuleError::NoConditions);
        }
        if let Some(problem) = conditions.iter().find_map(RuleCondition::authoring_problem) {
            return Err(RuleError::InvalidCondition { reason: problem });
        }

        let destination = match (draft.action, draft.destination.as_deref().map(str::trim)) {
            (ActionType::Delete, _) => None,
            (action, None) | (action, Some("")) => {
                return Err(RuleError::MissingDestination {
                    action: action.to_string(),
                })
            }
            (_, Some(raw)) => Some(
                validator
                    .validate(raw)
                    .map_err(|source| RuleError::InvalidDestination { source })?,
            ),
        };

        let name = match draft.name.trim() {
            "" => format!("Untitled {} rule", draft.action),
            name => name.to_string(),
        };

        Ok(Rule {
            id: Uuid::new_v4(),
            name,
            conditions,
            logical_operator: draft.logical_operator,
            action: draft.action,
            destination,
            priority: draft.priority,
            enabled: draft.enabled,
            created_at: Utc::now(),
        })
    }

    /// Conditions that hold for `file`, or `None` when the rule as a whole
    /// does not match.
    pub fn matched_conditions(
        &self,
        file: &FileRecord,
        now: DateTime<Utc>,
    ) -> Option<Vec<&RuleCondition>> {
        let hits: Vec<&RuleCondition> = self
            .conditions
            .iter()
            .filter(|c| c.matches(file, now))
            .collect();
        let matched = match self.logical_operator {
            LogicalOperator::And => {
                !self.conditions.is_empty() && hits.len() == self.conditions.len()
            }
            LogicalOperator::Or => !hits.is_empty(),
        };
        matched.then_some(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::filesystem::config::OrganizerConfig;
    use std::sync::Arc;

    fn validator(root: &std::path::Path) -> PathValidator {
        PathValidator::new(Arc::new(OrganizerConfig::for_root(root, root.join(".state"))))
    }

    fn draft(action: ActionType, destination: Option<&str>) -> RuleDraft {
        RuleDraft {
            name: "Images".into(),
            conditions: vec![RuleCondition::ExtensionEquals("png".into())],
            logical_operator: LogicalOperator::And,
            action,
            destination: destination.map(String::from),
            priority: 0,
            enabled: true,
        }
    }

    #[test]
    fn accepts_valid_draft_and_dedupes_conditions() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut d = draft(ActionType::Move, Some("  Pictures/PNG "));
        d.conditions.push(RuleCondition::ExtensionEquals("png".into()));
        let rule = Rule::from_draft(d, &validator(temp.path())).unwrap();
        assert_eq!(rule.conditions.len(), 1);
        assert_eq!(rule.destination.as_deref(), Some("Pictures/PNG"));
        assert!(rule.enabled);
    }

    #[test]
    fn rejects_missing_pieces() {
        let temp = tempfile::TempDir::new().unwrap();
        let v = validator(temp.path());

        let mut no_conditions = draft(ActionType::Move, Some("A"));
        no_conditions.conditions.clear();
        assert_eq!(Rule::from_draft(no_conditions, &v), Err(RuleError::NoConditions));

        assert_eq!(
            Rule::from_draft(draft(ActionType::Copy, Some("  ")), &v),
            Err(RuleError::MissingDestination {
                action: "copy".into()
            })
        );

        let mut bad_size = draft(ActionType::Move, Some("A"));
        bad_size.conditions = vec![RuleCondition::SizeGreaterThan("lots".into())];
        assert!(matches!(
            Rule::from_draft(bad_size, &v),
            Err(RuleError::InvalidCondition { .. })
        ));
    }

    #[test]
    fn rejects_unsafe_destination() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = Rule::from_draft(draft(ActionType::Move, Some("../etc")), &validator(temp.path()))
            .unwrap_err();
        assert!(matches!(
            err,
            RuleError::InvalidDestination {
                source: ValidationError::PathTraversal { .. }
            }
        ));
    }

    #[test]
    fn delete_rules_drop_the_destination() {
        let temp = tempfile::TempDir::new().unwrap();
        let rule =
            Rule::from_draft(draft(ActionType::Delete, Some("ignored")), &validator(temp.path()))
                .unwrap();
        assert_eq!(rule.destination, None);
    }

    #[test]
    fn or_reports_only_the_conditions_that_hit() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut d = draft(ActionType::Move, Some("Mixed"));
        d.logical_operator = LogicalOperator::Or;
        d.conditions = vec![
            RuleCondition::ExtensionEquals("jpg".into()),
            RuleCondition::NameContains("scan".into()),
        ];
        let rule = Rule::from_draft(d, &validator(temp.path())).unwrap();
        let file = FileRecord::new("/in/Scan 3.pdf", 10);
        let hits = rule.matched_conditions(&file, Utc::now()).unwrap();
        assert_eq!(hits, vec![&RuleCondition::NameContains("scan".into())]);

        let other = FileRecord::new("/in/notes.txt", 10);
        assert!(rule.matched_conditions(&other, Utc::now()).is_none());
    }
}
