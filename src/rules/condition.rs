use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::model::FileRecord;

use super::size::parse_size;

/// A single predicate over a file's name, size or timestamps.
///
/// Name comparisons are literal substring tests on the NFC-normalized,
/// lowercased full file name. Size values use [`parse_size`] units; day
/// counts of zero or less never match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RuleCondition {
    ExtensionEquals(String),
    NameContains(String),
    NameStartsWith(String),
    NameEndsWith(String),
    SizeGreaterThan(String),
    SizeLessThan(String),
    /// Compared against the creation time
    DateOlderThan(i64),
    ModifiedOlderThan(i64),
    AccessedOlderThan(i64),
}

impl RuleCondition {
    pub fn matches(&self, file: &FileRecord, now: DateTime<Utc>) -> bool {
        match self {
            RuleCondition::ExtensionEquals(ext) => {
                let wanted = normalize(ext.trim_start_matches('.'));
                !wanted.is_empty() && normalize(&file.extension) == wanted
            }
            RuleCondition::NameContains(needle) => {
                !needle.is_empty() && normalize(&file.name).contains(&normalize(needle))
            }
            RuleCondition::NameStartsWith(prefix) => {
                !prefix.is_empty() && normalize(&file.name).starts_with(&normalize(prefix))
            }
            RuleCondition::NameEndsWith(suffix) => {
                !suffix.is_empty() && normalize(&file.name).ends_with(&normalize(suffix))
            }
            RuleCondition::SizeGreaterThan(raw) => {
                parse_size(raw).is_some_and(|limit| file.size > limit)
            }
            RuleCondition::SizeLessThan(raw) => {
                parse_size(raw).is_some_and(|limit| file.size < limit)
            }
            RuleCondition::DateOlderThan(days) => older_than(file.created, *days, now),
            RuleCondition::ModifiedOlderThan(days) => older_than(file.modified, *days, now),
            RuleCondition::AccessedOlderThan(days) => older_than(file.accessed, *days, now),
        }
    }

    /// Short human description used in match explanations.
    pub fn describe(&self) -> String {
        match self {
            RuleCondition::ExtensionEquals(ext) => {
                format!("extension is .{}", ext.trim_start_matches('.'))
            }
            RuleCondition::NameContains(s) => format!("name contains \"{}\"", s),
            RuleCondition::NameStartsWith(s) => format!("name starts with \"{}\"", s),
            RuleCondition::NameEndsWith(s) => format!("name ends with \"{}\"", s),
            RuleCondition::SizeGreaterThan(s) => format!("larger than {}", s.trim()),
            RuleCondition::SizeLessThan(s) => format!("smaller than {}", s.trim()),
            RuleCondition::DateOlderThan(d) => format!("created more than {} day(s) ago", d),
            RuleCondition::ModifiedOlderThan(d) => format!("modified more than {} day(s) ago", d),
            RuleCondition::AccessedOlderThan(d) => format!("opened more than {} day(s) ago", d),
        }
    }

    /// Problems that would make the condition silently never match.
    pub(crate) fn authoring_problem(&self) -> Option<String> {
        match self {
            RuleCondition::ExtensionEquals(s)
            | RuleCondition::NameContains(s)
            | RuleCondition::NameStartsWith(s)
            | RuleCondition::NameEndsWith(s)
                if s.trim_start_matches('.').is_empty() =>
            {
                Some(format!("{} needs a value", self.describe()))
            }
            RuleCondition::SizeGreaterThan(s) | RuleCondition::SizeLessThan(s)
                if parse_size(s).is_none() =>
            {
                Some(format!("\"{}\" is not a size", s))
            }
            _ => None,
        }
    }
}

pub(crate) fn normalize(s: &str) -> String {
    s.nfc().collect::<String>().to_lowercase()
}

fn older_than(timestamp: Option<DateTime<Utc>>, days: i64, now: DateTime<Utc>) -> bool {
    if days <= 0 {
        return false;
    }
    let (Some(timestamp), Some(window)) = (timestamp, Duration::try_days(days)) else {
        return false;
    };
    now.signed_duration_since(timestamp) >= window
}
