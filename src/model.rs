//! Records exchanged between the organizer and its callers.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OperationError;

/// Lifecycle of a discovered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Ready,
    Completed,
    Skipped,
}

impl FileStatus {
    pub fn can_transition_to(self, next: FileStatus) -> bool {
        use FileStatus::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Ready, Completed)
                | (Pending, Skipped)
                | (Completed, Pending)
                | (Ready, Pending)
        )
    }
}

/// Where a suggested destination came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    Rule,
    Pattern,
    Prediction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Move,
    Copy,
    Delete,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Move => f.write_str("move"),
            ActionType::Copy => f.write_str("copy"),
            ActionType::Delete => f.write_str("delete"),
        }
    }
}

/// A destination proposal attached to a file while it is `ready`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Relative to the destination root. Empty only for trash-bound deletes.
    pub destination: String,
    pub confidence: f64,
    pub source: SuggestionSource,
    pub action: ActionType,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<Uuid>,
}

/// A discovered file pending a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub path: PathBuf,
    pub name: String,
    pub extension: String,
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
    status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    suggestion: Option<Suggestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rejected_destination: Option<String>,
    #[serde(default)]
    pub rejection_count: u32,
}

impl FileRecord {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        let path = path.into();
        let name = file_name_of(&path);
        let extension = extension_of(&path);
        Self {
            id: Uuid::new_v4(),
            path,
            name,
            extension,
            size,
            created: None,
            modified: None,
            accessed: None,
            status: FileStatus::Pending,
            suggestion: None,
            last_rejected_destination: None,
            rejection_count: 0,
        }
    }

    /// Build a record from on-disk metadata.
    pub fn from_metadata(path: &Path, metadata: &std::fs::Metadata) -> Self {
        let mut record = Self::new(path, metadata.len());
        record.created = metadata.created().ok().map(DateTime::<Utc>::from);
        record.modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        record.accessed = metadata.accessed().ok().map(DateTime::<Utc>::from);
        record
    }

    pub fn status(&self) -> FileStatus {
        self.status
    }

    pub fn suggestion(&self) -> Option<&Suggestion> {
        self.suggestion.as_ref()
    }

    pub fn set_status(&mut self, next: FileStatus) -> Result<(), OperationError> {
        if !self.status.can_transition_to(next) {
            return Err(OperationError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        if next == FileStatus::Pending || next == FileStatus::Skipped {
            self.suggestion = None;
        }
        self.status = next;
        Ok(())
    }

    /// Attach a suggestion and move `pending -> ready`.
    pub fn apply_suggestion(&mut self, suggestion: Suggestion) -> Result<(), OperationError> {
        if suggestion.confidence <= 0.0 {
            return Err(OperationError::NoSuggestion);
        }
        self.set_status(FileStatus::Ready)?;
        self.suggestion = Some(suggestion);
        Ok(())
    }

    /// Record that the user turned down the current suggestion.
    pub fn reject_suggestion(&mut self) -> Result<(), OperationError> {
        let rejected = self
            .suggestion
            .as_ref()
            .map(|s| s.destination.clone())
            .ok_or(OperationError::NoSuggestion)?;
        self.set_status(FileStatus::Pending)?;
        self.last_rejected_destination = Some(rejected);
        self.rejection_count += 1;
        Ok(())
    }

    /// Point the record at the file's new location.
    pub fn relocate(&mut self, path: PathBuf) {
        self.name = file_name_of(&path);
        self.extension = extension_of(&path);
        self.path = path;
    }
}

/// Immutable record of one executed, reversible filesystem action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<Uuid>,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    /// Canonical roots the two paths live under.
    pub source_root: PathBuf,
    pub destination_root: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<Uuid>,
}

impl ActionRecord {
    /// The same action pointed the opposite way.
    pub fn reversed(&self) -> ActionRecord {
        ActionRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action_type: self.action_type,
            file_id: self.file_id,
            source_path: self.destination_path.clone(),
            destination_path: self.source_path.clone(),
            source_root: self.destination_root.clone(),
            destination_root: self.source_root.clone(),
            rule_id: self.rule_id,
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
