//! Error taxonomy surfaced to callers.
//!
//! Every failure belongs to one of four closed families. Validation and access
//! errors are raised before any filesystem mutation; operation errors are raised
//! after validation passed; persistence errors trigger transactional rollback.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::FileStatus;

/// Destination path rejected by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("destination is empty")]
    Empty,
    #[error("absolute paths are not accepted: {path}")]
    AbsolutePathRejected { path: String },
    #[error("path traversal is not allowed: {path}")]
    PathTraversal { path: String },
    #[error("path is too long ({length} bytes, limit {limit})")]
    TooLong { length: usize, limit: usize },
    #[error("invalid characters in '{segment}'")]
    InvalidCharacters { segment: String },
    #[error("'{segment}' is a reserved system folder")]
    ReservedName { segment: String },
    #[error("path resolves outside the destination root: {path}")]
    SymlinkEscape { path: String },
    #[error("destination root is unavailable: {root}")]
    RootUnavailable { root: String },
}

/// Capability grant failures.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessError {
    #[error("access to {root} was denied")]
    Denied { root: String },
    #[error("folder selection was cancelled")]
    Cancelled,
    #[error("stored access to {root} is no longer valid")]
    StaleToken { root: String },
    #[error("expected a folder named '{expected}' but '{selected}' was selected")]
    WrongFolderSelected { expected: String, selected: String },
}

/// Failures raised while executing or reversing a filesystem action.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationError {
    #[error("file not found: {path}")]
    NotFound { path: String },
    #[error("a file already exists at {path}")]
    AlreadyExists { path: String },
    #[error("not enough disk space to write {path}")]
    DiskFull { path: String },
    #[error("{path} is in use")]
    InUse { path: String },
    #[error("file state changed since the action was recorded: {reason}")]
    StateMismatch { reason: String },
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
    #[error("deletes must originate from an explicit rule")]
    DeleteRequiresRule,
    #[error("file has no destination ready to apply")]
    NoSuggestion,
    #[error("cannot change status from {from:?} to {to:?}")]
    InvalidTransition { from: FileStatus, to: FileStatus },
    #[error("operation cancelled")]
    Cancelled,
    #[error("I/O error: {message}")]
    Io { message: String },
}

/// Durable state could not be written or read.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PersistenceError {
    #[error("failed to save state: {message}")]
    SaveFailed { message: String },
    #[error("failed to load state: {message}")]
    LoadFailed { message: String },
}

/// Rule authoring failures.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleError {
    #[error("a rule needs at least one condition")]
    NoConditions,
    #[error("{reason}")]
    InvalidCondition { reason: String },
    #[error("a destination is required for {action} rules")]
    MissingDestination { action: String },
    #[error("invalid destination: {source}")]
    InvalidDestination { source: ValidationError },
    #[error("unknown rule: {id}")]
    UnknownRule { id: String },
}

/// Follow-up a caller may offer the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    ReRequestAccess,
    Retry,
    ChooseDifferentDestination,
    RescanFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "family", content = "error", rename_all = "snake_case")]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Rule(#[from] RuleError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Message suitable for showing to the user as-is.
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(e) => format!("That destination can't be used: {}.", e),
            Error::Access(AccessError::Cancelled) => "Folder access was not granted.".to_string(),
            Error::Access(AccessError::WrongFolderSelected { expected, .. }) => {
                format!("Please select the folder named '{}'.", expected)
            }
            Error::Access(e) => format!("Tidyflow needs permission again: {}.", e),
            Error::Operation(OperationError::StateMismatch { .. }) => {
                "The file was changed elsewhere, so this action can't be reversed.".to_string()
            }
            Error::Operation(e) => format!("The action failed: {}.", e),
            Error::Persistence(_) => {
                "Your changes could not be saved and were rolled back.".to_string()
            }
            Error::Rule(e) => format!("The rule is incomplete: {}.", e),
        }
    }

    pub fn recovery(&self) -> Option<RecoveryAction> {
        match self {
            Error::Access(AccessError::StaleToken { .. })
            | Error::Access(AccessError::Denied { .. })
            | Error::Access(AccessError::WrongFolderSelected { .. }) => {
                Some(RecoveryAction::ReRequestAccess)
            }
            Error::Access(AccessError::Cancelled) => None,
            Error::Validation(_) | Error::Rule(RuleError::InvalidDestination { .. }) => {
                Some(RecoveryAction::ChooseDifferentDestination)
            }
            Error::Operation(OperationError::AlreadyExists { .. }) => {
                Some(RecoveryAction::ChooseDifferentDestination)
            }
            Error::Operation(OperationError::NotFound { .. })
            | Error::Operation(OperationError::StateMismatch { .. }) => {
                Some(RecoveryAction::RescanFile)
            }
            Error::Operation(OperationError::DiskFull { .. })
            | Error::Operation(OperationError::InUse { .. })
            | Error::Operation(OperationError::Cancelled)
            | Error::Operation(OperationError::Io { .. })
            | Error::Persistence(_) => Some(RecoveryAction::Retry),
            Error::Operation(_) | Error::Rule(_) => None,
        }
    }
}

impl OperationError {
    /// Map an I/O failure on `path` into the operation taxonomy.
    pub fn from_io(err: &std::io::Error, path: &std::path::Path) -> Self {
        let path = path.display().to_string();
        match err.kind() {
            std::io::ErrorKind::NotFound => return OperationError::NotFound { path },
            std::io::ErrorKind::AlreadyExists => return OperationError::AlreadyExists { path },
            _ => {}
        }
        #[cfg(unix)]
        {
            match err.raw_os_error() {
                Some(libc::ENOSPC) | Some(libc::EDQUOT) => {
                    return OperationError::DiskFull { path }
                }
                Some(libc::EBUSY) | Some(libc::ETXTBSY) => return OperationError::InUse { path },
                _ => {}
            }
        }
        #[cfg(windows)]
        {
            // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION, ERROR_DISK_FULL
            match err.raw_os_error() {
                Some(32) | Some(33) => return OperationError::InUse { path },
                Some(112) => return OperationError::DiskFull { path },
                _ => {}
            }
        }
        OperationError::Io {
            message: format!("{}: {}", path, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_token_suggests_new_grant() {
        let err: Error = AccessError::StaleToken {
            root: "/tmp/Documents".into(),
        }
        .into();
        assert_eq!(err.recovery(), Some(RecoveryAction::ReRequestAccess));
    }

    #[test]
    fn cancelled_grant_has_no_recovery() {
        let err: Error = AccessError::Cancelled.into();
        assert_eq!(err.recovery(), None);
    }

    #[test]
    fn io_not_found_maps_to_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let mapped = OperationError::from_io(&io, std::path::Path::new("/a/b"));
        assert_eq!(
            mapped,
            OperationError::NotFound {
                path: "/a/b".into()
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn enospc_maps_to_disk_full() {
        let io = std::io::Error::from_raw_os_error(libc::ENOSPC);
        let mapped = OperationError::from_io(&io, std::path::Path::new("/a"));
        assert!(matches!(mapped, OperationError::DiskFull { .. }));
    }

    #[test]
    fn errors_serialize_with_kind_tags() {
        let err: Error = ValidationError::PathTraversal {
            path: "../x".into(),
        }
        .into();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["family"], "validation");
        assert_eq!(json["error"]["kind"], "path_traversal");
    }
}
