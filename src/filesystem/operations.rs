use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, OperationError};
use crate::model::{ActionRecord, ActionType, FileRecord};

use super::access::ScopedAccessManager;
use super::config::OrganizerConfig;
use super::path_utils;
use super::security::PathValidator;

/// Who asked for an action. Deletes are only honoured from explicit rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOrigin {
    Rule { rule_id: Uuid },
    Prediction,
    Manual,
}

impl ActionOrigin {
    fn rule_id(self) -> Option<Uuid> {
        match self {
            ActionOrigin::Rule { rule_id } => Some(rule_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferMode {
    Move,
    Copy,
}

/// One validated transfer of a single file into `target_root`.
struct Transfer<'a> {
    id: Uuid,
    action_type: ActionType,
    mode: TransferMode,
    source: &'a Path,
    source_root: &'a Path,
    target_root: &'a Path,
    target_relative: String,
    file_id: Option<Uuid>,
    rule_id: Option<Uuid>,
}

/// Executes validated, scoped, verified file actions.
///
/// Each call performs at most one filesystem mutation and one directory
/// creation and hands back an [`ActionRecord`]; recording it is the caller's job.
#[derive(Clone)]
pub struct FileOperations {
    validator: Arc<PathValidator>,
    access: Arc<ScopedAccessManager>,
    config: Arc<OrganizerConfig>,
}

impl FileOperations {
    pub fn new(
        validator: Arc<PathValidator>,
        access: Arc<ScopedAccessManager>,
        config: Arc<OrganizerConfig>,
    ) -> Self {
        Self {
            validator,
            access,
            config,
        }
    }

    pub fn validator(&self) -> &PathValidator {
        &self.validator
    }

    pub fn access(&self) -> &ScopedAccessManager {
        &self.access
    }

    pub fn config(&self) -> &OrganizerConfig {
        &self.config
    }

    /// Run `action` for `file`. `raw_destination` is ignored for deletes.
    pub async fn execute(
        &self,
        file: &FileRecord,
        action: ActionType,
        raw_destination: &str,
        origin: ActionOrigin,
        cancel: &CancellationToken,
    ) -> Result<ActionRecord, Error> {
        match action {
            ActionType::Move => self.move_file(file, raw_destination, origin, cancel).await,
            ActionType::Copy => self.copy_file(file, raw_destination, origin, cancel).await,
            ActionType::Delete => self.delete_file(file, origin, cancel).await,
        }
    }

    /// Move `file` into `raw_destination` under the destination root.
    pub async fn move_file(
        &self,
        file: &FileRecord,
        raw_destination: &str,
        origin: ActionOrigin,
        cancel: &CancellationToken,
    ) -> Result<ActionRecord, Error> {
        self.place(file, raw_destination, TransferMode::Move, ActionType::Move, origin, cancel)
            .await
    }

    /// Copy `file` into `raw_destination`, leaving the original in place.
    pub async fn copy_file(
        &self,
        file: &FileRecord,
        raw_destination: &str,
        origin: ActionOrigin,
        cancel: &CancellationToken,
    ) -> Result<ActionRecord, Error> {
        self.place(file, raw_destination, TransferMode::Copy, ActionType::Copy, origin, cancel)
            .await
    }

    /// Stage `file` in the trash folder so the delete can be undone.
    pub async fn delete_file(
        &self,
        file: &FileRecord,
        origin: ActionOrigin,
        cancel: &CancellationToken,
    ) -> Result<ActionRecord, Error> {
        if !matches!(origin, ActionOrigin::Rule { .. }) {
            return Err(OperationError::DeleteRequiresRule.into());
        }
        let id = Uuid::new_v4();
        let trash = format!("{}/{}", self.config.trash_dir.trim_end_matches('/'), id);
        self.place_with_id(id, file, &trash, TransferMode::Move, ActionType::Delete, origin, cancel)
            .await
    }

    /// Undo `record`: move the file back, or remove the copy it produced.
    pub async fn reverse(
        &self,
        record: &ActionRecord,
        cancel: &CancellationToken,
    ) -> Result<ActionRecord, Error> {
        match record.action_type {
            ActionType::Move | ActionType::Delete => {
                let reversed = self
                    .reapply(
                        &record.destination_path,
                        &record.destination_root,
                        &record.source_path,
                        &record.source_root,
                        record,
                        cancel,
                    )
                    .await?;
                if record.action_type == ActionType::Delete {
                    if let Some(staging) = record.destination_path.parent() {
                        path_utils::prune_empty_dirs(staging, &record.destination_root).await;
                    }
                }
                Ok(reversed)
            }
            ActionType::Copy => self.remove_copy(record, cancel).await,
        }
    }

    /// Redo `record` in its original direction.
    pub async fn replay(
        &self,
        record: &ActionRecord,
        cancel: &CancellationToken,
    ) -> Result<ActionRecord, Error> {
        if record.action_type == ActionType::Copy {
            let original = present(&record.source_path).await;
            let copy = present(&record.destination_path).await;
            if !original {
                return Err(OperationError::NotFound {
                    path: record.source_path.display().to_string(),
                }
                .into());
            }
            if copy {
                return Err(mismatch("a file already occupies the copy destination"));
            }
            let relative = relative_within(&record.destination_path, &record.destination_root)?;
            let transfer = Transfer {
                id: Uuid::new_v4(),
                action_type: ActionType::Copy,
                mode: TransferMode::Copy,
                source: &record.source_path,
                source_root: &record.source_root,
                target_root: &record.destination_root,
                target_relative: relative,
                file_id: record.file_id,
                rule_id: record.rule_id,
            };
            return self.transfer(transfer, cancel).await;
        }

        self.reapply(
            &record.source_path,
            &record.source_root,
            &record.destination_path,
            &record.destination_root,
            record,
            cancel,
        )
        .await
    }

    async fn place(
        &self,
        file: &FileRecord,
        raw_destination: &str,
        mode: TransferMode,
        action_type: ActionType,
        origin: ActionOrigin,
        cancel: &CancellationToken,
    ) -> Result<ActionRecord, Error> {
        self.place_with_id(Uuid::new_v4(), file, raw_destination, mode, action_type, origin, cancel)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn place_with_id(
        &self,
        id: Uuid,
        file: &FileRecord,
        raw_destination: &str,
        mode: TransferMode,
        action_type: ActionType,
        origin: ActionOrigin,
        cancel: &CancellationToken,
    ) -> Result<ActionRecord, Error> {
        // The folder is checked on its own first so errors name what the user typed.
        let folder = self.validator.validate(raw_destination)?;
        let source = canonical_file_path(&file.path).await?;
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| OperationError::NotFound {
                path: file.path.display().to_string(),
            })?;
        let source_root = self.source_root_for(&source);
        let target_relative = format!("{}/{}", folder.trim_end_matches('/'), name);

        self.transfer(
            Transfer {
                id,
                action_type,
                mode,
                source: &source,
                source_root: &source_root,
                target_root: self.validator.root(),
                target_relative,
                file_id: Some(file.id),
                rule_id: origin.rule_id(),
            },
            cancel,
        )
        .await
    }

    /// Move a file recorded at `from` back to `to`, checking the disk still
    /// matches what `record` describes.
    async fn reapply(
        &self,
        from: &Path,
        from_root_hint: &Path,
        to: &Path,
        to_root: &Path,
        record: &ActionRecord,
        cancel: &CancellationToken,
    ) -> Result<ActionRecord, Error> {
        let from_exists = present(from).await;
        let to_exists = present(to).await;
        match (from_exists, to_exists) {
            (true, false) => {}
            (false, false) => {
                return Err(OperationError::NotFound {
                    path: from.display().to_string(),
                }
                .into())
            }
            (false, true) => return Err(mismatch("file is no longer where the action left it")),
            (true, true) => return Err(mismatch("the original location is occupied")),
        }

        let from_root = if from_root_hint.is_dir() && from.starts_with(from_root_hint) {
            from_root_hint.to_path_buf()
        } else {
            self.source_root_for(from)
        };
        let target_relative = relative_within(to, to_root)?;

        self.transfer(
            Transfer {
                id: Uuid::new_v4(),
                action_type: record.action_type,
                mode: TransferMode::Move,
                source: from,
                source_root: &from_root,
                target_root: to_root,
                target_relative,
                file_id: record.file_id,
                rule_id: record.rule_id,
            },
            cancel,
        )
        .await
    }

    async fn remove_copy(
        &self,
        record: &ActionRecord,
        cancel: &CancellationToken,
    ) -> Result<ActionRecord, Error> {
        let relative = relative_within(&record.destination_path, &record.destination_root)?;
        let validated = self
            .validator
            .validate_target(&record.destination_root, &relative)?;

        if !present(&validated.absolute).await {
            return Err(OperationError::NotFound {
                path: validated.absolute.display().to_string(),
            }
            .into());
        }
        if !present(&record.source_path).await {
            return Err(mismatch("the original of this copy is gone"));
        }

        let token = self.access.ensure_access(&validated.canonical_root)?;
        let _scope = self.access.begin(&token)?;
        if cancel.is_cancelled() {
            return Err(OperationError::Cancelled.into());
        }

        fs::remove_file(&validated.absolute)
            .await
            .map_err(|e| OperationError::from_io(&e, &validated.absolute))?;
        if present(&validated.absolute).await {
            return Err(mismatch("copy is still present after removal"));
        }

        tracing::info!("Removed copy {}", validated.absolute.display());
        Ok(record.reversed())
    }

    async fn transfer(
        &self,
        transfer: Transfer<'_>,
        cancel: &CancellationToken,
    ) -> Result<ActionRecord, Error> {
        let validated = self
            .validator
            .validate_target(transfer.target_root, &transfer.target_relative)?;
        let target = validated.absolute.clone();

        match fs::symlink_metadata(transfer.source).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(OperationError::Io {
                    message: format!("{} is not a regular file", transfer.source.display()),
                }
                .into())
            }
            Err(e) => return Err(OperationError::from_io(&e, transfer.source).into()),
        }

        let target_token = self.access.ensure_access(&validated.canonical_root)?;
        let source_token = self.access.ensure_access(transfer.source_root)?;
        let _target_scope = self.access.begin(&target_token)?;
        let _source_scope = self.access.begin(&source_token)?;

        if present(&target).await {
            return Err(OperationError::AlreadyExists {
                path: target.display().to_string(),
            }
            .into());
        }
        if cancel.is_cancelled() {
            return Err(OperationError::Cancelled.into());
        }

        if let Some(parent) = target.parent() {
            if path_utils::ensure_directory(parent).await? {
                tracing::debug!("Created {}", parent.display());
            }
        }

        match transfer.mode {
            TransferMode::Move => move_no_clobber(transfer.source, &target).await?,
            TransferMode::Copy => copy_no_clobber(transfer.source, &target).await?,
        }

        verify(transfer.mode, transfer.source, &target).await?;

        tracing::info!(
            "{} {} -> {}",
            transfer.action_type,
            transfer.source.display(),
            target.display()
        );
        Ok(ActionRecord {
            id: transfer.id,
            timestamp: Utc::now(),
            action_type: transfer.action_type,
            file_id: transfer.file_id,
            source_path: transfer.source.to_path_buf(),
            destination_path: target,
            source_root: source_token.canonical_root.clone(),
            destination_root: validated.canonical_root,
            rule_id: transfer.rule_id,
        })
    }

    fn source_root_for(&self, source: &Path) -> PathBuf {
        self.access.root_containing(source).unwrap_or_else(|| {
            source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| source.to_path_buf())
        })
    }
}

/// Canonical parent joined with the file's own name; the file itself is not
/// resolved, so a symlink is reported rather than followed.
async fn canonical_file_path(path: &Path) -> Result<PathBuf, OperationError> {
    let not_found = || OperationError::NotFound {
        path: path.display().to_string(),
    };
    let name = path.file_name().ok_or_else(not_found)?;
    let parent = path.parent().ok_or_else(not_found)?;
    let parent = fs::canonicalize(parent)
        .await
        .map_err(|e| OperationError::from_io(&e, parent))?;
    Ok(parent.join(name))
}

async fn present(path: &Path) -> bool {
    fs::symlink_metadata(path).await.is_ok()
}

fn mismatch(reason: &str) -> Error {
    OperationError::StateMismatch {
        reason: reason.to_string(),
    }
    .into()
}

/// `path` relative to `root`, forward-slash delimited.
fn relative_within(path: &Path, root: &Path) -> Result<String, OperationError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| OperationError::StateMismatch {
            reason: format!("{} is outside {}", path.display(), root.display()),
        })?;
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_str().ok_or_else(|| {
                OperationError::StateMismatch {
                    reason: format!("{} is not valid UTF-8", path.display()),
                }
            })?),
            _ => {
                return Err(OperationError::StateMismatch {
                    reason: format!("unexpected component in {}", path.display()),
                })
            }
        }
    }
    Ok(segments.join("/"))
}

/// Remove the copy written by a transfer that could not finish. Returns
/// false, with a warning, when it stays behind next to the source.
async fn discard_partial(target: &Path) -> bool {
    match fs::remove_file(target).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                "Could not remove {} after a failed transfer; the file may now exist twice: {}",
                target.display(),
                e
            );
            false
        }
    }
}

/// Move without ever replacing an existing file.
///
/// A hard link fails atomically when `target` exists; where links are not
/// possible (other volume, unsupported filesystem) fall back to rename or copy.
async fn move_no_clobber(source: &Path, target: &Path) -> Result<(), OperationError> {
    match fs::hard_link(source, target).await {
        Ok(()) => {
            if let Err(e) = fs::remove_file(source).await {
                discard_partial(target).await;
                return Err(OperationError::from_io(&e, source));
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(OperationError::AlreadyExists {
                path: target.display().to_string(),
            })
        }
        Err(_) => {
            if present(target).await {
                return Err(OperationError::AlreadyExists {
                    path: target.display().to_string(),
                });
            }
            match fs::rename(source, target).await {
                Ok(()) => Ok(()),
                Err(e) if is_cross_device(&e) => {
                    copy_no_clobber(source, target).await?;
                    if let Err(e) = fs::remove_file(source).await {
                        discard_partial(target).await;
                        return Err(OperationError::from_io(&e, source));
                    }
                    Ok(())
                }
                Err(e) => Err(OperationError::from_io(&e, target)),
            }
        }
    }
}

async fn copy_no_clobber(source: &Path, target: &Path) -> Result<(), OperationError> {
    let mut reader = fs::File::open(source)
        .await
        .map_err(|e| OperationError::from_io(&e, source))?;
    let mut writer = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
        .await
        .map_err(|e| OperationError::from_io(&e, target))?;
    if let Err(e) = tokio::io::copy(&mut reader, &mut writer).await {
        drop(writer);
        discard_partial(target).await;
        return Err(OperationError::from_io(&e, target));
    }
    writer
        .sync_all()
        .await
        .map_err(|e| OperationError::from_io(&e, target))?;
    if let Ok(meta) = fs::metadata(source).await {
        let _ = fs::set_permissions(target, meta.permissions()).await;
    }
    Ok(())
}

fn is_cross_device(err: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(libc::EXDEV)
    }
    #[cfg(windows)]
    {
        // ERROR_NOT_SAME_DEVICE
        err.raw_os_error() == Some(17)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = err;
        false
    }
}

/// Postcondition check after the mutation.
async fn verify(mode: TransferMode, source: &Path, target: &Path) -> Result<(), OperationError> {
    let target_meta = fs::symlink_metadata(target).await.ok();
    let source_present = present(source).await;
    let names_match = source.file_name() == target.file_name();

    let ok = match mode {
        TransferMode::Move => !source_present && target_meta.is_some() && names_match,
        TransferMode::Copy => {
            let source_len = fs::metadata(source).await.map(|m| m.len()).ok();
            source_present
                && names_match
                && target_meta.map(|m| m.len()) == source_len
        }
    };
    if ok {
        Ok(())
    } else {
        Err(OperationError::StateMismatch {
            reason: format!(
                "could not verify {} of {} to {}",
                match mode {
                    TransferMode::Move => "move",
                    TransferMode::Copy => "copy",
                },
                source.display(),
                target.display()
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn partial_copy_is_removed() {
        let temp = tempfile::TempDir::new().unwrap();
        let partial = temp.path().join("half.bin");
        std::fs::write(&partial, b"half").unwrap();

        assert!(discard_partial(&partial).await);
        assert!(!partial.exists());
    }

    #[tokio::test]
    async fn stuck_partial_copy_is_reported() {
        let temp = tempfile::TempDir::new().unwrap();
        // remove_file refuses directories, even for root.
        let stuck = temp.path().join("stuck");
        std::fs::create_dir(&stuck).unwrap();

        assert!(!discard_partial(&stuck).await);
        assert!(stuck.exists());
    }
}
