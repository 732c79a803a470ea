use std::path::{Path, PathBuf};

use crate::error::OperationError;

/// Find a component of `dir` that exists as a file where a folder is needed
pub fn first_file_component(dir: &Path) -> Option<PathBuf> {
    let mut current = PathBuf::new();
    for component in dir.components() {
        current.push(component);
        if current.is_file() {
            return Some(current);
        }
    }
    None
}

/// Create `dir` and any missing parents, refusing to descend through files.
///
/// Returns whether anything had to be created.
pub async fn ensure_directory(dir: &Path) -> Result<bool, OperationError> {
    if let Some(blocker) = first_file_component(dir) {
        return Err(OperationError::AlreadyExists {
            path: blocker.display().to_string(),
        });
    }
    if dir.is_dir() {
        return Ok(false);
    }

    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        // ENOTDIR: a component raced into existence as a file
        if let Some(20) = e.raw_os_error() {
            if let Some(blocker) = first_file_component(dir) {
                return OperationError::AlreadyExists {
                    path: blocker.display().to_string(),
                };
            }
        }
        OperationError::from_io(&e, dir)
    })?;
    Ok(true)
}

/// Remove `dir` and then each empty parent up to (not including) `stop`.
pub async fn prune_empty_dirs(dir: &Path, stop: &Path) {
    let mut current = Some(dir.to_path_buf());
    while let Some(path) = current {
        if path == stop || !path.starts_with(stop) {
            break;
        }
        if tokio::fs::remove_dir(&path).await.is_err() {
            break;
        }
        current = path.parent().map(Path::to_path_buf);
    }
}
