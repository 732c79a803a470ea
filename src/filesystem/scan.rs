use std::path::Path;

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::error::OperationError;
use crate::model::FileRecord;

use super::platform;

/// Regular, visible files directly inside `folder`, sorted by name.
///
/// Symlinks and subfolders are left alone. Blocking; run it off the runtime.
pub fn scan_folder(
    folder: &Path,
    cancel: &CancellationToken,
) -> Result<Vec<FileRecord>, OperationError> {
    let folder = folder
        .canonicalize()
        .map_err(|e| OperationError::from_io(&e, folder))?;
    if !folder.is_dir() {
        return Err(OperationError::NotFound {
            path: folder.display().to_string(),
        });
    }

    let mut records = Vec::new();
    for entry in WalkDir::new(&folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        if cancel.is_cancelled() {
            return Err(OperationError::Cancelled);
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || platform::is_hidden(entry.path()) {
            continue;
        }
        match entry.metadata() {
            Ok(metadata) => records.push(FileRecord::from_metadata(entry.path(), &metadata)),
            Err(e) => tracing::debug!("No metadata for {}: {}", entry.path().display(), e),
        }
    }
    tracing::debug!("Scanned {} file(s) in {}", records.len(), folder.display());
    Ok(records)
}
