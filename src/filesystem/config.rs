use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::platform;

/// Configuration for the organizer core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizerConfig {
    /// Fixed root every rule destination is relative to
    pub destination_root: PathBuf,

    /// Directory holding workspace and grant state
    pub state_dir: PathBuf,

    /// Maximum total destination length (bytes)
    pub max_path_bytes: usize,

    /// Maximum length of a single path segment (bytes)
    pub max_segment_bytes: usize,

    /// Folder names that may never appear in a destination (case-insensitive)
    pub reserved_names: Vec<String>,

    /// Minimum confidence for a prediction to be accepted
    pub confidence_threshold: f64,

    /// Undo/redo stack capacity
    pub history_capacity: usize,

    /// Parallel workers for batch organize across independent roots
    pub batch_workers: usize,

    /// Folder (relative to the destination root) deleted files are staged in
    pub trash_dir: String,
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        let home = dirs_next::home_dir()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            destination_root: home,
            state_dir: platform::state_dir(),
            max_path_bytes: platform::MAX_PATH_BYTES,
            max_segment_bytes: platform::MAX_NAME_BYTES,
            reserved_names: platform::RESERVED_FOLDER_NAMES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            confidence_threshold: 0.7,
            history_capacity: 20,
            batch_workers: 3,
            trash_dir: ".tidyflow-trash".to_string(),
        }
    }
}

impl OrganizerConfig {
    /// Config rooted at `destination_root`, with state kept under `state_dir`.
    pub fn for_root(destination_root: impl Into<PathBuf>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            destination_root: destination_root.into(),
            state_dir: state_dir.into(),
            ..Default::default()
        }
    }

    /// Load `config.json` from `path`, falling back to defaults when absent.
    pub fn load(path: &Path) -> Result<Self, crate::error::PersistenceError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|e| {
            crate::error::PersistenceError::LoadFailed {
                message: format!("{}: {}", path.display(), e),
            }
        })?;
        serde_json::from_str(&data).map_err(|e| crate::error::PersistenceError::LoadFailed {
            message: format!("{}: {}", path.display(), e),
        })
    }

    pub fn default_path() -> PathBuf {
        platform::config_dir().join("config.json")
    }

    pub fn workers(&self) -> usize {
        self.batch_workers.clamp(1, 4)
    }

    pub fn workspace_file(&self) -> PathBuf {
        self.state_dir.join("workspace.json")
    }

    pub fn grants_file(&self) -> PathBuf {
        self.state_dir.join("grants.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = OrganizerConfig::load(&temp.path().join("nope.json")).unwrap();
        assert_eq!(config.history_capacity, 20);
        assert!((config.confidence_threshold - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"history_capacity": 5, "batch_workers": 12}"#).unwrap();
        let config = OrganizerConfig::load(&path).unwrap();
        assert_eq!(config.history_capacity, 5);
        assert_eq!(config.workers(), 4);
        assert_eq!(config.trash_dir, ".tidyflow-trash");
    }

    #[test]
    fn malformed_file_is_a_load_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(OrganizerConfig::load(&path).is_err());
    }
}
