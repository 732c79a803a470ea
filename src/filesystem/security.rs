use std::path::{Path, PathBuf};
use std::sync::Arc;

use path_jail::Jail;

use crate::error::ValidationError;

use super::config::OrganizerConfig;
use super::platform;

/// Destination path accepted by the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPath {
    /// The caller's relative path, trimmed but otherwise untouched
    pub relative: String,
    /// Canonical form of the root the path was checked against
    pub canonical_root: PathBuf,
    /// `canonical_root` joined with the relative segments
    pub absolute: PathBuf,
}

/// Validates relative destinations before any file operation.
///
/// Checks run in a fixed order and the first failure wins. Validation must be
/// repeated immediately before execution: roots, symlinks and mounts can change
/// between authoring a rule and applying it.
pub struct PathValidator {
    config: Arc<OrganizerConfig>,
}

impl PathValidator {
    pub fn new(config: Arc<OrganizerConfig>) -> Self {
        Self { config }
    }

    /// The fixed root destinations are relative to
    pub fn root(&self) -> &Path {
        &self.config.destination_root
    }

    /// Validate `raw` against the fixed destination root.
    pub fn validate(&self, raw: &str) -> Result<String, ValidationError> {
        self.validate_target(self.root(), raw).map(|v| v.relative)
    }

    /// Validate `raw` relative to an arbitrary `root` and resolve it.
    pub fn validate_target(
        &self,
        root: &Path,
        raw: &str,
    ) -> Result<ValidatedPath, ValidationError> {
        let relative = raw.trim();
        if relative.is_empty() {
            return Err(ValidationError::Empty);
        }

        if relative.contains('\0') {
            return Err(ValidationError::InvalidCharacters {
                segment: relative.replace('\0', "\\0"),
            });
        }

        if relative.starts_with('/') || relative.starts_with('~') || relative.starts_with('\\') {
            return Err(ValidationError::AbsolutePathRejected {
                path: relative.to_string(),
            });
        }

        if looks_absolute(relative) {
            return Err(ValidationError::AbsolutePathRejected {
                path: relative.to_string(),
            });
        }

        let total = root.as_os_str().len() + 1 + relative.len();
        if total > self.config.max_path_bytes {
            return Err(ValidationError::TooLong {
                length: total,
                limit: self.config.max_path_bytes,
            });
        }

        let segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
        if let Some(segment) = segments
            .iter()
            .find(|s| s.len() > self.config.max_segment_bytes)
        {
            return Err(ValidationError::TooLong {
                length: segment.len(),
                limit: self.config.max_segment_bytes,
            });
        }

        // Hidden folders such as ".config" are fine; only exact dot segments traverse.
        if segments.iter().any(|s| *s == "." || *s == "..") {
            return Err(ValidationError::PathTraversal {
                path: relative.to_string(),
            });
        }

        if let Some(segment) = segments
            .iter()
            .find(|s| s.chars().any(platform::is_invalid_name_char))
        {
            return Err(ValidationError::InvalidCharacters {
                segment: segment.to_string(),
            });
        }

        if let Some(segment) = segments.iter().find(|s| self.is_reserved(s)) {
            return Err(ValidationError::ReservedName {
                segment: segment.to_string(),
            });
        }

        let canonical_root = root
            .canonicalize()
            .map_err(|_| ValidationError::RootUnavailable {
                root: root.display().to_string(),
            })?;
        let absolute = segments
            .iter()
            .fold(canonical_root.clone(), |acc, s| acc.join(s));
        ensure_contained(&canonical_root, &segments)?;

        Ok(ValidatedPath {
            relative: relative.to_string(),
            canonical_root,
            absolute,
        })
    }

    fn is_reserved(&self, segment: &str) -> bool {
        platform::is_windows_reserved_device_name(segment)
            || self
                .config
                .reserved_names
                .iter()
                .any(|name| name.eq_ignore_ascii_case(segment))
    }
}

/// Obfuscated absolute paths: drive letters, URL schemes, or a full system
/// prefix with the leading slash dropped (`Users/<name>/..`, `Volumes/<disk>`,
/// `private/var|tmp|etc`). A bare `Users` or `private` folder is fine.
fn looks_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return true;
    }
    if path.contains("://") {
        return true;
    }
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match parts.as_slice() {
        ["Users", _, _, ..] | ["Volumes", _, ..] => true,
        ["private", next, ..] => matches!(*next, "var" | "tmp" | "etc"),
        _ => false,
    }
}

/// Walk the existing prefix of `segments` under `canonical_root`, resolving
/// every symlink met on the way, and require each step to stay inside.
fn ensure_contained(canonical_root: &Path, segments: &[&str]) -> Result<(), ValidationError> {
    let escape = |path: &Path| ValidationError::SymlinkEscape {
        path: path.display().to_string(),
    };

    let mut current = canonical_root.to_path_buf();
    for segment in segments {
        let next = current.join(segment);
        match std::fs::symlink_metadata(&next) {
            Ok(meta) if meta.file_type().is_symlink() => {
                // Dangling links could later be followed by create_dir_all.
                let resolved = next.canonicalize().map_err(|_| escape(&next))?;
                if !resolved.starts_with(canonical_root) {
                    return Err(escape(&next));
                }
                current = resolved;
            }
            Ok(_) => current = next,
            Err(_) => break,
        }
    }

    let jail = Jail::new(canonical_root).map_err(|_| ValidationError::RootUnavailable {
        root: canonical_root.display().to_string(),
    })?;
    if !current.starts_with(canonical_root) || jail.contains(&current).is_err() {
        return Err(escape(&current));
    }
    Ok(())
}
