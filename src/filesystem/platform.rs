use std::path::{Path, PathBuf};

/// PATH_MAX on Linux; macOS uses 1024.
#[cfg(target_os = "macos")]
pub const MAX_PATH_BYTES: usize = 1024;
#[cfg(windows)]
pub const MAX_PATH_BYTES: usize = 260;
#[cfg(not(any(target_os = "macos", windows)))]
pub const MAX_PATH_BYTES: usize = 4096;

pub const MAX_NAME_BYTES: usize = 255;

/// System folders a destination may never name, compared case-insensitively.
pub const RESERVED_FOLDER_NAMES: &[&str] = &[
    ".Trash",
    ".Trashes",
    ".Spotlight-V100",
    ".fseventsd",
    ".DocumentRevisions-V100",
    ".TemporaryItems",
    "System",
    "Library",
    "Applications",
    "$RECYCLE.BIN",
    "System Volume Information",
    "lost+found",
];

/// Per-app configuration directory
pub fn config_dir() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tidyflow")
}

/// Per-app data directory for persisted state
pub fn state_dir() -> PathBuf {
    dirs_next::data_local_dir()
        .unwrap_or_else(config_dir)
        .join("tidyflow")
}

#[cfg(unix)]
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(windows)]
pub fn is_hidden(path: &Path) -> bool {
    use std::os::windows::fs::MetadataExt;
    if let Ok(metadata) = path.metadata() {
        const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
        return metadata.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0;
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Characters the target filesystem refuses inside a single name.
///
/// Colons are refused everywhere: HFS+ presents them as slashes and Windows
/// rejects them outright.
pub fn is_invalid_name_char(ch: char) -> bool {
    if ch.is_control() {
        return true;
    }
    #[cfg(windows)]
    {
        matches!(ch, '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
    }
    #[cfg(not(windows))]
    {
        matches!(ch, '\\' | ':')
    }
}

/// Device names Windows refuses as file or folder stems.
pub fn is_windows_reserved_device_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or("");
    let upper = stem.trim().to_ascii_uppercase();
    matches!(
        upper.as_str(),
        "CON"
            | "PRN"
            | "AUX"
            | "NUL"
            | "COM1"
            | "COM2"
            | "COM3"
            | "COM4"
            | "COM5"
            | "COM6"
            | "COM7"
            | "COM8"
            | "COM9"
            | "LPT1"
            | "LPT2"
            | "LPT3"
            | "LPT4"
            | "LPT5"
            | "LPT6"
            | "LPT7"
            | "LPT8"
            | "LPT9"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_names_match_on_stem() {
        assert!(is_windows_reserved_device_name("con"));
        assert!(is_windows_reserved_device_name("LPT1.txt"));
        assert!(!is_windows_reserved_device_name("config"));
    }

    #[test]
    fn control_and_separator_chars_are_invalid() {
        assert!(is_invalid_name_char('\u{7}'));
        assert!(is_invalid_name_char('\\'));
        assert!(is_invalid_name_char(':'));
        assert!(!is_invalid_name_char('('));
        assert!(!is_invalid_name_char('['));
    }

    #[cfg(unix)]
    #[test]
    fn dot_files_are_hidden() {
        assert!(is_hidden(Path::new("/tmp/.cache")));
        assert!(!is_hidden(Path::new("/tmp/cache")));
    }
}
