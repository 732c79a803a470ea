//! Capability tokens for folder roots.
//!
//! A [`ScopedAccessToken`] proves the process may read and write one canonical
//! folder root. Tokens are created from an interactive grant, persisted through
//! a [`TransactionalStore`], looked up by canonical root, and purged when they
//! stop resolving. A stale token is never re-derived silently: the next caller
//! goes through [`ScopedAccessManager::request_access`] again.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::{AccessError, Error, PersistenceError};
use crate::store::{Persistence, TransactionalStore};

/// Outcome of resolving a serialized grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGrant {
    pub path: PathBuf,
    pub stale: bool,
}

/// Platform permission primitive (explicit grants, ACLs, sandbox tickets).
pub trait AccessProvider: Send + Sync {
    /// Ask the user to pick a folder. Returns `AccessError::Cancelled` when dismissed.
    fn prompt_for_folder(&self, expected_root_name: &str) -> Result<PathBuf, AccessError>;

    /// Produce the opaque persisted form of a grant for `canonical_root`.
    fn serialize_grant(&self, canonical_root: &Path) -> Result<Vec<u8>, AccessError>;

    fn resolve_grant(&self, blob: &[u8]) -> Result<ResolvedGrant, AccessError>;

    /// Begin using a grant. `false` means the platform refused.
    fn start_access(&self, root: &Path) -> bool;

    fn stop_access(&self, root: &Path);
}

/// Opaque, persistable proof of access to a folder root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedAccessToken {
    pub canonical_root: PathBuf,
    #[serde(with = "base64_blob")]
    blob: Vec<u8>,
    pub granted_at: DateTime<Utc>,
    #[serde(default)]
    pub stale: bool,
}

impl ScopedAccessToken {
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }
}

mod base64_blob {
    use super::BASE64;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(blob: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(blob))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Persisted grants keyed by canonical root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrantRegistry {
    pub tokens: BTreeMap<PathBuf, ScopedAccessToken>,
}

/// Keeps a begun scope alive; ending it is tied to `Drop`.
pub struct ScopeGuard {
    provider: Arc<dyn AccessProvider>,
    active: Arc<DashMap<PathBuf, usize>>,
    root: PathBuf,
}

impl ScopeGuard {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.provider.stop_access(&self.root);
        let mut emptied = false;
        if let Some(mut count) = self.active.get_mut(&self.root) {
            *count = count.saturating_sub(1);
            emptied = *count == 0;
        }
        if emptied {
            self.active.remove_if(&self.root, |_, count| *count == 0);
        }
        tracing::trace!("Ended scoped access to {}", self.root.display());
    }
}

pub struct ScopedAccessManager {
    provider: Arc<dyn AccessProvider>,
    grants: Mutex<TransactionalStore<GrantRegistry>>,
    active: Arc<DashMap<PathBuf, usize>>,
}

impl ScopedAccessManager {
    pub fn new(
        provider: Arc<dyn AccessProvider>,
        persistence: impl Persistence<GrantRegistry> + 'static,
    ) -> Result<Self, PersistenceError> {
        Ok(Self {
            provider,
            grants: Mutex::new(TransactionalStore::open(persistence)?),
            active: Arc::new(DashMap::new()),
        })
    }

    /// Prompt for a folder and bind it if its name matches `expected_root_name`.
    ///
    /// A mismatched selection is refused and nothing is persisted.
    pub fn request_access(&self, expected_root_name: &str) -> Result<ScopedAccessToken, Error> {
        self.grant(expected_root_name, None)
    }

    /// Prompt and bind; with `required_root` the selection must be exactly
    /// that folder, not just one with the same name.
    fn grant(
        &self,
        expected_root_name: &str,
        required_root: Option<&Path>,
    ) -> Result<ScopedAccessToken, Error> {
        tracing::info!("Requesting folder access for '{}'", expected_root_name);
        let selected = self.provider.prompt_for_folder(expected_root_name)?;
        let canonical = selected
            .canonicalize()
            .map_err(|_| AccessError::Denied {
                root: selected.display().to_string(),
            })?;

        let selected_name = canonical
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if !names_match(&selected_name, expected_root_name) {
            tracing::warn!(
                "Rejected grant: expected '{}' but '{}' was selected",
                expected_root_name,
                selected_name
            );
            return Err(AccessError::WrongFolderSelected {
                expected: expected_root_name.to_string(),
                selected: selected_name,
            }
            .into());
        }

        if let Some(required) = required_root {
            if canonical.as_path() != required {
                tracing::warn!(
                    "Rejected grant: expected {} but {} was selected",
                    required.display(),
                    canonical.display()
                );
                return Err(AccessError::WrongFolderSelected {
                    expected: required.display().to_string(),
                    selected: canonical.display().to_string(),
                }
                .into());
            }
        }

        let token = ScopedAccessToken {
            canonical_root: canonical.clone(),
            blob: self.provider.serialize_grant(&canonical)?,
            granted_at: Utc::now(),
            stale: false,
        };

        let stored = token.clone();
        self.with_grants(move |tx| {
            let previous = tx.state().tokens.insert(canonical.clone(), stored);
            tx.on_rollback(move |registry| match previous {
                Some(previous) => {
                    registry.tokens.insert(canonical, previous);
                }
                None => {
                    registry.tokens.remove(&canonical);
                }
            });
            Ok(())
        })?;
        tracing::info!("Granted access to {}", token.canonical_root.display());
        Ok(token)
    }

    /// Look up a live token for `canonical_root`; stale ones are purged.
    pub fn resolve(&self, canonical_root: &Path) -> Result<Option<ScopedAccessToken>, Error> {
        let token = {
            let grants = self.lock_grants()?;
            grants.state().tokens.get(canonical_root).cloned()
        };
        let Some(token) = token else {
            return Ok(None);
        };

        let live = !token.stale
            && matches!(
                self.provider.resolve_grant(&token.blob),
                Ok(ResolvedGrant { ref path, stale: false }) if path == canonical_root
            );
        if live {
            return Ok(Some(token));
        }

        tracing::warn!(
            "Access token for {} is stale, purging",
            canonical_root.display()
        );
        self.purge(canonical_root)?;
        Ok(None)
    }

    /// Resolve a token for `root`, prompting for a fresh grant when needed.
    pub fn ensure_access(&self, root: &Path) -> Result<ScopedAccessToken, Error> {
        let canonical = root.canonicalize().map_err(|_| AccessError::Denied {
            root: root.display().to_string(),
        })?;
        if let Some(token) = self.resolve(&canonical)? {
            return Ok(token);
        }

        let expected = canonical
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| canonical.display().to_string());
        self.grant(&expected, Some(&canonical))
    }

    /// Granted root that contains `path`, preferring the deepest one.
    pub fn root_containing(&self, path: &Path) -> Option<PathBuf> {
        let grants = self.grants.lock().ok()?;
        grants
            .state()
            .tokens
            .keys()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
            .cloned()
    }

    /// Roots currently held by persisted tokens.
    pub fn granted_roots(&self) -> Vec<PathBuf> {
        self.grants
            .lock()
            .map(|g| g.state().tokens.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Begin access for `token`; it ends when the returned guard drops.
    pub fn begin(&self, token: &ScopedAccessToken) -> Result<ScopeGuard, AccessError> {
        if token.stale {
            return Err(AccessError::StaleToken {
                root: token.canonical_root.display().to_string(),
            });
        }
        if !self.provider.start_access(&token.canonical_root) {
            return Err(AccessError::Denied {
                root: token.canonical_root.display().to_string(),
            });
        }
        *self
            .active
            .entry(token.canonical_root.clone())
            .or_insert(0) += 1;
        tracing::trace!("Began scoped access to {}", token.canonical_root.display());
        Ok(ScopeGuard {
            provider: self.provider.clone(),
            active: self.active.clone(),
            root: token.canonical_root.clone(),
        })
    }

    /// Run `body` inside a scope for `token`. The scope ends on every exit
    /// path, including the future being dropped.
    pub async fn with_scope<T, F, Fut>(
        &self,
        token: &ScopedAccessToken,
        body: F,
    ) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        let _guard = self.begin(token)?;
        body().await
    }

    /// Number of scopes currently open on `root`.
    pub fn active_scopes(&self, root: &Path) -> usize {
        self.active.get(root).map(|c| *c).unwrap_or(0)
    }

    fn purge(&self, canonical_root: &Path) -> Result<(), Error> {
        let root = canonical_root.to_path_buf();
        self.with_grants(move |tx| {
            if let Some(removed) = tx.state().tokens.remove(&root) {
                tx.on_rollback(move |registry| {
                    registry.tokens.insert(root, removed);
                });
            }
            Ok(())
        })
    }

    fn with_grants<T>(
        &self,
        body: impl FnOnce(&mut crate::store::Transaction<'_, GrantRegistry>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.lock_grants()?.with_transaction(body)
    }

    fn lock_grants(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, TransactionalStore<GrantRegistry>>, Error> {
        self.grants.lock().map_err(|_| {
            PersistenceError::LoadFailed {
                message: "grant registry lock poisoned".to_string(),
            }
            .into()
        })
    }
}

/// Folder-name comparison: NFC normalised, case-insensitive.
fn names_match(selected: &str, expected: &str) -> bool {
    let normalize = |s: &str| s.trim().nfc().collect::<String>().to_lowercase();
    normalize(selected) == normalize(expected)
}

/// Chooses a folder when the user is asked for one.
pub trait FolderPicker: Send + Sync {
    fn pick(&self, expected_root_name: &str) -> Option<PathBuf>;
}

/// Always answers with the same selection; `None` behaves like a dismissed dialog.
pub struct FixedPicker(pub Option<PathBuf>);

impl FolderPicker for FixedPicker {
    fn pick(&self, _expected_root_name: &str) -> Option<PathBuf> {
        self.0.clone()
    }
}

const GRANT_PREFIX: &str = "tidyflow-grant:v1:";

/// Grants backed by plain directory permissions on the local filesystem.
///
/// The persisted form records the canonical path; resolving it fails once the
/// folder disappears or its canonical location changes.
pub struct LocalFolderProvider {
    picker: Box<dyn FolderPicker>,
}

impl LocalFolderProvider {
    pub fn new(picker: impl FolderPicker + 'static) -> Self {
        Self {
            picker: Box::new(picker),
        }
    }
}

impl AccessProvider for LocalFolderProvider {
    fn prompt_for_folder(&self, expected_root_name: &str) -> Result<PathBuf, AccessError> {
        self.picker
            .pick(expected_root_name)
            .ok_or(AccessError::Cancelled)
    }

    fn serialize_grant(&self, canonical_root: &Path) -> Result<Vec<u8>, AccessError> {
        let path = canonical_root.to_str().ok_or_else(|| AccessError::Denied {
            root: canonical_root.display().to_string(),
        })?;
        if !canonical_root.is_dir() {
            return Err(AccessError::Denied {
                root: path.to_string(),
            });
        }
        Ok(format!("{}{}", GRANT_PREFIX, path).into_bytes())
    }

    fn resolve_grant(&self, blob: &[u8]) -> Result<ResolvedGrant, AccessError> {
        let text = std::str::from_utf8(blob).map_err(|_| AccessError::StaleToken {
            root: "<unreadable grant>".to_string(),
        })?;
        let recorded = text
            .strip_prefix(GRANT_PREFIX)
            .map(PathBuf::from)
            .ok_or_else(|| AccessError::StaleToken {
                root: text.to_string(),
            })?;
        match recorded.canonicalize() {
            Ok(path) if path.is_dir() => Ok(ResolvedGrant {
                stale: path != recorded,
                path,
            }),
            _ => Ok(ResolvedGrant {
                path: recorded,
                stale: true,
            }),
        }
    }

    fn start_access(&self, root: &Path) -> bool {
        root.is_dir()
    }

    fn stop_access(&self, _root: &Path) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SharedMemoryPersistence;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPicker {
        selection: Option<PathBuf>,
        prompts: Arc<AtomicUsize>,
    }

    impl FolderPicker for CountingPicker {
        fn pick(&self, _expected: &str) -> Option<PathBuf> {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            self.selection.clone()
        }
    }

    fn manager_with(
        selection: Option<PathBuf>,
    ) -> (
        ScopedAccessManager,
        SharedMemoryPersistence<GrantRegistry>,
        Arc<AtomicUsize>,
    ) {
        let prompts = Arc::new(AtomicUsize::new(0));
        let provider = LocalFolderProvider::new(CountingPicker {
            selection,
            prompts: prompts.clone(),
        });
        let persistence = SharedMemoryPersistence::new();
        let manager = ScopedAccessManager::new(Arc::new(provider), persistence.clone()).unwrap();
        (manager, persistence, prompts)
    }

    #[test]
    fn wrong_folder_is_rejected_and_not_persisted() {
        let temp = tempfile::TempDir::new().unwrap();
        let downloads = temp.path().join("Downloads");
        std::fs::create_dir_all(&downloads).unwrap();

        let (manager, persistence, _) = manager_with(Some(downloads));
        let err = manager.request_access("Documents").unwrap_err();
        assert!(matches!(
            err,
            Error::Access(AccessError::WrongFolderSelected { .. })
        ));
        assert!(manager.granted_roots().is_empty());
        assert_eq!(persistence.save_count(), 0);
    }

    #[test]
    fn same_name_in_another_place_is_not_persisted() {
        let temp = tempfile::TempDir::new().unwrap();
        let wanted = temp.path().join("a").join("Documents");
        let picked = temp.path().join("b").join("Documents");
        std::fs::create_dir_all(&wanted).unwrap();
        std::fs::create_dir_all(&picked).unwrap();

        let (manager, persistence, prompts) = manager_with(Some(picked));
        let err = manager.ensure_access(&wanted).unwrap_err();
        assert!(matches!(
            err,
            Error::Access(AccessError::WrongFolderSelected { .. })
        ));
        assert_eq!(prompts.load(Ordering::SeqCst), 1);
        assert!(manager.granted_roots().is_empty());
        assert_eq!(persistence.save_count(), 0);
        assert!(persistence.snapshot().is_none());
    }

    #[test]
    fn matching_folder_is_granted_and_resolvable() {
        let temp = tempfile::TempDir::new().unwrap();
        let documents = temp.path().join("Documents");
        std::fs::create_dir_all(&documents).unwrap();

        let (manager, persistence, _) = manager_with(Some(documents.clone()));
        let token = manager.request_access("documents").unwrap();
        let canonical = documents.canonicalize().unwrap();
        assert_eq!(token.canonical_root, canonical);
        assert!(manager.resolve(&canonical).unwrap().is_some());
        assert_eq!(persistence.snapshot().unwrap().tokens.len(), 1);
    }

    #[test]
    fn cancelled_prompt_is_distinct() {
        let (manager, _, _) = manager_with(None);
        assert_eq!(
            manager.request_access("Documents").unwrap_err(),
            Error::Access(AccessError::Cancelled)
        );
    }

    #[test]
    fn stale_token_is_purged_and_requires_fresh_grant() {
        let temp = tempfile::TempDir::new().unwrap();
        let documents = temp.path().join("Documents");
        std::fs::create_dir_all(&documents).unwrap();

        let (manager, _, prompts) = manager_with(Some(documents.clone()));
        let canonical = documents.canonicalize().unwrap();
        manager.ensure_access(&documents).unwrap();
        assert_eq!(prompts.load(Ordering::SeqCst), 1);

        // Reused without prompting again.
        manager.ensure_access(&documents).unwrap();
        assert_eq!(prompts.load(Ordering::SeqCst), 1);

        std::fs::remove_dir_all(&documents).unwrap();
        assert!(manager.resolve(&canonical).unwrap().is_none());
        assert!(manager.granted_roots().is_empty());
    }

    #[test]
    fn failed_save_leaves_registry_empty() {
        let temp = tempfile::TempDir::new().unwrap();
        let documents = temp.path().join("Documents");
        std::fs::create_dir_all(&documents).unwrap();

        let (manager, persistence, _) = manager_with(Some(documents));
        persistence.fail_saves(true);
        assert!(matches!(
            manager.request_access("Documents"),
            Err(Error::Persistence(_))
        ));
        assert!(manager.granted_roots().is_empty());
    }

    #[tokio::test]
    async fn scope_ends_on_error_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let documents = temp.path().join("Documents");
        std::fs::create_dir_all(&documents).unwrap();

        let (manager, _, _) = manager_with(Some(documents.clone()));
        let token = manager.request_access("Documents").unwrap();
        let root = token.canonical_root.clone();

        let result: Result<(), Error> = manager
            .with_scope(&token, || async {
                assert_eq!(manager.active_scopes(&root), 1);
                Err(crate::error::OperationError::Cancelled.into())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(manager.active_scopes(&root), 0);
    }

    #[test]
    fn deepest_granted_root_wins() {
        let temp = tempfile::TempDir::new().unwrap();
        let outer = temp.path().join("Documents");
        let inner = outer.join("Work");
        std::fs::create_dir_all(&inner).unwrap();

        let (manager, _, _) = manager_with(Some(outer.clone()));
        manager.request_access("Documents").unwrap();
        let outer = outer.canonicalize().unwrap();
        let file = outer.join("Work").join("a.txt");
        assert_eq!(manager.root_containing(&file), Some(outer));
    }

    #[test]
    fn token_blob_serializes_as_base64() {
        let token = ScopedAccessToken {
            canonical_root: "/tmp/x".into(),
            blob: b"abc".to_vec(),
            granted_at: Utc::now(),
            stale: false,
        };
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["blob"], "YWJj");
        let back: ScopedAccessToken = serde_json::from_value(json).unwrap();
        assert_eq!(back.blob(), b"abc");
    }
}
