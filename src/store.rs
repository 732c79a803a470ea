//! Rollback-safe persistence for in-memory state.
//!
//! State held by a [`TransactionalStore`] can only change inside
//! [`TransactionalStore::with_transaction`]. The body registers compensating
//! closures with [`Transaction::on_rollback`] before each mutation; when the
//! subsequent save fails they run newest-first so memory matches the last
//! durable snapshot again.

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, PersistenceError};

pub trait Persistence<S>: Send + Sync {
    fn save(&self, state: &S) -> Result<(), PersistenceError>;
    fn load(&self) -> Result<Option<S>, PersistenceError>;
}

type Rollback<'a, S> = Box<dyn FnOnce(&mut S) + Send + 'a>;

pub struct Transaction<'a, S> {
    state: &'a mut S,
    rollbacks: Vec<Rollback<'a, S>>,
}

impl<'a, S> Transaction<'a, S> {
    pub fn state(&mut self) -> &mut S {
        &mut *self.state
    }

    pub fn on_rollback(&mut self, undo: impl FnOnce(&mut S) + Send + 'a) {
        self.rollbacks.push(Box::new(undo));
    }

    fn rollback(self) -> usize {
        let Transaction { state, rollbacks } = self;
        let count = rollbacks.len();
        for undo in rollbacks.into_iter().rev() {
            undo(&mut *state);
        }
        count
    }
}

pub struct TransactionalStore<S> {
    state: S,
    persistence: Box<dyn Persistence<S>>,
}

impl<S: Default> TransactionalStore<S> {
    /// Load the last saved snapshot, or start from `S::default()`.
    pub fn open(persistence: impl Persistence<S> + 'static) -> Result<Self, PersistenceError> {
        let state = persistence.load()?.unwrap_or_default();
        Ok(Self {
            state,
            persistence: Box::new(persistence),
        })
    }
}

impl<S> TransactionalStore<S> {
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Run `body`, then persist. Errors from either side undo the registered
    /// rollbacks; the original error is returned.
    pub fn with_transaction<T>(
        &mut self,
        body: impl FnOnce(&mut Transaction<'_, S>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut tx = Transaction {
            state: &mut self.state,
            rollbacks: Vec::new(),
        };

        let value = match body(&mut tx) {
            Ok(value) => value,
            Err(e) => {
                let undone = tx.rollback();
                tracing::debug!("Transaction body failed, rolled back {} step(s): {}", undone, e);
                return Err(e);
            }
        };

        if let Err(e) = self.persistence.save(&*tx.state) {
            let undone = tx.rollback();
            tracing::warn!("Persisting state failed, rolled back {} step(s): {}", undone, e);
            return Err(e.into());
        }
        Ok(value)
    }
}

/// JSON snapshot on disk, replaced atomically through a temp sibling.
pub struct JsonFilePersistence<S> {
    path: PathBuf,
    _marker: PhantomData<fn() -> S>,
}

impl<S> JsonFilePersistence<S> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<S: Serialize + DeserializeOwned> Persistence<S> for JsonFilePersistence<S> {
    fn save(&self, state: &S) -> Result<(), PersistenceError> {
        let failed = |e: &dyn std::fmt::Display| PersistenceError::SaveFailed {
            message: format!("{}: {}", self.path.display(), e),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| failed(&e))?;
        }
        let data = serde_json::to_vec_pretty(state).map_err(|e| failed(&e))?;

        let temp_path = sibling_with_suffix(&self.path, &format!("tmp-{}", uuid::Uuid::new_v4()));
        fs::write(&temp_path, &data).map_err(|e| failed(&e))?;
        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(failed(&e));
        }
        Ok(())
    }

    fn load(&self) -> Result<Option<S>, PersistenceError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path).map_err(|e| PersistenceError::LoadFailed {
            message: format!("{}: {}", self.path.display(), e),
        })?;
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| PersistenceError::LoadFailed {
                message: format!("{}: {}", self.path.display(), e),
            })
    }
}

/// Keeps the latest snapshot in memory. Saves can be made to fail on demand.
pub struct MemoryPersistence<S> {
    snapshot: Mutex<Option<S>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl<S> Default for MemoryPersistence<S> {
    fn default() -> Self {
        Self {
            snapshot: Mutex::new(None),
            fail_saves: AtomicBool::new(false),
            saves: AtomicUsize::new(0),
        }
    }
}

impl<S> MemoryPersistence<S> {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Shared handle so a test can flip failures after handing persistence to a store.
#[derive(Clone)]
pub struct SharedMemoryPersistence<S>(std::sync::Arc<MemoryPersistence<S>>);

impl<S> Default for SharedMemoryPersistence<S> {
    fn default() -> Self {
        Self(std::sync::Arc::new(MemoryPersistence::default()))
    }
}

impl<S> SharedMemoryPersistence<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.0.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.0.saves.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Option<S>
    where
        S: Clone,
    {
        self.0.snapshot.lock().ok().and_then(|s| s.clone())
    }
}

impl<S: Clone + Send> Persistence<S> for MemoryPersistence<S> {
    fn save(&self, state: &S) -> Result<(), PersistenceError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PersistenceError::SaveFailed {
                message: "in-memory store is failing saves".to_string(),
            });
        }
        let mut snapshot = self.snapshot.lock().map_err(|_| PersistenceError::SaveFailed {
            message: "snapshot lock poisoned".to_string(),
        })?;
        *snapshot = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self) -> Result<Option<S>, PersistenceError> {
        let snapshot = self.snapshot.lock().map_err(|_| PersistenceError::LoadFailed {
            message: "snapshot lock poisoned".to_string(),
        })?;
        Ok(snapshot.clone())
    }
}

impl<S: Clone + Send> Persistence<S> for SharedMemoryPersistence<S> {
    fn save(&self, state: &S) -> Result<(), PersistenceError> {
        self.0.save(state)
    }

    fn load(&self) -> Result<Option<S>, PersistenceError> {
        self.0.load()
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut file_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| std::ffi::OsString::from("state"));
    file_name.push(".");
    file_name.push(suffix);
    path.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Counter {
        value: i32,
        trail: Vec<&'static str>,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Items {
        items: Vec<String>,
    }

    #[test]
    fn commits_when_save_succeeds() {
        let persistence = SharedMemoryPersistence::<Counter>::new();
        let mut store = TransactionalStore::open(persistence.clone()).unwrap();
        store
            .with_transaction(|tx| {
                tx.on_rollback(|s| s.value -= 1);
                tx.state().value += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(store.state().value, 1);
        assert_eq!(persistence.snapshot().unwrap().value, 1);
    }

    #[test]
    fn rolls_back_in_reverse_order_on_save_failure() {
        let persistence = SharedMemoryPersistence::<Counter>::new();
        let mut store = TransactionalStore::open(persistence.clone()).unwrap();
        persistence.fail_saves(true);

        let result = store.with_transaction(|tx| {
            tx.on_rollback(|s| s.trail.push("first"));
            tx.state().value = 10;
            tx.on_rollback(|s| s.trail.push("second"));
            tx.state().value = 20;
            Ok(())
        });

        assert!(matches!(
            result,
            Err(Error::Persistence(PersistenceError::SaveFailed { .. }))
        ));
        assert_eq!(store.state().trail, vec!["second", "first"]);
        assert!(persistence.snapshot().is_none());
    }

    #[test]
    fn restores_state_to_last_snapshot() {
        let persistence = SharedMemoryPersistence::<Items>::new();
        let mut store = TransactionalStore::open(persistence.clone()).unwrap();
        store
            .with_transaction(|tx| {
                tx.state().items.push("kept".into());
                tx.on_rollback(|s| {
                    s.items.pop();
                });
                Ok(())
            })
            .unwrap();

        persistence.fail_saves(true);
        let _ = store.with_transaction(|tx| {
            tx.state().items.push("lost".into());
            tx.on_rollback(|s| {
                s.items.pop();
            });
            Ok(())
        });

        assert_eq!(store.state(), &persistence.snapshot().unwrap());
    }

    #[test]
    fn body_error_rolls_back_without_saving() {
        let persistence = SharedMemoryPersistence::<Counter>::new();
        let mut store = TransactionalStore::open(persistence.clone()).unwrap();
        let result: Result<(), Error> = store.with_transaction(|tx| {
            let previous = tx.state().value;
            tx.on_rollback(move |s| s.value = previous);
            tx.state().value = 99;
            Err(crate::error::OperationError::NothingToUndo.into())
        });
        assert!(result.is_err());
        assert_eq!(store.state().value, 0);
        assert_eq!(persistence.save_count(), 0);
    }

    #[test]
    fn json_file_round_trips_across_opens() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("nested").join("state.json");
        {
            let mut store =
                TransactionalStore::<Items>::open(JsonFilePersistence::new(&path)).unwrap();
            store
                .with_transaction(|tx| {
                    tx.state().items.push("a".into());
                    Ok(())
                })
                .unwrap();
        }
        let store = TransactionalStore::<Items>::open(JsonFilePersistence::new(&path)).unwrap();
        assert_eq!(store.state().items, vec!["a".to_string()]);

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn corrupt_json_is_a_load_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        std::fs::write(&path, b"{oops").unwrap();
        assert!(TransactionalStore::<Items>::open(JsonFilePersistence::new(&path)).is_err());
    }
}
