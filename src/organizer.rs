//! The organizing session: discovered files, rules and history in one
//! durable workspace, plus the operations that move files between states.
//!
//! Every change to the workspace goes through a store transaction with
//! compensating rollbacks. Filesystem work happens before the transaction; if
//! the save then fails the file stays where the operation put it and the
//! workspace keeps describing the previous state.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use dashmap::{DashMap, DashSet};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedMutexGuard, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, OperationError, PersistenceError, RuleError};
use crate::filesystem::access::AccessProvider;
use crate::filesystem::config::OrganizerConfig;
use crate::filesystem::operations::{ActionOrigin, FileOperations};
use crate::filesystem::{scan, FileSystemService};
use crate::history::ActionLog;
use crate::model::{ActionRecord, ActionType, FileRecord, FileStatus, Suggestion, SuggestionSource};
use crate::prediction::{PredictionGate, Predictor};
use crate::rules::{Rule, RuleDraft, RuleEngine, RuleMatch};
use crate::store::{JsonFilePersistence, Persistence, Transaction, TransactionalStore};

/// Everything the organizer persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub files: BTreeMap<Uuid, FileRecord>,
    pub rules: Vec<Rule>,
    pub log: ActionLog,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassifyReport {
    pub suggested: usize,
    pub invalidated: usize,
    pub unmatched: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct History {
    /// Newest first
    pub undo: Vec<ActionRecord>,
    pub redo: Vec<ActionRecord>,
}

pub type BatchOutcome = Vec<(Uuid, Result<ActionRecord, Error>)>;

pub struct Organizer {
    config: Arc<OrganizerConfig>,
    ops: FileOperations,
    engine: RuleEngine,
    predictions: Arc<PredictionGate>,
    workspace: Mutex<TransactionalStore<Workspace>>,
    root_locks: DashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>,
    in_flight: Arc<DashSet<Uuid>>,
    workers: Arc<Semaphore>,
    current_scan: Mutex<Option<CancellationToken>>,
}

/// Exclusive hold on one file record, released on drop.
struct Claim {
    in_flight: Arc<DashSet<Uuid>>,
    id: Uuid,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}

impl Organizer {
    /// Open the organizer with workspace and grants stored as JSON under
    /// `config.state_dir`.
    pub fn open(
        config: OrganizerConfig,
        provider: Arc<dyn AccessProvider>,
        predictor: Arc<dyn Predictor>,
    ) -> Result<Self, Error> {
        let config = Arc::new(config);
        let workspace = JsonFilePersistence::new(config.workspace_file());
        let fs = FileSystemService::open(config, provider)?;
        Self::new(fs, predictor, workspace)
    }

    pub fn new(
        fs: FileSystemService,
        predictor: Arc<dyn Predictor>,
        persistence: impl Persistence<Workspace> + 'static,
    ) -> Result<Self, Error> {
        let config = Arc::new(fs.config().clone());
        let engine = RuleEngine::new(fs.validator().clone());
        let predictions = Arc::new(PredictionGate::new(
            predictor,
            fs.validator().clone(),
            config.confidence_threshold,
        ));

        let mut store = TransactionalStore::open(persistence)?;
        let capacity = config.history_capacity.max(1);
        if store.state().log.capacity() != capacity {
            store.with_transaction(|tx| {
                let previous = tx.state().log.clone();
                tx.on_rollback(move |ws| ws.log = previous);
                tx.state().log.set_capacity(capacity);
                Ok(())
            })?;
        }

        Ok(Self {
            workers: Arc::new(Semaphore::new(config.workers())),
            config,
            ops: fs.ops().clone(),
            engine,
            predictions,
            workspace: Mutex::new(store),
            root_locks: DashMap::new(),
            in_flight: Arc::new(DashSet::new()),
            current_scan: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &OrganizerConfig {
        &self.config
    }

    pub fn operations(&self) -> &FileOperations {
        &self.ops
    }

    pub fn snapshot(&self) -> Result<Workspace, Error> {
        self.read(Workspace::clone)
    }

    pub fn files(&self) -> Result<Vec<FileRecord>, Error> {
        self.read(|ws| ws.files.values().cloned().collect())
    }

    pub fn file(&self, id: Uuid) -> Result<Option<FileRecord>, Error> {
        self.read(|ws| ws.files.get(&id).cloned())
    }

    pub fn rules(&self) -> Result<Vec<Rule>, Error> {
        self.read(|ws| ws.rules.clone())
    }

    pub fn history(&self) -> Result<History, Error> {
        self.read(|ws| History {
            undo: ws.log.undo_entries().cloned().collect(),
            redo: ws.log.redo_entries().cloned().collect(),
        })
    }

    /// Track files not seen before. Paths already in the workspace are skipped.
    pub fn add_files(&self, records: Vec<FileRecord>) -> Result<usize, Error> {
        self.transact(move |tx| {
            let mut known: BTreeSet<PathBuf> =
                tx.state().files.values().map(|f| f.path.clone()).collect();
            let fresh: Vec<FileRecord> = records
                .into_iter()
                .filter(|r| known.insert(r.path.clone()))
                .collect();

            let ids: Vec<Uuid> = fresh.iter().map(|r| r.id).collect();
            tx.on_rollback(move |ws| {
                for id in &ids {
                    ws.files.remove(id);
                }
            });
            let count = fresh.len();
            for record in fresh {
                tx.state().files.insert(record.id, record);
            }
            Ok(count)
        })
    }

    /// Scan `folder` off the runtime and track what it holds. Starting a
    /// scan cancels any scan or classification still running.
    pub async fn ingest_folder(&self, folder: &Path) -> Result<usize, Error> {
        let folder = folder.to_path_buf();
        let cancel = self.begin_scan();
        let token = cancel.clone();
        let records = tokio::task::spawn_blocking(move || scan::scan_folder(&folder, &token))
            .await
            .map_err(join_error)??;
        if cancel.is_cancelled() {
            tracing::info!("Scan cancelled");
            return Err(OperationError::Cancelled.into());
        }
        let added = self.add_files(records)?;
        tracing::info!("Tracking {} new file(s)", added);
        Ok(added)
    }

    pub fn add_rule(&self, draft: RuleDraft) -> Result<Rule, Error> {
        let rule = self.engine.author(draft)?;
        let stored = rule.clone();
        self.transact(move |tx| {
            let id = stored.id;
            tx.on_rollback(move |ws| ws.rules.retain(|r| r.id != id));
            tx.state().rules.push(stored);
            Ok(())
        })?;
        tracing::info!("Added rule '{}' ({})", rule.name, rule.id);
        Ok(rule)
    }

    pub fn remove_rule(&self, id: Uuid) -> Result<Rule, Error> {
        let removed = self.transact(move |tx| {
            let index = tx
                .state()
                .rules
                .iter()
                .position(|r| r.id == id)
                .ok_or_else(|| RuleError::UnknownRule { id: id.to_string() })?;
            let removed = tx.state().rules.remove(index);
            let restored = removed.clone();
            tx.on_rollback(move |ws| {
                let index = index.min(ws.rules.len());
                ws.rules.insert(index, restored);
            });
            Ok(removed)
        })?;
        tracing::info!("Removed rule '{}'", removed.name);
        Ok(removed)
    }

    /// Suggest destinations for pending files.
    pub async fn classify(&self) -> Result<ClassifyReport, Error> {
        self.run_classification(false).await
    }

    /// Re-evaluate pending and ready files; ready files whose suggestion no
    /// longer holds drop back to pending.
    pub async fn reclassify(&self) -> Result<ClassifyReport, Error> {
        self.run_classification(true).await
    }

    /// Cancel the running scan or classification, if any.
    pub fn cancel_classification(&self) {
        if let Ok(mut current) = self.current_scan.lock() {
            if let Some(token) = current.take() {
                token.cancel();
            }
        }
    }

    fn begin_scan(&self) -> CancellationToken {
        let cancel = CancellationToken::new();
        if let Ok(mut current) = self.current_scan.lock() {
            if let Some(previous) = current.replace(cancel.clone()) {
                tracing::debug!("Cancelling previous scan");
                previous.cancel();
            }
        }
        cancel
    }

    async fn run_classification(&self, include_ready: bool) -> Result<ClassifyReport, Error> {
        let cancel = self.begin_scan();

        let (candidates, rules) = self.read(|ws| {
            let files: Vec<FileRecord> = ws
                .files
                .values()
                .filter(|f| match f.status() {
                    FileStatus::Pending => true,
                    FileStatus::Ready => include_ready,
                    _ => false,
                })
                .cloned()
                .collect();
            (files, ws.rules.clone())
        })?;

        let engine = self.engine.clone();
        let gate = self.predictions.clone();
        let token = cancel.clone();
        let now = Utc::now();
        let evaluated = tokio::task::spawn_blocking(move || {
            candidates
                .par_iter()
                .map(|file| {
                    if token.is_cancelled() {
                        return None;
                    }
                    let suggestion = engine
                        .evaluate_at(file, &rules, now)
                        .map(RuleMatch::into_suggestion)
                        .or_else(|| gate.suggest(file));
                    Some((file.id, file.status(), suggestion))
                })
                .collect::<Option<Vec<_>>>()
        })
        .await
        .map_err(join_error)?;

        let evaluated = match evaluated {
            Some(evaluated) if !cancel.is_cancelled() => evaluated,
            _ => {
                tracing::info!("Classification cancelled");
                return Err(OperationError::Cancelled.into());
            }
        };

        let in_flight = self.in_flight.clone();
        let report = self.transact(move |tx| {
            let mut report = ClassifyReport::default();
            for (id, seen, suggestion) in evaluated {
                if in_flight.contains(&id) {
                    continue;
                }
                let Some(current) = tx.state().files.get(&id).cloned() else {
                    continue;
                };
                if current.status() != seen {
                    continue;
                }

                let unchanged = matches!(
                    (current.suggestion(), &suggestion),
                    (Some(old), Some(new)) if same_target(old, new)
                );
                if unchanged {
                    continue;
                }
                if current.status() == FileStatus::Pending && suggestion.is_none() {
                    report.unmatched += 1;
                    continue;
                }

                let mut updated = current.clone();
                if updated.status() == FileStatus::Ready {
                    updated.set_status(FileStatus::Pending)?;
                    report.invalidated += 1;
                }
                match suggestion {
                    Some(suggestion) => {
                        updated.apply_suggestion(suggestion)?;
                        report.suggested += 1;
                    }
                    None => report.unmatched += 1,
                }
                tx.on_rollback(move |ws| {
                    ws.files.insert(id, current);
                });
                tx.state().files.insert(id, updated);
            }
            Ok(report)
        })?;

        tracing::info!(
            "Classified: {} suggested, {} invalidated, {} unmatched",
            report.suggested,
            report.invalidated,
            report.unmatched
        );
        Ok(report)
    }

    /// Execute the suggestion attached to a ready file.
    pub async fn organize(
        &self,
        file_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<ActionRecord, Error> {
        let _claim = self.claim(file_id)?;
        let file = self
            .read(|ws| ws.files.get(&file_id).cloned())?
            .ok_or_else(|| unknown_file(file_id))?;
        if file.status() != FileStatus::Ready {
            return Err(OperationError::InvalidTransition {
                from: file.status(),
                to: FileStatus::Completed,
            }
            .into());
        }
        let suggestion = file
            .suggestion()
            .cloned()
            .ok_or(OperationError::NoSuggestion)?;

        let roots = [self.source_root_of(&file.path), self.destination_root().await];
        let _roots = self.lock_roots(roots).await;
        let record = self
            .ops
            .execute(
                &file,
                suggestion.action,
                &suggestion.destination,
                origin_of(&suggestion),
                cancel,
            )
            .await?;

        let logged = record.clone();
        self.transact(move |tx| {
            let prior = tx
                .state()
                .files
                .get(&file_id)
                .cloned()
                .ok_or_else(|| unknown_file(file_id))?;
            let mut updated = prior.clone();
            updated.set_status(FileStatus::Completed)?;
            if logged.action_type != ActionType::Copy {
                updated.relocate(logged.destination_path.clone());
            }
            tx.on_rollback(move |ws| {
                ws.files.insert(file_id, prior);
            });
            tx.state().files.insert(file_id, updated);

            let logged_id = logged.id;
            let displaced = tx.state().log.record(logged);
            tx.on_rollback(move |ws| ws.log.unrecord(logged_id, displaced));
            Ok(())
        })
        .map_err(|e| {
            tracing::warn!(
                "{} is at {} but the action could not be recorded: {}",
                file.name,
                record.destination_path.display(),
                e
            );
            e
        })?;
        Ok(record)
    }

    /// Organize `file_ids` with bounded parallelism. Files sharing a root
    /// are handled one at a time.
    pub async fn organize_batch(
        self: &Arc<Self>,
        file_ids: Vec<Uuid>,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        tracing::info!(
            "Organizing {} file(s) with {} worker(s)",
            file_ids.len(),
            self.config.workers()
        );

        let mut tasks = JoinSet::new();
        for (index, file_id) in file_ids.iter().copied().enumerate() {
            let organizer = Arc::clone(self);
            let workers = self.workers.clone();
            let cancel = cancel.child_token();
            tasks.spawn(async move {
                let result = match workers.acquire_owned().await {
                    Ok(_permit) if !cancel.is_cancelled() => {
                        organizer.organize(file_id, &cancel).await
                    }
                    _ => Err(OperationError::Cancelled.into()),
                };
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<ActionRecord, Error>>> =
            file_ids.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => tracing::warn!("Organize task failed: {}", e),
            }
        }

        let outcome: BatchOutcome = file_ids
            .into_iter()
            .zip(results)
            .map(|(id, result)| {
                let result = result.unwrap_or_else(|| {
                    Err(OperationError::Io {
                        message: "organize task did not finish".to_string(),
                    }
                    .into())
                });
                (id, result)
            })
            .collect();
        let done = outcome.iter().filter(|(_, r)| r.is_ok()).count();
        tracing::info!("Batch finished: {} of {} organized", done, outcome.len());
        outcome
    }

    /// Organize every ready file.
    pub async fn organize_ready(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome, Error> {
        let ready = self.read(|ws| {
            ws.files
                .values()
                .filter(|f| f.status() == FileStatus::Ready)
                .map(|f| f.id)
                .collect::<Vec<_>>()
        })?;
        Ok(self.organize_batch(ready, cancel).await)
    }

    /// Reverse the most recent action.
    pub async fn undo(&self, cancel: &CancellationToken) -> Result<ActionRecord, Error> {
        let record = self
            .read(|ws| ws.log.peek_undo().cloned())?
            .ok_or(OperationError::NothingToUndo)?;
        let _claim = record.file_id.map(|id| self.claim(id)).transpose()?;
        self.expect_status(record.file_id, &[FileStatus::Completed])?;

        let roots = [record.source_root.clone(), record.destination_root.clone()];
        let _roots = self.lock_roots(roots).await;
        let reversed = self.ops.reverse(&record, cancel).await?;

        let undone = record.clone();
        let redo_entry = reversed.clone();
        self.transact(move |tx| {
            if tx.state().log.peek_undo().map(|r| r.id) != Some(undone.id) {
                return Err(mismatch("history changed while undoing"));
            }
            if let Some(file_id) = undone.file_id {
                if let Some(prior) = tx.state().files.get(&file_id).cloned() {
                    let mut updated = prior.clone();
                    updated.set_status(FileStatus::Pending)?;
                    if undone.action_type != ActionType::Copy {
                        updated.relocate(undone.source_path.clone());
                    }
                    tx.on_rollback(move |ws| {
                        ws.files.insert(file_id, prior);
                    });
                    tx.state().files.insert(file_id, updated);
                }
            }

            let popped = tx.state().log.pop_undo();
            tx.on_rollback(move |ws| {
                if let Some(popped) = popped {
                    ws.log.push_undo(popped);
                }
            });
            let redo_id = redo_entry.id;
            let dropped = tx.state().log.push_redo(redo_entry);
            tx.on_rollback(move |ws| ws.log.retract_redo(redo_id, dropped));
            Ok(())
        })
        .map_err(|e| {
            tracing::warn!("Undo of {} applied on disk but not recorded: {}", record.id, e);
            e
        })?;

        tracing::info!(
            "Undid {} of {}",
            record.action_type,
            record.destination_path.display()
        );
        Ok(reversed)
    }

    /// Re-apply the most recently undone action. A suggestion classified onto
    /// the file since the undo is replaced by the redone one.
    pub async fn redo(&self, cancel: &CancellationToken) -> Result<ActionRecord, Error> {
        let entry = self
            .read(|ws| ws.log.peek_redo().cloned())?
            .ok_or(OperationError::NothingToRedo)?;
        let _claim = entry.file_id.map(|id| self.claim(id)).transpose()?;
        self.expect_status(entry.file_id, &[FileStatus::Pending, FileStatus::Ready])?;

        let forward = entry.reversed();
        let roots = [forward.source_root.clone(), forward.destination_root.clone()];
        let _roots = self.lock_roots(roots).await;
        let redone = self.ops.replay(&forward, cancel).await?;

        let entry_id = entry.id;
        let logged = redone.clone();
        self.transact(move |tx| {
            if tx.state().log.peek_redo().map(|r| r.id) != Some(entry_id) {
                return Err(mismatch("history changed while redoing"));
            }
            if let Some(file_id) = logged.file_id {
                if let Some(prior) = tx.state().files.get(&file_id).cloned() {
                    let mut updated = prior.clone();
                    if updated.status() == FileStatus::Ready {
                        updated.set_status(FileStatus::Pending)?;
                    }
                    updated.apply_suggestion(redo_suggestion(&logged))?;
                    updated.set_status(FileStatus::Completed)?;
                    if logged.action_type != ActionType::Copy {
                        updated.relocate(logged.destination_path.clone());
                    }
                    tx.on_rollback(move |ws| {
                        ws.files.insert(file_id, prior);
                    });
                    tx.state().files.insert(file_id, updated);
                }
            }

            let popped = tx.state().log.pop_redo();
            tx.on_rollback(move |ws| {
                if let Some(popped) = popped {
                    ws.log.push_redo(popped);
                }
            });
            let logged_id = logged.id;
            let dropped = tx.state().log.push_undo(logged);
            tx.on_rollback(move |ws| ws.log.retract_undo(logged_id, dropped));
            Ok(())
        })
        .map_err(|e| {
            tracing::warn!("Redo applied on disk but not recorded: {}", e);
            e
        })?;

        tracing::info!(
            "Redid {} to {}",
            redone.action_type,
            redone.destination_path.display()
        );
        Ok(redone)
    }

    /// User dismissal: `pending -> skipped`.
    pub fn dismiss(&self, file_id: Uuid) -> Result<FileRecord, Error> {
        self.update_file(file_id, |file| file.set_status(FileStatus::Skipped))
    }

    /// Withdraw a suggestion that no longer holds: `ready -> pending`.
    pub fn invalidate(&self, file_id: Uuid) -> Result<FileRecord, Error> {
        self.update_file(file_id, |file| file.set_status(FileStatus::Pending))
    }

    /// The user turned the suggestion down; remembered for later predictions.
    pub fn reject(&self, file_id: Uuid) -> Result<FileRecord, Error> {
        self.update_file(file_id, FileRecord::reject_suggestion)
    }

    fn update_file(
        &self,
        file_id: Uuid,
        change: impl FnOnce(&mut FileRecord) -> Result<(), OperationError>,
    ) -> Result<FileRecord, Error> {
        let _claim = self.claim(file_id)?;
        self.transact(move |tx| {
            let prior = tx
                .state()
                .files
                .get(&file_id)
                .cloned()
                .ok_or_else(|| unknown_file(file_id))?;
            let mut updated = prior.clone();
            change(&mut updated)?;
            tx.on_rollback(move |ws| {
                ws.files.insert(file_id, prior);
            });
            tx.state().files.insert(file_id, updated.clone());
            Ok(updated)
        })
    }

    fn claim(&self, id: Uuid) -> Result<Claim, OperationError> {
        if !self.in_flight.insert(id) {
            return Err(OperationError::InUse {
                path: id.to_string(),
            });
        }
        Ok(Claim {
            in_flight: self.in_flight.clone(),
            id,
        })
    }

    fn expect_status(&self, file_id: Option<Uuid>, allowed: &[FileStatus]) -> Result<(), Error> {
        let Some(file_id) = file_id else {
            return Ok(());
        };
        match self.read(|ws| ws.files.get(&file_id).map(FileRecord::status))? {
            Some(status) if !allowed.contains(&status) => Err(mismatch(&format!(
                "file is {:?}, expected {:?}",
                status, allowed
            ))),
            _ => Ok(()),
        }
    }

    /// Lock every root in a fixed order so batches never deadlock.
    async fn lock_roots(
        &self,
        roots: impl IntoIterator<Item = PathBuf>,
    ) -> Vec<OwnedMutexGuard<()>> {
        let ordered: BTreeSet<PathBuf> = roots.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for root in ordered {
            let lock = self
                .root_locks
                .entry(root)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone();
            guards.push(lock.lock_owned().await);
        }
        guards
    }

    fn source_root_of(&self, path: &Path) -> PathBuf {
        self.ops.access().root_containing(path).unwrap_or_else(|| {
            path.parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| path.to_path_buf())
        })
    }

    async fn destination_root(&self) -> PathBuf {
        tokio::fs::canonicalize(&self.config.destination_root)
            .await
            .unwrap_or_else(|_| self.config.destination_root.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, TransactionalStore<Workspace>>, Error> {
        self.workspace.lock().map_err(|_| {
            PersistenceError::LoadFailed {
                message: "workspace lock poisoned".to_string(),
            }
            .into()
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Workspace) -> T) -> Result<T, Error> {
        Ok(f(self.lock()?.state()))
    }

    fn transact<T>(
        &self,
        body: impl FnOnce(&mut Transaction<'_, Workspace>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.lock()?.with_transaction(body)
    }
}

fn origin_of(suggestion: &Suggestion) -> ActionOrigin {
    match (suggestion.source, suggestion.rule_id) {
        (SuggestionSource::Rule, Some(rule_id)) => ActionOrigin::Rule { rule_id },
        (SuggestionSource::Rule, None) => ActionOrigin::Manual,
        (SuggestionSource::Pattern, _) | (SuggestionSource::Prediction, _) => {
            ActionOrigin::Prediction
        }
    }
}

fn same_target(old: &Suggestion, new: &Suggestion) -> bool {
    old.destination == new.destination && old.action == new.action && old.rule_id == new.rule_id
}

/// Suggestion that walks a redone file back through `ready`.
fn redo_suggestion(record: &ActionRecord) -> Suggestion {
    let destination = match record.action_type {
        ActionType::Delete => String::new(),
        _ => record
            .destination_path
            .parent()
            .and_then(|folder| folder.strip_prefix(&record.destination_root).ok())
            .map(|folder| {
                folder
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_default(),
    };
    Suggestion {
        destination,
        confidence: 1.0,
        source: if record.rule_id.is_some() {
            SuggestionSource::Rule
        } else {
            SuggestionSource::Prediction
        },
        action: record.action_type,
        reason: format!("Redo of {}", record.action_type),
        rule_id: record.rule_id,
    }
}

fn unknown_file(id: Uuid) -> Error {
    OperationError::NotFound {
        path: id.to_string(),
    }
    .into()
}

fn mismatch(reason: &str) -> Error {
    OperationError::StateMismatch {
        reason: reason.to_string(),
    }
    .into()
}

fn join_error(e: tokio::task::JoinError) -> Error {
    OperationError::Io {
        message: format!("background task failed: {}", e),
    }
    .into()
}
