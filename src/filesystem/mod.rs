//! Sandboxed filesystem layer for Tidyflow

pub mod access;
pub mod config;
pub mod operations;
pub mod path_utils;
pub mod platform;
pub mod scan;
pub mod security;


use std::sync::Arc;

use access::{AccessProvider, ScopedAccessManager};
use config::OrganizerConfig;
use operations::FileOperations;
use security::PathValidator;

use crate::error::PersistenceError;
use crate::store::JsonFilePersistence;

#[derive(Clone)]
pub struct FileSystemService {
    config: Arc<OrganizerConfig>,
    validator: Arc<PathValidator>,
    access: Arc<ScopedAccessManager>,
    ops: FileOperations,
}

impl FileSystemService {
    pub fn new(config: Arc<OrganizerConfig>, access: Arc<ScopedAccessManager>) -> Self {
        let validator = Arc::new(PathValidator::new(config.clone()));
        let ops = FileOperations::new(validator.clone(), access.clone(), config.clone());
        Self {
            config,
            validator,
            access,
            ops,
        }
    }

    /// Service whose grants persist to `config.grants_file()`.
    pub fn open(
        config: Arc<OrganizerConfig>,
        provider: Arc<dyn AccessProvider>,
    ) -> Result<Self, PersistenceError> {
        let grants = JsonFilePersistence::new(config.grants_file());
        let access = ScopedAccessManager::new(provider, grants)?;
        Ok(Self::new(config, Arc::new(access)))
    }

    pub fn config(&self) -> &OrganizerConfig {
        self.config.as_ref()
    }

    pub fn validator(&self) -> &Arc<PathValidator> {
        &self.validator
    }

    pub fn access(&self) -> &ScopedAccessManager {
        self.access.as_ref()
    }

    pub fn ops(&self) -> &FileOperations {
        &self.ops
    }
}
