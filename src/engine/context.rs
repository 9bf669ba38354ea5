//! Execution-time view a task gets of its storage and configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::dimension::Discriminators;
use crate::error::{Error, Result};
use crate::storage::{AccessMode, StorageService};

/// Resolves folder and file keys for one executing task.
///
/// Imported keys shadow own keys and are strictly read-only; everything
/// else lands in the execution's exclusive directory.
pub struct TaskContext<'a> {
    storage: &'a mut dyn StorageService,
    execution_id: String,
    imports: BTreeMap<String, PathBuf>,
    config: Discriminators,
}

impl<'a> TaskContext<'a> {
    pub fn new(
        storage: &'a mut dyn StorageService,
        execution_id: impl Into<String>,
        imports: BTreeMap<String, PathBuf>,
        config: Discriminators,
    ) -> Self {
        Self { storage, execution_id: execution_id.into(), imports, config }
    }

    #[must_use]
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    #[must_use]
    pub fn config(&self) -> &Discriminators {
        &self.config
    }

    /// Whether an import was bound under this key.
    #[must_use]
    pub fn has_import(&self, key: &str) -> bool {
        self.imports.contains_key(key)
    }

    /// Resolves a folder key: an imported path when declared, otherwise a
    /// folder in the execution's own directory.
    pub fn folder(&mut self, key: &str, mode: AccessMode) -> Result<PathBuf> {
        if let Some(path) = self.imports.get(key) {
            if mode == AccessMode::ReadWrite {
                return Err(Error::Configuration(format!(
                    "imported key [{key}] is read-only"
                )));
            }
            return Ok(path.clone());
        }
        self.storage.folder(&self.execution_id, key, mode)
    }

    /// Resolves a file key the same way as [`TaskContext::folder`].
    pub fn file(&mut self, key: &str, mode: AccessMode) -> Result<PathBuf> {
        if let Some(path) = self.imports.get(key) {
            if mode == AccessMode::ReadWrite {
                return Err(Error::Configuration(format!(
                    "imported key [{key}] is read-only"
                )));
            }
            return Ok(path.clone());
        }
        self.storage.file(&self.execution_id, key, mode)
    }
}
