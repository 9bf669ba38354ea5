//! Reports: post-execution hooks on tasks and batches.
//!
//! A report runs after its owning task (or batch) completes successfully.
//! Task-level reports see the task's own folders, imports and resolved
//! configuration; batch-level reports additionally see the execution ids
//! of every descendant run, which is how per-fold outcome files are found
//! and combined.

mod combined;
mod combiner;

pub use combined::CombinedOutcomeReport;
pub use combiner::{
    CollisionPolicy, OutcomeCombiner, OutcomeRecord, ID_OUTCOME_HEADER, LABELS_PREFIX,
};


use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::dimension::Discriminators;
use crate::error::{Error, Result};
use crate::storage::{AccessMode, ExecutionRecord, StorageService};

/// Post-execution hook.
pub trait Report: Send {
    fn execute(&mut self, ctx: &mut ReportContext<'_>) -> Result<()>;
}

/// Execution-time view a report gets of its owning execution and, for
/// batch reports, the completed descendant executions.
pub struct ReportContext<'a> {
    storage: &'a mut dyn StorageService,
    execution_id: String,
    imports: BTreeMap<String, PathBuf>,
    config: Discriminators,
    subtask_executions: Vec<String>,
}

impl<'a> ReportContext<'a> {
    pub fn new(
        storage: &'a mut dyn StorageService,
        execution_id: impl Into<String>,
        imports: BTreeMap<String, PathBuf>,
        config: Discriminators,
        subtask_executions: Vec<String>,
    ) -> Self {
        Self {
            storage,
            execution_id: execution_id.into(),
            imports,
            config,
            subtask_executions,
        }
    }

    #[must_use]
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    #[must_use]
    pub fn config(&self) -> &Discriminators {
        &self.config
    }

    /// Execution ids of the owning batch's direct children, in completion
    /// order. Empty for task-level reports.
    #[must_use]
    pub fn subtask_executions(&self) -> &[String] {
        &self.subtask_executions
    }

    /// Folder key resolution of the owning execution; imported keys are
    /// read-only, exactly as during task execution.
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

    /// File key resolution of the owning execution.
    pub fn file(&mut self, key: &str, mode: AccessMode) -> Result<PathBuf> {
        if let Some(path) = self.imports.get(key) {
            return Ok(path.clone());
        }
        self.storage.file(&self.execution_id, key, mode)
    }

    /// Loads the record of any execution by id.
    pub fn record(&self, execution_id: &str) -> Result<ExecutionRecord> {
        self.storage.load_record(execution_id)
    }

    /// Read-only folder of another execution.
    pub fn execution_folder(&mut self, execution_id: &str, key: &str) -> Result<PathBuf> {
        self.storage.folder(execution_id, key, AccessMode::ReadOnly)
    }
}
