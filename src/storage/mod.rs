//! Task-keyed storage namespace.
//!
//! Every task execution gets an exclusive directory identified by its
//! execution id; inside it, folders and files are addressed by key. One
//! `metadata.json` record per execution carries identity, rendered
//! discriminators, the cache key and a status that doubles as the
//! completeness predicate: only `Complete` executions are ever reused.

mod filesystem;

pub use filesystem::FilesystemStorage;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::task::TaskType;

/// Access intent when resolving a folder or file key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// Lifecycle of one execution. A crash mid-execute leaves `Running`
/// behind, which the cache treats as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Running,
    Complete,
    Failed,
}

/// Persisted metadata of one task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub task_name: String,
    pub task_type: Option<TaskType>,
    pub attributes: BTreeMap<String, String>,
    pub discriminators: BTreeMap<String, String>,
    pub cache_key: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub child_executions: Vec<String>,
}

impl ExecutionRecord {
    pub fn is_complete(&self) -> bool {
        self.status == ExecutionStatus::Complete
    }
}

/// Persistence boundary of the engine.
///
/// Folders materialize on first access; the engine never touches paths it
/// did not obtain through this trait.
pub trait StorageService: Send {
    /// Creates the execution directory and writes the initial record.
    fn allocate(&mut self, record: &ExecutionRecord) -> Result<()>;

    /// Rewrites the record, usually to publish the final status.
    fn finalize(&mut self, record: &ExecutionRecord) -> Result<()>;

    /// Resolves a folder key inside an execution directory.
    fn folder(&mut self, execution_id: &str, key: &str, mode: AccessMode) -> Result<PathBuf>;

    /// Resolves a file key inside an execution directory.
    fn file(&mut self, execution_id: &str, key: &str, mode: AccessMode) -> Result<PathBuf>;

    fn load_record(&self, execution_id: &str) -> Result<ExecutionRecord>;

    /// All parseable records under the storage root, in unspecified order.
    fn list_executions(&self) -> Result<Vec<ExecutionRecord>>;
}
