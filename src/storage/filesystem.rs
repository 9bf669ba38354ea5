//! Filesystem backend: one directory per execution under a common root.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::{Error, Result};
use crate::storage::{AccessMode, ExecutionRecord, StorageService};

const METADATA_FILE: &str = "metadata.json";

/// Stores executions as `<root>/<execution_id>/` directories with a
/// `metadata.json` record each.
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    /// Opens (and if needed creates) a storage root.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn execution_dir(&self, execution_id: &str) -> PathBuf {
        self.root.join(execution_id)
    }

    fn write_record(&self, record: &ExecutionRecord) -> Result<()> {
        let dir = self.execution_dir(&record.execution_id);
        let json = serde_json::to_string_pretty(record)?;
        fs::write(dir.join(METADATA_FILE), json)?;
        Ok(())
    }
}

impl StorageService for FilesystemStorage {
    fn allocate(&mut self, record: &ExecutionRecord) -> Result<()> {
        let dir = self.execution_dir(&record.execution_id);
        if dir.exists() {
            return Err(Error::Configuration(format!(
                "execution directory already exists: {}",
                dir.display()
            )));
        }
        fs::create_dir_all(&dir)?;
        self.write_record(record)
    }

    fn finalize(&mut self, record: &ExecutionRecord) -> Result<()> {
        self.write_record(record)
    }

    fn folder(&mut self, execution_id: &str, key: &str, _mode: AccessMode) -> Result<PathBuf> {
        let dir = self.execution_dir(execution_id).join(key);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn file(&mut self, execution_id: &str, key: &str, _mode: AccessMode) -> Result<PathBuf> {
        Ok(self.execution_dir(execution_id).join(key))
    }

    fn load_record(&self, execution_id: &str) -> Result<ExecutionRecord> {
        let path = self.execution_dir(execution_id).join(METADATA_FILE);
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn list_executions(&self) -> Result<Vec<ExecutionRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let metadata = path.join(METADATA_FILE);
            if !metadata.exists() {
                continue;
            }
            match fs::read_to_string(&metadata)
                .map_err(Error::from)
                .and_then(|json| serde_json::from_str(&json).map_err(Error::from))
            {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!("skipping unreadable execution record {}: {err}", metadata.display());
                }
            }
        }
        Ok(records)
    }
}
