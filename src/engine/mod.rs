//! Deterministic execution of task graphs over a storage service.
//!
//! ## Architecture
//!
//! - `context`: the storage and configuration view handed to a running task
//! - scan-and-defer scheduling: within one parameter-space point, children
//!   run as soon as every import source has an execution; a full pass with
//!   no progress is a wiring error
//! - content-addressed reuse: an execution is keyed on the task name plus
//!   the rendered configuration, and `UseExisting` batches resolve a key
//!   hit to the stored execution instead of running again
//!
//! Batches themselves always execute; only their work children are subject
//! to reuse. Re-running an experiment therefore re-derives the child list
//! cheaply while every expensive leaf hits the cache.
//!
//! ## Example
//!
//! ```ignore
//! let storage = FilesystemStorage::new(work_dir)?;
//! let mut engine = Engine::new(storage)?;
//! let root = engine.run(&mut experiment.build()?)?;
//! ```

pub mod context;

#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use chrono::Utc;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::dimension::Discriminators;
use crate::error::{Error, Result};
use crate::report::ReportContext;
use crate::storage::{AccessMode, ExecutionRecord, ExecutionStatus, StorageService};
use crate::task::facade::expect_delegate;
use crate::task::{BatchTask, ExecutionPolicy, Task, TaskMeta, TaskNode};

use context::TaskContext;

/// Executes task graphs, allocating one storage record per run and reusing
/// completed executions where the owning batch allows it.
pub struct Engine<S: StorageService> {
    storage: S,
    seq: u64,
    cache: HashMap<String, String>,
    latest: HashMap<String, String>,
}

impl<S: StorageService> Engine<S> {
    /// Opens the engine over existing storage. Completed executions are
    /// indexed by cache key so `UseExisting` batches can resolve to them;
    /// `Running` and `Failed` leftovers are ignored.
    pub fn new(storage: S) -> Result<Self> {
        let mut cache: HashMap<String, String> = HashMap::new();
        let mut seq = 1;
        for record in storage.list_executions()? {
            let n = id_sequence(&record.execution_id).unwrap_or(0);
            seq = seq.max(n + 1);
            if !record.is_complete() {
                continue;
            }
            // Duplicate keys from RunAgain histories: keep the newest.
            let newer = cache
                .get(&record.cache_key)
                .map_or(true, |held| id_sequence(held).unwrap_or(0) < n);
            if newer {
                cache.insert(record.cache_key.clone(), record.execution_id.clone());
            }
        }
        debug!("engine opened with {} reusable executions", cache.len());
        Ok(Self { storage, seq, cache, latest: HashMap::new() })
    }

    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Execution id most recently bound for a task name, either by running
    /// it or by resolving a cache hit.
    #[must_use]
    pub fn latest_execution(&self, task_name: &str) -> Option<&str> {
        self.latest.get(task_name).map(String::as_str)
    }

    /// Runs a task graph to completion and returns the root execution id.
    pub fn run(&mut self, node: &mut TaskNode) -> Result<String> {
        let base = Discriminators::new();
        self.exec_node(node, &base, ExecutionPolicy::RunAgain)
    }

    fn exec_node(
        &mut self,
        node: &mut TaskNode,
        config: &Discriminators,
        policy: ExecutionPolicy,
    ) -> Result<String> {
        match node {
            TaskNode::Work(task) => self.exec_work(task.as_mut(), config, policy),
            TaskNode::Batch(batch) => self.exec_batch(batch, config),
            TaskNode::Facade(facade) => {
                facade.initialize(config)?;
                let delegate = expect_delegate(facade)?;
                self.exec_work(delegate.as_mut(), config, policy)
            }
        }
    }

    fn exec_work(
        &mut self,
        task: &mut dyn Task,
        config: &Discriminators,
        policy: ExecutionPolicy,
    ) -> Result<String> {
        let name = task.meta().name().to_string();
        let key = cache_key(&name, config);

        if policy == ExecutionPolicy::UseExisting {
            if let Some(existing) = self.cache.get(&key) {
                let existing = existing.clone();
                debug!("[{name}] unchanged, reusing [{existing}]");
                self.latest.insert(name, existing.clone());
                return Ok(existing);
            }
        }

        let imports = self.resolve_imports(task.meta())?;
        let execution_id = self.next_id(&name);
        let mut record = ExecutionRecord {
            execution_id: execution_id.clone(),
            task_name: name.clone(),
            task_type: task.meta().task_type(),
            attributes: task.meta().attributes().clone(),
            discriminators: config.rendered(),
            cache_key: key.clone(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            child_executions: Vec::new(),
        };
        self.storage.allocate(&record)?;

        let mut ctx = TaskContext::new(
            &mut self.storage,
            execution_id.clone(),
            imports.clone(),
            config.clone(),
        );
        let outcome = task.execute(&mut ctx);

        record.finished_at = Some(Utc::now());
        if let Err(err) = outcome {
            warn!("[{execution_id}] failed: {err}");
            record.status = ExecutionStatus::Failed;
            self.storage.finalize(&record)?;
            return Err(err);
        }
        record.status = ExecutionStatus::Complete;
        self.storage.finalize(&record)?;
        info!("[{execution_id}] complete");

        self.run_reports(task.meta_mut(), &execution_id, imports, config, Vec::new())?;
        self.cache.insert(key, execution_id.clone());
        self.latest.insert(name, execution_id.clone());
        Ok(execution_id)
    }

    fn exec_batch(&mut self, batch: &mut BatchTask, config: &Discriminators) -> Result<String> {
        let name = batch.meta().name().to_string();
        let imports = self.resolve_imports(batch.meta())?;
        let execution_id = self.next_id(&name);
        let mut record = ExecutionRecord {
            execution_id: execution_id.clone(),
            task_name: name.clone(),
            task_type: batch.meta().task_type(),
            attributes: batch.meta().attributes().clone(),
            discriminators: config.rendered(),
            cache_key: cache_key(&name, config),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            child_executions: Vec::new(),
        };
        self.storage.allocate(&record)?;
        info!("batch [{name}] started as [{execution_id}]");

        let mut children = Vec::new();
        let outcome = self.run_batch_points(batch, &execution_id, &imports, config, &mut children);
        record.child_executions = children;
        record.finished_at = Some(Utc::now());
        if let Err(err) = outcome {
            warn!("batch [{execution_id}] failed: {err}");
            record.status = ExecutionStatus::Failed;
            self.storage.finalize(&record)?;
            return Err(err);
        }
        record.status = ExecutionStatus::Complete;
        self.storage.finalize(&record)?;
        info!(
            "batch [{execution_id}] complete, {} child executions",
            record.child_executions.len()
        );

        let subtasks = record.child_executions.clone();
        self.run_reports(batch.meta_mut(), &execution_id, imports, config, subtasks)?;
        self.latest.insert(name, execution_id.clone());
        Ok(execution_id)
    }

    /// One pass over the parameter space. The space builder, when present,
    /// sees the batch's own imports, which is how fold dimensions reach the
    /// staged data of an upstream task.
    fn run_batch_points(
        &mut self,
        batch: &mut BatchTask,
        execution_id: &str,
        imports: &BTreeMap<String, PathBuf>,
        config: &Discriminators,
        children_out: &mut Vec<String>,
    ) -> Result<()> {
        if let Some(mut builder) = batch.take_space_builder() {
            let mut ctx = TaskContext::new(
                &mut self.storage,
                execution_id,
                imports.clone(),
                config.clone(),
            );
            let built = builder.build(&mut ctx);
            batch.set_space_builder(builder);
            batch.set_parameter_space(built?);
        }

        let points = batch.parameter_space_mut().points(config)?;
        let policy = batch.execution_policy();
        for point in &points {
            self.run_point(batch, point, policy, children_out)?;
        }
        Ok(())
    }

    /// Scan-and-defer over the batch children: execute every child whose
    /// import sources are bound, repeat until done, and fail when a full
    /// pass makes no progress.
    fn run_point(
        &mut self,
        batch: &mut BatchTask,
        point: &Discriminators,
        policy: ExecutionPolicy,
        children_out: &mut Vec<String>,
    ) -> Result<()> {
        let total = batch.children().len();
        let mut done = vec![false; total];
        let mut completed = 0usize;
        while completed < total {
            let mut progressed = false;
            for idx in 0..total {
                if done[idx] {
                    continue;
                }
                if !self.imports_ready(batch.children()[idx].meta()) {
                    continue;
                }
                let id = self.exec_node(&mut batch.children_mut()[idx], point, policy)?;
                children_out.push(id);
                done[idx] = true;
                completed += 1;
                progressed = true;
            }
            if !progressed {
                let mut pending = Vec::new();
                for idx in 0..total {
                    if done[idx] {
                        continue;
                    }
                    let meta = batch.children()[idx].meta();
                    let missing: Vec<&str> = meta
                        .imports()
                        .iter()
                        .filter(|i| !self.latest.contains_key(&i.source_task))
                        .map(|i| i.source_task.as_str())
                        .collect();
                    pending.push(format!("[{}] waiting on [{}]", meta.name(), missing.join(", ")));
                }
                return Err(Error::UnresolvedDependency(pending.join("; ")));
            }
        }
        Ok(())
    }

    fn imports_ready(&self, meta: &TaskMeta) -> bool {
        meta.imports().iter().all(|i| self.latest.contains_key(&i.source_task))
    }

    /// Binds each declared import to a read-only folder of the source's
    /// current execution.
    fn resolve_imports(&mut self, meta: &TaskMeta) -> Result<BTreeMap<String, PathBuf>> {
        let mut imports = BTreeMap::new();
        for import in meta.imports().to_vec() {
            let source_id = self
                .latest
                .get(&import.source_task)
                .ok_or_else(|| Error::MissingImport {
                    task: meta.name().to_string(),
                    source: import.source_task.clone(),
                })?
                .clone();
            let path = self.storage.folder(&source_id, &import.source_key, AccessMode::ReadOnly)?;
            imports.insert(import.local_key, path);
        }
        Ok(imports)
    }

    fn run_reports(
        &mut self,
        meta: &mut TaskMeta,
        execution_id: &str,
        imports: BTreeMap<String, PathBuf>,
        config: &Discriminators,
        subtasks: Vec<String>,
    ) -> Result<()> {
        for report in meta.reports_mut() {
            let mut ctx = ReportContext::new(
                &mut self.storage,
                execution_id,
                imports.clone(),
                config.clone(),
                subtasks.clone(),
            );
            report.execute(&mut ctx)?;
        }
        Ok(())
    }

    fn next_id(&mut self, name: &str) -> String {
        let id = format!("{name}-{}", self.seq);
        self.seq += 1;
        id
    }
}

/// Content key of one execution: the task name plus every rendered
/// discriminator, in sorted order.
fn cache_key(name: &str, config: &Discriminators) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    for (k, v) in config.rendered() {
        hasher.update(b"\n");
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Trailing counter of an execution id, used to order histories.
fn id_sequence(execution_id: &str) -> Option<u64> {
    execution_id.rsplit_once('-').and_then(|(_, n)| n.parse().ok())
}
