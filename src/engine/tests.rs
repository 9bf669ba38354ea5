use super::*;

use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use crate::adapter::{ClassificationArg, DataSink, LearningAdapter, TsvDataSink};
use crate::dimension::DiscriminatorValue;
use crate::report::Report;
use crate::storage::FilesystemStorage;
use crate::task::{FacadeKind, FacadeTask, TaskType, DIM_CLASSIFICATION_ARGS, INPUT_KEY, OUTPUT_KEY};

type RunLog = Arc<Mutex<Vec<String>>>;

struct RecordingTask {
    meta: TaskMeta,
    log: RunLog,
    fail: bool,
}

impl RecordingTask {
    fn new(name: &str, log: RunLog) -> Self {
        Self { meta: TaskMeta::new(name), log, fail: false }
    }

    fn failing(name: &str, log: RunLog) -> Self {
        Self { meta: TaskMeta::new(name), log, fail: true }
    }
}

impl Task for RecordingTask {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }

    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        self.log.lock().unwrap().push(self.meta.name().to_string());
        if self.fail {
            return Err(Error::Configuration("boom".into()));
        }
        let out = ctx.folder(OUTPUT_KEY, AccessMode::ReadWrite)?;
        std::fs::write(out.join("marker.txt"), ctx.execution_id())?;
        Ok(())
    }
}

struct ImportProbeTask {
    meta: TaskMeta,
    log: RunLog,
    write_import: bool,
}

impl ImportProbeTask {
    fn new(name: &str, log: RunLog) -> Self {
        Self { meta: TaskMeta::new(name), log, write_import: false }
    }
}

impl Task for ImportProbeTask {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }

    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        self.log.lock().unwrap().push(self.meta.name().to_string());
        if self.write_import {
            ctx.folder(INPUT_KEY, AccessMode::ReadWrite)?;
            return Ok(());
        }
        let input = ctx.folder(INPUT_KEY, AccessMode::ReadOnly)?;
        assert!(input.join("marker.txt").is_file(), "imported folder was not staged");
        Ok(())
    }
}

struct BatchReportProbe {
    seen_children: Arc<Mutex<Vec<Vec<String>>>>,
    seen_status: Arc<Mutex<Option<ExecutionStatus>>>,
}

impl Report for BatchReportProbe {
    fn execute(&mut self, ctx: &mut ReportContext<'_>) -> Result<()> {
        self.seen_children.lock().unwrap().push(ctx.subtask_executions().to_vec());
        let record = ctx.record(ctx.execution_id())?;
        *self.seen_status.lock().unwrap() = Some(record.status);
        Ok(())
    }
}

struct StubDelegate {
    meta: TaskMeta,
}

impl Task for StubDelegate {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }

    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        let out = ctx.folder(OUTPUT_KEY, AccessMode::ReadWrite)?;
        std::fs::write(out.join("marker.txt"), ctx.execution_id())?;
        Ok(())
    }
}

struct StubAdapter;

impl LearningAdapter for StubAdapter {
    fn name(&self) -> &str {
        "Stub"
    }

    fn test_task(&self) -> Box<dyn Task> {
        Box::new(StubDelegate { meta: TaskMeta::new("StubTestTask") })
    }

    fn save_model_task(&self) -> Box<dyn Task> {
        Box::new(StubDelegate { meta: TaskMeta::new("StubSaveModelTask") })
    }

    fn data_sink(&self) -> Box<dyn DataSink> {
        Box::new(TsvDataSink)
    }
}

fn work(task: impl Task + 'static) -> TaskNode {
    TaskNode::Work(Box::new(task))
}

fn batch_with(name: &str, policy: ExecutionPolicy, children: Vec<TaskNode>) -> TaskNode {
    let mut batch = BatchTask::new(name);
    batch.set_execution_policy(policy);
    for child in children {
        batch.add_task(child);
    }
    TaskNode::Batch(batch)
}

fn engine(dir: &TempDir) -> Engine<FilesystemStorage> {
    Engine::new(FilesystemStorage::new(dir.path()).unwrap()).unwrap()
}

#[test]
fn test_work_task_records_complete_execution() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine(&dir);
    let log = RunLog::default();

    let mut node = work(RecordingTask::new("worker", log.clone()));
    let id = engine.run(&mut node).unwrap();

    assert_eq!(id, "worker-1");
    assert_eq!(engine.latest_execution("worker"), Some("worker-1"));
    let record = engine.storage().load_record("worker-1").unwrap();
    assert!(record.is_complete());
    assert!(record.finished_at.is_some());
    assert_eq!(record.task_name, "worker");
    assert!(dir.path().join("worker-1/output/marker.txt").is_file());
}

#[test]
fn test_failed_task_finalizes_failed_and_propagates() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine(&dir);
    let log = RunLog::default();

    let mut node = work(RecordingTask::failing("worker", log.clone()));
    let err = engine.run(&mut node).unwrap_err();

    assert!(format!("{err}").contains("boom"));
    assert_eq!(engine.latest_execution("worker"), None);
    let record = engine.storage().load_record("worker-1").unwrap();
    assert_eq!(record.status, ExecutionStatus::Failed);
    assert!(record.finished_at.is_some());
}

#[test]
fn test_children_run_in_declaration_order_when_ready() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine(&dir);
    let log = RunLog::default();

    let producer = RecordingTask::new("producer", log.clone());
    let mut consumer = ImportProbeTask::new("consumer", log.clone());
    consumer.meta_mut().add_import("producer", OUTPUT_KEY, INPUT_KEY);

    let mut node =
        batch_with("wrap", ExecutionPolicy::RunAgain, vec![work(producer), work(consumer)]);
    engine.run(&mut node).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["producer".to_string(), "consumer".to_string()]);
}

#[test]
fn test_scheduler_defers_children_with_unready_imports() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine(&dir);
    let log = RunLog::default();

    // consumer listed first; the scheduler must hold it back one pass
    let mut consumer = ImportProbeTask::new("consumer", log.clone());
    consumer.meta_mut().add_import("producer", OUTPUT_KEY, INPUT_KEY);
    let producer = RecordingTask::new("producer", log.clone());

    let mut node =
        batch_with("wrap", ExecutionPolicy::RunAgain, vec![work(consumer), work(producer)]);
    engine.run(&mut node).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["producer".to_string(), "consumer".to_string()]);
}

#[test]
fn test_unresolvable_import_names_the_waiting_tasks() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine(&dir);
    let log = RunLog::default();

    let mut orphan = ImportProbeTask::new("orphan", log.clone());
    orphan.meta_mut().add_import("ghost", OUTPUT_KEY, INPUT_KEY);

    let mut node = batch_with("wrap", ExecutionPolicy::RunAgain, vec![work(orphan)]);
    let err = engine.run(&mut node).unwrap_err();

    let msg = format!("{err}");
    assert!(msg.contains("[orphan] waiting on [ghost]"), "unexpected message: {msg}");
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_top_level_missing_import_fails() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine(&dir);
    let log = RunLog::default();

    let mut task = ImportProbeTask::new("consumer", log);
    task.meta_mut().add_import("never-ran", OUTPUT_KEY, INPUT_KEY);

    let err = engine.run(&mut work(task)).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("task [consumer] imports from [never-ran]"), "unexpected: {msg}");
}

#[test]
fn test_imported_key_is_read_only() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine(&dir);
    let log = RunLog::default();

    let producer = RecordingTask::new("producer", log.clone());
    let mut consumer = ImportProbeTask::new("consumer", log.clone());
    consumer.write_import = true;
    consumer.meta_mut().add_import("producer", OUTPUT_KEY, INPUT_KEY);

    let mut node =
        batch_with("wrap", ExecutionPolicy::RunAgain, vec![work(producer), work(consumer)]);
    let err = engine.run(&mut node).unwrap_err();

    assert!(format!("{err}").contains("imported key [input] is read-only"));
    let failed = engine
        .storage()
        .list_executions()
        .unwrap()
        .into_iter()
        .find(|r| r.task_name == "consumer")
        .unwrap();
    assert_eq!(failed.status, ExecutionStatus::Failed);
}

#[test]
fn test_use_existing_batch_reuses_unchanged_children() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine(&dir);
    let log = RunLog::default();

    let mut node = batch_with(
        "wrap",
        ExecutionPolicy::UseExisting,
        vec![work(RecordingTask::new("child", log.clone()))],
    );
    let first = engine.run(&mut node).unwrap();
    let second = engine.run(&mut node).unwrap();

    assert_eq!(first, "wrap-1");
    assert_eq!(second, "wrap-3");
    // child ran once yet appears in both batch records
    assert_eq!(log.lock().unwrap().len(), 1);
    assert_eq!(
        engine.storage().load_record("wrap-3").unwrap().child_executions,
        vec!["child-2".to_string()]
    );
}

#[test]
fn test_run_again_batch_re_executes_children() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine(&dir);
    let log = RunLog::default();

    let mut node = batch_with(
        "wrap",
        ExecutionPolicy::RunAgain,
        vec![work(RecordingTask::new("child", log.clone()))],
    );
    engine.run(&mut node).unwrap();
    engine.run(&mut node).unwrap();

    assert_eq!(log.lock().unwrap().len(), 2);
    let child_records = engine
        .storage()
        .list_executions()
        .unwrap()
        .into_iter()
        .filter(|r| r.task_name == "child")
        .count();
    assert_eq!(child_records, 2);
}

#[test]
fn test_restart_resumes_sequence_and_reuses_newest_complete() {
    let dir = TempDir::new().unwrap();
    let key = cache_key("worker", &Discriminators::new());

    fn seeded(id: &str, key: &str, status: ExecutionStatus) -> ExecutionRecord {
        ExecutionRecord {
            execution_id: id.into(),
            task_name: "worker".into(),
            task_type: None,
            attributes: BTreeMap::new(),
            discriminators: BTreeMap::new(),
            cache_key: key.into(),
            status,
            started_at: Utc::now(),
            finished_at: None,
            child_executions: Vec::new(),
        }
    }

    {
        let mut storage = FilesystemStorage::new(dir.path()).unwrap();
        storage.allocate(&seeded("worker-1", &key, ExecutionStatus::Complete)).unwrap();
        storage.allocate(&seeded("worker-5", &key, ExecutionStatus::Complete)).unwrap();
        // a crashed run; newest by sequence but never completed
        storage.allocate(&seeded("worker-9", &key, ExecutionStatus::Running)).unwrap();
    }

    let mut engine = engine(&dir);
    let log = RunLog::default();
    let mut node = batch_with(
        "wrap",
        ExecutionPolicy::UseExisting,
        vec![work(RecordingTask::new("worker", log.clone()))],
    );
    let root = engine.run(&mut node).unwrap();

    assert_eq!(root, "wrap-10");
    assert!(log.lock().unwrap().is_empty(), "cache hit must skip execution");
    assert_eq!(engine.latest_execution("worker"), Some("worker-5"));
    assert_eq!(
        engine.storage().load_record("wrap-10").unwrap().child_executions,
        vec!["worker-5".to_string()]
    );
}

#[test]
fn test_failed_execution_is_not_reused() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine(&dir);
    let log = RunLog::default();

    let mut failing = batch_with(
        "wrap",
        ExecutionPolicy::UseExisting,
        vec![work(RecordingTask::failing("child", log.clone()))],
    );
    assert!(engine.run(&mut failing).is_err());

    let mut retry = batch_with(
        "wrap",
        ExecutionPolicy::UseExisting,
        vec![work(RecordingTask::new("child", log.clone()))],
    );
    engine.run(&mut retry).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["child".to_string(), "child".to_string()]);
}

#[test]
fn test_batch_sweeps_every_point() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine(&dir);
    let log = RunLog::default();

    let mut batch = BatchTask::new("sweep");
    batch.parameter_space_mut().add_static(
        "x",
        vec![DiscriminatorValue::str("a"), DiscriminatorValue::str("b")],
    );
    batch.add_task(work(RecordingTask::new("unit", log.clone())));
    let mut node = TaskNode::Batch(batch);

    let root = engine.run(&mut node).unwrap();

    assert_eq!(log.lock().unwrap().len(), 2);
    assert_eq!(engine.storage().load_record(&root).unwrap().child_executions.len(), 2);
    let mut swept: Vec<String> = engine
        .storage()
        .list_executions()
        .unwrap()
        .into_iter()
        .filter(|r| r.task_name == "unit")
        .filter_map(|r| r.discriminators.get("x").cloned())
        .collect();
    swept.sort();
    assert_eq!(swept, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_facade_runs_delegate_without_own_record() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine(&dir);

    let mut batch = BatchTask::new("wrap");
    batch.parameter_space_mut().add_static(
        DIM_CLASSIFICATION_ARGS,
        vec![DiscriminatorValue::Args(vec![ClassificationArg::adapter(StubAdapter)])],
    );
    batch.add_task(TaskNode::Facade(FacadeTask::new("TestFacade-exp", FacadeKind::Test, "exp")));
    let mut node = TaskNode::Batch(batch);

    engine.run(&mut node).unwrap();

    let records = engine.storage().list_executions().unwrap();
    assert_eq!(records.len(), 2, "only the batch and the delegate are recorded");
    assert!(records.iter().all(|r| r.task_name != "TestFacade-exp"));
    let delegate =
        records.iter().find(|r| r.task_name == "StubTestTask-exp").expect("delegate record");
    assert_eq!(delegate.task_type, Some(TaskType::MachineLearningAdapter));
    assert!(engine.latest_execution("StubTestTask-exp").is_some());
}

#[test]
fn test_batch_reports_see_child_ids_after_completion() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine(&dir);
    let log = RunLog::default();

    let seen_children = Arc::new(Mutex::new(Vec::new()));
    let seen_status = Arc::new(Mutex::new(None));

    let mut batch = BatchTask::new("wrap");
    batch.add_task(work(RecordingTask::new("child", log)));
    batch.meta_mut().add_report(Box::new(BatchReportProbe {
        seen_children: seen_children.clone(),
        seen_status: seen_status.clone(),
    }));
    let mut node = TaskNode::Batch(batch);

    engine.run(&mut node).unwrap();

    assert_eq!(*seen_children.lock().unwrap(), vec![vec!["child-2".to_string()]]);
    assert_eq!(*seen_status.lock().unwrap(), Some(ExecutionStatus::Complete));
}

#[test]
fn test_task_reports_skip_on_cache_hit() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine(&dir);
    let log = RunLog::default();

    let seen_children = Arc::new(Mutex::new(Vec::new()));
    let seen_status = Arc::new(Mutex::new(None));

    let mut child = RecordingTask::new("child", log);
    child.meta_mut().add_report(Box::new(BatchReportProbe {
        seen_children: seen_children.clone(),
        seen_status: seen_status.clone(),
    }));
    let mut node = batch_with("wrap", ExecutionPolicy::UseExisting, vec![work(child)]);

    engine.run(&mut node).unwrap();
    engine.run(&mut node).unwrap();

    // one fresh execution, one cache hit: the report ran once, with no
    // subtask ids since it is attached to a work task
    assert_eq!(*seen_children.lock().unwrap(), vec![Vec::<String>::new()]);
}

#[test]
fn test_cache_key_depends_on_name_and_config() {
    let a1 = cache_key("task", &Discriminators::new().with("x", DiscriminatorValue::str("1")));
    let a1_again = cache_key("task", &Discriminators::new().with("x", DiscriminatorValue::str("1")));
    let a2 = cache_key("task", &Discriminators::new().with("x", DiscriminatorValue::str("2")));
    let b1 = cache_key("other", &Discriminators::new().with("x", DiscriminatorValue::str("1")));

    assert_eq!(a1, a1_again);
    assert_ne!(a1, a2);
    assert_ne!(a1, b1);
}

#[test]
fn test_cache_key_ignores_insertion_order() {
    let mut forward = Discriminators::new();
    forward.set("a", DiscriminatorValue::str("1"));
    forward.set("b", DiscriminatorValue::str("2"));
    let mut backward = Discriminators::new();
    backward.set("b", DiscriminatorValue::str("2"));
    backward.set("a", DiscriminatorValue::str("1"));

    assert_eq!(cache_key("task", &forward), cache_key("task", &backward));
}

#[test]
fn test_id_sequence_parses_trailing_counter() {
    assert_eq!(id_sequence("InitTrain-exp-7"), Some(7));
    assert_eq!(id_sequence("worker-123"), Some(123));
    assert_eq!(id_sequence("worker-abc"), None);
    assert_eq!(id_sequence("plain"), None);
}
