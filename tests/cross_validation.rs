//! Cross-validation experiments end to end: corpus staging, fold
//! scheduling, adapter execution and outcome aggregation over real
//! filesystem storage.

use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use ensayar::adapter::{read_features, DataSink, TsvDataSink};
use ensayar::engine::context::TaskContext;
use ensayar::report::{ID_OUTCOME_HEADER, LABELS_PREFIX};
use ensayar::storage::{AccessMode, ExecutionRecord, ExecutionStatus, StorageService};
use ensayar::task::{
    Task, TaskMeta, TaskType, BASELINE_MAJORITY_ID_OUTCOME_KEY, DIM_CLASSIFICATION_ARGS,
    DIM_FEATURE_MODE, DIM_LEARNING_MODE, FILE_COMBINED_ID_OUTCOME_KEY, ID_OUTCOME_KEY,
    TEST_TASK_INPUT_KEY_TEST_DATA, TEST_TASK_OUTPUT_KEY,
};
use ensayar::{
    ClassificationArg, DiscriminatorValue, Engine, Error, ExperimentCrossValidation,
    FilesystemStorage, LearningAdapter, MajorityClassAdapter, ParameterSpace, Result,
    TextInstance, VecReader,
};

fn corpus(n: usize) -> Arc<VecReader> {
    let instances = (0..n)
        .map(|i| {
            let label = if i % 3 == 0 { "neg" } else { "pos" };
            TextInstance::labeled(format!("doc{i:03}"), label, format!("document number {i}"))
        })
        .collect();
    Arc::new(VecReader::new("unit-corpus", instances))
}

fn majority_space() -> ParameterSpace {
    let mut space = ParameterSpace::new();
    space.add_static(DIM_LEARNING_MODE, vec![DiscriminatorValue::Str("singleLabel".into())]);
    space.add_static(DIM_FEATURE_MODE, vec![DiscriminatorValue::Str("document".into())]);
    space.add_static(
        DIM_CLASSIFICATION_ARGS,
        vec![DiscriminatorValue::Args(vec![ClassificationArg::adapter(
            MajorityClassAdapter::new(),
        )])],
    );
    space
}

fn records_named<'a>(records: &'a [ExecutionRecord], name: &str) -> Vec<&'a ExecutionRecord> {
    records.iter().filter(|r| r.task_name == name).collect()
}

fn outcome_ids(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|l| !l.starts_with('#') && !l.is_empty())
        .map(|l| l.rsplit_once('=').expect("record line").0.to_string())
        .collect()
}

fn id_seq(execution_id: &str) -> u64 {
    execution_id.rsplit_once('-').and_then(|(_, n)| n.parse().ok()).unwrap_or(0)
}

#[test]
fn test_cross_validation_runs_every_fold_once() {
    let dir = TempDir::new().expect("temp dir");
    let mut graph = ExperimentCrossValidation::new("cv", corpus(10), 3)
        .with_parameter_space(majority_space())
        .build()
        .expect("graph should build");
    let mut engine = Engine::new(FilesystemStorage::new(dir.path()).expect("storage should open"))
        .expect("engine should open");

    let root = engine.run(&mut graph).expect("run should succeed");
    assert!(root.starts_with("CrossValidation-cv-"), "root was [{root}]");

    let records = engine.storage().list_executions().expect("list should succeed");
    assert_eq!(records_named(&records, "InitTrain-cv").len(), 1);

    let adapters = records_named(&records, "MajorityClassTestTask-cv");
    assert_eq!(adapters.len(), 3);

    let mut sizes = Vec::new();
    let mut seen = BTreeSet::new();
    for record in &adapters {
        assert_eq!(record.status, ExecutionStatus::Complete);
        assert_eq!(record.task_type, Some(TaskType::MachineLearningAdapter));

        let out = dir.path().join(&record.execution_id).join(TEST_TASK_OUTPUT_KEY);
        let ids = outcome_ids(&fs::read_to_string(out.join(ID_OUTCOME_KEY)).expect("outcome file"));
        sizes.push(ids.len());
        for id in ids {
            assert!(seen.insert(id), "instance predicted in more than one fold");
        }
        assert!(out.join(BASELINE_MAJORITY_ID_OUTCOME_KEY).exists());
    }
    sizes.sort_unstable();
    assert_eq!(sizes, vec![3, 3, 4]);
    assert_eq!(seen.len(), 10);

    let fold_batches = records_named(&records, "FoldBatch-cv");
    assert_eq!(fold_batches.len(), 1);
    assert_eq!(fold_batches[0].child_executions.len(), 15);

    let combined = fs::read_to_string(
        dir.path().join(&fold_batches[0].execution_id).join(FILE_COMBINED_ID_OUTCOME_KEY),
    )
    .expect("combined outcome file");
    assert!(combined.starts_with(ID_OUTCOME_HEADER));
    assert_eq!(outcome_ids(&combined).len(), 10);
}

#[test]
fn test_rerun_reuses_completed_fold_executions() {
    let dir = TempDir::new().expect("temp dir");
    let build = || {
        ExperimentCrossValidation::new("cv", corpus(10), 3)
            .with_parameter_space(majority_space())
            .build()
            .expect("graph should build")
    };

    let mut engine = Engine::new(FilesystemStorage::new(dir.path()).expect("storage should open"))
        .expect("engine should open");
    let mut graph = build();
    let first_root = engine.run(&mut graph).expect("first run should succeed");

    let mut engine = Engine::new(FilesystemStorage::new(dir.path()).expect("storage should open"))
        .expect("engine should open");
    let mut graph = build();
    let second_root = engine.run(&mut graph).expect("second run should succeed");
    assert_ne!(first_root, second_root);

    let records = engine.storage().list_executions().expect("list should succeed");
    assert_eq!(records_named(&records, "InitTrain-cv").len(), 1);
    assert_eq!(records_named(&records, "MajorityClassTestTask-cv").len(), 3);
    assert_eq!(records_named(&records, "OutcomeCollection-cv").len(), 3);
    // batches re-derive their child list on every run
    assert_eq!(records_named(&records, "FoldBatch-cv").len(), 2);
    assert_eq!(records_named(&records, "CrossValidation-cv").len(), 2);

    let newest_batch = records_named(&records, "FoldBatch-cv")
        .into_iter()
        .max_by_key(|r| id_seq(&r.execution_id))
        .expect("fold batch record");
    assert_eq!(newest_batch.child_executions.len(), 15);
    let combined = fs::read_to_string(
        dir.path().join(&newest_batch.execution_id).join(FILE_COMBINED_ID_OUTCOME_KEY),
    )
    .expect("combined outcome file");
    assert_eq!(outcome_ids(&combined).len(), 10);
}

#[test]
fn test_insufficient_data_fails_the_run() {
    let dir = TempDir::new().expect("temp dir");
    let mut graph = ExperimentCrossValidation::new("cv", corpus(4), 5)
        .with_parameter_space(majority_space())
        .build()
        .expect("graph should build");
    let mut engine = Engine::new(FilesystemStorage::new(dir.path()).expect("storage should open"))
        .expect("engine should open");

    let err = engine.run(&mut graph).expect_err("run should fail");
    assert!(matches!(err, Error::InsufficientData { requested: 5, available: 4 }));
    assert_eq!(err.to_string(), "insufficient data: need 5 classification units, have 4");

    let records = engine.storage().list_executions().expect("list should succeed");
    assert!(records_named(&records, "MajorityClassTestTask-cv").is_empty());
    assert_eq!(records_named(&records, "FoldBatch-cv")[0].status, ExecutionStatus::Failed);
    assert_eq!(records_named(&records, "CrossValidation-cv")[0].status, ExecutionStatus::Failed);
}

/// Minimal external learner: predicts one fixed label for everything.
/// Exercises the adapter seam the way a real integration would.
struct ConstantAdapter {
    label: &'static str,
}

impl LearningAdapter for ConstantAdapter {
    fn name(&self) -> &str {
        "Constant"
    }

    fn test_task(&self) -> Box<dyn Task> {
        Box::new(ConstantTestTask::new(self.label))
    }

    fn save_model_task(&self) -> Box<dyn Task> {
        Box::new(ConstantTestTask::new(self.label))
    }

    fn data_sink(&self) -> Box<dyn DataSink> {
        Box::new(TsvDataSink)
    }
}

struct ConstantTestTask {
    meta: TaskMeta,
    label: &'static str,
}

impl ConstantTestTask {
    fn new(label: &'static str) -> Self {
        Self { meta: TaskMeta::new("ConstantTestTask"), label }
    }
}

impl Task for ConstantTestTask {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }

    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        let test_dir = ctx.folder(TEST_TASK_INPUT_KEY_TEST_DATA, AccessMode::ReadOnly)?;
        let out = ctx.folder(TEST_TASK_OUTPUT_KEY, AccessMode::ReadWrite)?;
        let test = read_features(&test_dir)?;

        let mut labels = vec![self.label.to_string()];
        let mut records = Vec::new();
        for instance in &test {
            let gold = instance.outcomes.first().cloned().unwrap_or_default();
            let gold_idx = match labels.iter().position(|l| *l == gold) {
                Some(i) => i,
                None => {
                    labels.push(gold);
                    labels.len() - 1
                }
            };
            records.push(format!("{}=0;{gold_idx};-1", instance.id));
        }

        let mapping: Vec<String> =
            labels.iter().enumerate().map(|(i, l)| format!("{i}={l}")).collect();
        let mut content = format!("{ID_OUTCOME_HEADER}\n{LABELS_PREFIX} {}\n", mapping.join(" "));
        for record in records {
            content.push_str(&record);
            content.push('\n');
        }
        fs::write(out.join(ID_OUTCOME_KEY), content)?;
        Ok(())
    }
}

fn constant_space(label: &'static str) -> ParameterSpace {
    let mut space = ParameterSpace::new();
    space.add_static(DIM_LEARNING_MODE, vec![DiscriminatorValue::Str("singleLabel".into())]);
    space.add_static(DIM_FEATURE_MODE, vec![DiscriminatorValue::Str("document".into())]);
    space.add_static(
        DIM_CLASSIFICATION_ARGS,
        vec![DiscriminatorValue::Args(vec![ClassificationArg::adapter(ConstantAdapter { label })])],
    );
    space
}

#[test]
fn test_adapter_swap_runs_new_learner_and_keeps_history() {
    let dir = TempDir::new().expect("temp dir");

    let mut engine = Engine::new(FilesystemStorage::new(dir.path()).expect("storage should open"))
        .expect("engine should open");
    let mut graph = ExperimentCrossValidation::new("swap", corpus(10), 3)
        .with_parameter_space(majority_space())
        .build()
        .expect("graph should build");
    engine.run(&mut graph).expect("majority run should succeed");

    let mut engine = Engine::new(FilesystemStorage::new(dir.path()).expect("storage should open"))
        .expect("engine should open");
    let mut graph = ExperimentCrossValidation::new("swap", corpus(10), 3)
        .with_parameter_space(constant_space("neg"))
        .build()
        .expect("graph should build");
    engine.run(&mut graph).expect("constant run should succeed");

    let records = engine.storage().list_executions().expect("list should succeed");
    let constants = records_named(&records, "ConstantTestTask-swap");
    assert_eq!(constants.len(), 3);
    for record in &constants {
        assert_eq!(record.status, ExecutionStatus::Complete);
        assert_eq!(record.task_type, Some(TaskType::MachineLearningAdapter));
    }
    // the previous learner's executions stay on disk untouched
    assert_eq!(records_named(&records, "MajorityClassTestTask-swap").len(), 3);

    let newest_batch = records_named(&records, "FoldBatch-swap")
        .into_iter()
        .max_by_key(|r| id_seq(&r.execution_id))
        .expect("fold batch record");
    let combined = fs::read_to_string(
        dir.path().join(&newest_batch.execution_id).join(FILE_COMBINED_ID_OUTCOME_KEY),
    )
    .expect("combined outcome file");
    assert!(combined.contains("0=neg"), "combined was: {combined}");
    for line in combined.lines().filter(|l| !l.starts_with('#') && !l.is_empty()) {
        let (_, payload) = line.rsplit_once('=').expect("record line");
        assert!(payload.starts_with("0;"), "prediction should be the constant label: {line}");
    }
}
