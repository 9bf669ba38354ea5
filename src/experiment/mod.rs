//! Pre-wired experiment graphs.
//!
//! ## Architecture
//!
//! - `train_test`: one train/test evaluation run
//! - `cross_validation`: k-fold (or leave-one-out) evaluation
//! - `learning_curve`: training-size sweeps, held-out or fixed test set
//! - `save_model`: train on everything, serialize the model
//! - `prediction`: train/test over an unlabeled test corpus
//!
//! Every builder validates its configuration, assembles the batch graph
//! with the import edges the engine schedules by, and returns a
//! [`TaskNode`](crate::task::TaskNode) ready for
//! [`Engine::run`](crate::engine::Engine::run). Building is side-effect
//! free; nothing touches storage until the engine executes the graph.
//!
//! ## Example
//!
//! ```ignore
//! let mut space = ParameterSpace::new();
//! space.add_static(DIM_LEARNING_MODE, vec![DiscriminatorValue::Str("singleLabel".into())]);
//! space.add_static(DIM_FEATURE_MODE, vec![DiscriminatorValue::Str("document".into())]);
//! space.add_static(
//!     DIM_CLASSIFICATION_ARGS,
//!     vec![DiscriminatorValue::Args(vec![ClassificationArg::adapter(MajorityClassAdapter::new())])],
//! );
//!
//! let experiment = ExperimentCrossValidation::new("reuters", reader, 10)
//!     .with_parameter_space(space);
//! let mut graph = experiment.build()?;
//! let root = Engine::new(FilesystemStorage::new(work_dir)?)?.run(&mut graph)?;
//! ```

pub mod cross_validation;
pub mod learning_curve;
pub mod prediction;
pub mod save_model;

pub use cross_validation::{ExperimentCrossValidation, FoldSpaceBuilder};
pub use learning_curve::{
    CurveSpaceBuilder, ExperimentLearningCurve, ExperimentLearningCurveFixedTestSet,
};
pub use prediction::ExperimentPrediction;
pub use save_model::ExperimentSaveModel;
pub use train_test::ExperimentTrainTest;


use std::sync::Arc;

use crate::error::{Error, Result};
use crate::task::facade::ReportFactory;
use crate::task::{
    ExtractFeaturesTask, FacadeKind, FacadeTask, MetaCollector, MetaInfoTask,
    OutcomeCollectionTask, Task, TaskNode, COLLECTION_INPUT_KEY_TEST, COLLECTION_INPUT_KEY_TRAIN,
    INPUT_KEY, LEAVE_ONE_OUT, META_KEY, OUTCOMES_INPUT_KEY, OUTCOMES_KEY, OUTPUT_KEY,
    TEST_TASK_INPUT_KEY_TEST_DATA, TEST_TASK_INPUT_KEY_TRAINING_DATA,
};

pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Configuration("You must set an experiment name".into()));
    }
    Ok(())
}

pub(crate) fn validate_folds(folds: i64) -> Result<()> {
    if folds < 2 && folds != LEAVE_ONE_OUT {
        return Err(Error::Configuration(format!(
            "number of folds must be at least [2] or [{LEAVE_ONE_OUT} (leave one out)], got [{folds}]"
        )));
    }
    Ok(())
}

pub(crate) fn work(task: impl Task + 'static) -> TaskNode {
    TaskNode::Work(Box::new(task))
}

/// The classification pipeline every experiment variant shares: outcome
/// collection, meta collection, feature extraction and the adapter facade,
/// wired to a train staging source and optionally a separate test source.
pub(crate) struct PipelinePlan {
    pub experiment: String,
    pub train_source: (String, &'static str),
    pub test_source: Option<(String, &'static str)>,
    pub kind: FacadeKind,
    pub collectors: Vec<Arc<dyn MetaCollector>>,
    pub report_factories: Vec<ReportFactory>,
}

impl PipelinePlan {
    /// Materializes the pipeline nodes in execution order.
    ///
    /// When no test source is given, the test extraction reads the train
    /// staging folder; per-run `files_validation` lists narrow it to the
    /// held-out slice. Save-model pipelines carry no test extraction.
    pub(crate) fn into_nodes(self) -> Vec<TaskNode> {
        let PipelinePlan { experiment, train_source, test_source, kind, collectors, report_factories } =
            self;
        let (train_task, train_key) = train_source;

        let collection_name = format!("OutcomeCollection-{experiment}");
        let meta_name = format!("MetaInfo-{experiment}");
        let extract_train_name = format!("ExtractFeaturesTrain-{experiment}");
        let extract_test_name = format!("ExtractFeaturesTest-{experiment}");
        let facade_name = match kind {
            FacadeKind::Test => format!("TestFacade-{experiment}"),
            FacadeKind::SaveModel => format!("SaveModelFacade-{experiment}"),
        };

        let mut collection = OutcomeCollectionTask::new(&collection_name);
        collection.meta_mut().add_import(&train_task, train_key, COLLECTION_INPUT_KEY_TRAIN);
        if let Some((test_task, test_key)) = &test_source {
            collection.meta_mut().add_import(test_task, test_key, COLLECTION_INPUT_KEY_TEST);
        }

        let mut meta = MetaInfoTask::new(&meta_name);
        for collector in collectors {
            meta.add_collector(collector);
        }
        meta.meta_mut().add_import(&train_task, train_key, INPUT_KEY);

        let mut extract_train = ExtractFeaturesTask::train(&extract_train_name);
        extract_train.meta_mut().add_import(&train_task, train_key, INPUT_KEY);
        extract_train.meta_mut().add_import(&meta_name, META_KEY, META_KEY);

        let mut facade = FacadeTask::new(&facade_name, kind, &experiment);
        facade.meta_mut().add_import(&extract_train_name, OUTPUT_KEY, TEST_TASK_INPUT_KEY_TRAINING_DATA);
        facade.meta_mut().add_import(&collection_name, OUTCOMES_KEY, OUTCOMES_INPUT_KEY);
        for factory in report_factories {
            facade.add_report_factory(factory);
        }

        let mut nodes = vec![work(collection), work(meta), work(extract_train)];
        if kind == FacadeKind::Test {
            let (test_task, test_key) =
                test_source.unwrap_or_else(|| (train_task.clone(), train_key));
            let mut extract_test = ExtractFeaturesTask::test(&extract_test_name);
            extract_test.meta_mut().add_import(&test_task, test_key, INPUT_KEY);
            extract_test.meta_mut().add_import(&meta_name, META_KEY, META_KEY);
            facade.meta_mut().add_import(&extract_test_name, OUTPUT_KEY, TEST_TASK_INPUT_KEY_TEST_DATA);
            nodes.push(work(extract_test));
        }
        nodes.push(TaskNode::Facade(facade));
        nodes
    }
}
