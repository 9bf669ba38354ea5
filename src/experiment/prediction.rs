//! Prediction over unlabeled data.

use std::sync::Arc;

use crate::data::{CorpusReader, NoopPreprocessor, Preprocessor};
use crate::dimension::ParameterSpace;
use crate::error::Result;
use crate::experiment::train_test::{assemble_train_test, TrainTestParts};
use crate::report::CollisionPolicy;
use crate::task::facade::ReportFactory;
use crate::task::{MetaCollector, TaskNode};

/// Train/test over a test corpus without gold labels: structurally the
/// train/test experiment, but the outcome files record
/// [`UNKNOWN_OUTCOME`](crate::task::UNKNOWN_OUTCOME) in the gold column,
/// which downstream evaluation treats as "no reference available".
pub struct ExperimentPrediction {
    name: String,
    reader_train: Arc<dyn CorpusReader>,
    reader_unlabeled: Arc<dyn CorpusReader>,
    preprocessor: Arc<dyn Preprocessor>,
    space: ParameterSpace,
    collectors: Vec<Arc<dyn MetaCollector>>,
    report_factories: Vec<ReportFactory>,
    collision_policy: CollisionPolicy,
}

impl ExperimentPrediction {
    pub fn new(
        name: impl Into<String>,
        reader_train: Arc<dyn CorpusReader>,
        reader_unlabeled: Arc<dyn CorpusReader>,
    ) -> Self {
        Self {
            name: name.into(),
            reader_train,
            reader_unlabeled,
            preprocessor: Arc::new(NoopPreprocessor),
            space: ParameterSpace::new(),
            collectors: Vec::new(),
            report_factories: Vec::new(),
            collision_policy: CollisionPolicy::default(),
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: Arc<dyn Preprocessor>) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_parameter_space(mut self, space: ParameterSpace) -> Self {
        self.space = space;
        self
    }

    pub fn with_collector(mut self, collector: Arc<dyn MetaCollector>) -> Self {
        self.collectors.push(collector);
        self
    }

    pub fn with_report(mut self, factory: ReportFactory) -> Self {
        self.report_factories.push(factory);
        self
    }

    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    /// Assembles the runnable batch graph.
    pub fn build(self) -> Result<TaskNode> {
        let batch_name = format!("Prediction-{}", self.name);
        assemble_train_test(TrainTestParts {
            batch_name,
            experiment: self.name,
            reader_train: self.reader_train,
            reader_test: self.reader_unlabeled,
            preprocessor: self.preprocessor,
            space: self.space,
            collectors: self.collectors,
            report_factories: self.report_factories,
            collision_policy: self.collision_policy,
        })
    }
}
