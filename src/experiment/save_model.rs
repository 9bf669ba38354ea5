//! Model persistence: train on the full corpus, serialize the result.

use std::path::PathBuf;
use std::sync::Arc;

use crate::data::{CorpusReader, NoopPreprocessor, Preprocessor};
use crate::dimension::{DiscriminatorValue, ParameterSpace};
use crate::error::Result;
use crate::experiment::{validate_name, work, PipelinePlan};
use crate::task::facade::ReportFactory;
use crate::task::{
    BatchTask, FacadeKind, InitTask, MetaCollector, TaskNode, TaskType, DIM_OUTPUT_FOLDER,
    DIM_READER_TRAIN, OUTPUT_KEY_TRAIN,
};

/// Runs the training pipeline once and hands the extracted data to the
/// adapter's save-model task. The model lands in a caller-supplied folder
/// outside the storage namespace; every build re-runs, model files are
/// never resolved from cache.
pub struct ExperimentSaveModel {
    name: String,
    reader: Arc<dyn CorpusReader>,
    output_folder: PathBuf,
    preprocessor: Arc<dyn Preprocessor>,
    space: ParameterSpace,
    collectors: Vec<Arc<dyn MetaCollector>>,
    report_factories: Vec<ReportFactory>,
}

impl ExperimentSaveModel {
    pub fn new(
        name: impl Into<String>,
        reader: Arc<dyn CorpusReader>,
        output_folder: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            reader,
            output_folder: output_folder.into(),
            preprocessor: Arc::new(NoopPreprocessor),
            space: ParameterSpace::new(),
            collectors: Vec::new(),
            report_factories: Vec::new(),
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

    /// Assembles the runnable batch graph.
    pub fn build(self) -> Result<TaskNode> {
        validate_name(&self.name)?;

        let init_name = format!("InitTrain-{}", self.name);
        let init = InitTask::train(&init_name, Arc::clone(&self.reader), self.preprocessor);

        let mut space = self.space;
        space.add_static(
            DIM_READER_TRAIN,
            vec![DiscriminatorValue::Str(self.reader.source_id())],
        );
        space.add_static(
            DIM_OUTPUT_FOLDER,
            vec![DiscriminatorValue::Path(self.output_folder)],
        );

        let mut batch = BatchTask::new(format!("SaveModel-{}", self.name));
        batch.meta_mut().set_task_type(TaskType::Evaluation);
        batch.set_parameter_space(space);
        batch.add_task(work(init));
        let pipeline = PipelinePlan {
            experiment: self.name,
            train_source: (init_name, OUTPUT_KEY_TRAIN),
            test_source: None,
            kind: FacadeKind::SaveModel,
            collectors: self.collectors,
            report_factories: self.report_factories,
        };
        for node in pipeline.into_nodes() {
            batch.add_task(node);
        }
        Ok(TaskNode::Batch(batch))
    }
}
