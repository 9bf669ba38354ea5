//! k-fold cross-validation.

use std::sync::Arc;

use crate::data::{list_staged, CorpusReader, NoopPreprocessor, Preprocessor};
use crate::dimension::{
    CogroupFn, DiscriminatorValue, FoldDimension, ParameterSpace,
};
use crate::engine::context::TaskContext;
use crate::error::Result;
use crate::experiment::{validate_folds, validate_name, work, PipelinePlan};
use crate::report::{CollisionPolicy, CombinedOutcomeReport};
use crate::split::{create_minimal_split, UnitSplitter};
use crate::storage::AccessMode;
use crate::task::facade::ReportFactory;
use crate::task::{
    BatchTask, ExecutionPolicy, FacadeKind, InitTask, MetaCollector, SpaceBuilder, TaskNode,
    TaskType, DIM_FILES_ROOT, DIM_READER_TRAIN, INPUT_KEY, LEAVE_ONE_OUT, OUTPUT_KEY_TRAIN,
    UNIT_SPLIT_KEY,
};

/// Builds the fold parameter space once the staged corpus is known.
///
/// Runs with the inner batch's context: lists the staged files through the
/// batch's `input` import, splits them into units when a splitter is
/// configured and the file count falls short of the fold count, then
/// partitions. The resulting space carries the fold bundle plus the
/// `filesRoot` the partition was computed over.
pub struct FoldSpaceBuilder {
    folds: i64,
    comparator: Option<CogroupFn>,
    splitter: Option<Arc<dyn UnitSplitter>>,
}

impl FoldSpaceBuilder {
    pub fn new(folds: i64) -> Self {
        Self { folds, comparator: None, splitter: None }
    }

    pub fn with_comparator(mut self, comparator: CogroupFn) -> Self {
        self.comparator = Some(comparator);
        self
    }

    pub fn with_splitter(mut self, splitter: Arc<dyn UnitSplitter>) -> Self {
        self.splitter = Some(splitter);
        self
    }
}

impl SpaceBuilder for FoldSpaceBuilder {
    fn build(&mut self, ctx: &mut TaskContext<'_>) -> Result<ParameterSpace> {
        let input = ctx.folder(INPUT_KEY, AccessMode::ReadOnly)?;
        let mut files = list_staged(&input)?;
        let mut root = input;

        let needed =
            if self.folds == LEAVE_ONE_OUT { files.len() } else { self.folds.max(0) as usize };
        if files.len() < needed {
            if let Some(splitter) = &self.splitter {
                let out = ctx.folder(UNIT_SPLIT_KEY, AccessMode::ReadWrite)?;
                files = create_minimal_split(&files, splitter.as_ref(), &out)?;
                root = out;
            }
        }

        let ids: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
        let mut dimension = FoldDimension::new("files", self.folds);
        if let Some(comparator) = &self.comparator {
            dimension = dimension.with_comparator(Arc::clone(comparator));
        }
        dimension.set_instances(ids)?;

        let mut space = ParameterSpace::new();
        space.add(Box::new(dimension));
        space.add_static(DIM_FILES_ROOT, vec![DiscriminatorValue::Path(root)]);
        Ok(space)
    }
}

/// Stages the corpus once, then evaluates every fold of a deterministic
/// partition inside a nested batch. Re-running against the same storage
/// reuses completed fold executions.
pub struct ExperimentCrossValidation {
    name: String,
    reader: Arc<dyn CorpusReader>,
    folds: i64,
    preprocessor: Arc<dyn Preprocessor>,
    space: ParameterSpace,
    comparator: Option<CogroupFn>,
    splitter: Option<Arc<dyn UnitSplitter>>,
    collectors: Vec<Arc<dyn MetaCollector>>,
    report_factories: Vec<ReportFactory>,
    collision_policy: CollisionPolicy,
}

impl ExperimentCrossValidation {
    /// `folds` is the requested fold count, or [`LEAVE_ONE_OUT`] for one
    /// fold per staged instance.
    pub fn new(name: impl Into<String>, reader: Arc<dyn CorpusReader>, folds: i64) -> Self {
        Self {
            name: name.into(),
            reader,
            folds,
            preprocessor: Arc::new(NoopPreprocessor),
            space: ParameterSpace::new(),
            comparator: None,
            splitter: None,
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

    /// Keeps identifiers the predicate relates in the same fold.
    pub fn with_comparator(mut self, comparator: CogroupFn) -> Self {
        self.comparator = Some(comparator);
        self
    }

    /// Enables synthetic unit splitting when the staged files fall short
    /// of the fold count.
    pub fn with_splitter(mut self, splitter: Arc<dyn UnitSplitter>) -> Self {
        self.splitter = Some(splitter);
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
        validate_name(&self.name)?;
        validate_folds(self.folds)?;

        let init_name = format!("InitTrain-{}", self.name);
        let init = InitTask::train(&init_name, Arc::clone(&self.reader), self.preprocessor);

        let mut builder = FoldSpaceBuilder::new(self.folds);
        if let Some(comparator) = self.comparator {
            builder = builder.with_comparator(comparator);
        }
        if let Some(splitter) = self.splitter {
            builder = builder.with_splitter(splitter);
        }

        let mut inner = BatchTask::new(format!("FoldBatch-{}", self.name));
        inner.meta_mut().add_import(&init_name, OUTPUT_KEY_TRAIN, INPUT_KEY);
        inner.set_execution_policy(ExecutionPolicy::UseExisting);
        inner.set_space_builder(Box::new(builder));
        inner
            .meta_mut()
            .add_report(Box::new(CombinedOutcomeReport::with_policy(self.collision_policy)));

        let pipeline = PipelinePlan {
            experiment: self.name.clone(),
            train_source: (init_name, OUTPUT_KEY_TRAIN),
            test_source: None,
            kind: FacadeKind::Test,
            collectors: self.collectors,
            report_factories: self.report_factories,
        };
        for node in pipeline.into_nodes() {
            inner.add_task(node);
        }

        let mut space = self.space;
        space.add_static(
            DIM_READER_TRAIN,
            vec![DiscriminatorValue::Str(self.reader.source_id())],
        );

        let mut outer = BatchTask::new(format!("CrossValidation-{}", self.name));
        outer.meta_mut().set_task_type(TaskType::CrossValidation);
        outer.set_execution_policy(ExecutionPolicy::UseExisting);
        outer.set_parameter_space(space);
        outer.add_task(work(init));
        outer.add_task(TaskNode::Batch(inner));
        Ok(TaskNode::Batch(outer))
    }
}
