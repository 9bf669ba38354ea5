//! Learning-curve evaluation: how does performance grow with training
//! data?

use std::sync::Arc;

use crate::data::{list_staged, CorpusReader, NoopPreprocessor, Preprocessor};
use crate::dimension::{
    CogroupFn, DiscriminatorValue, FixedTestSetCurveDimension, LearningCurveDimension,
    ParameterSpace,
};
use crate::engine::context::TaskContext;
use crate::error::{Error, Result};
use crate::experiment::{validate_name, work, PipelinePlan};
use crate::report::{CollisionPolicy, CombinedOutcomeReport};
use crate::storage::AccessMode;
use crate::task::facade::ReportFactory;
use crate::task::{
    BatchTask, ExecutionPolicy, FacadeKind, InitTask, MetaCollector, SpaceBuilder, TaskNode,
    TaskType, DIM_FILES_ROOT, DIM_READER_TEST, DIM_READER_TRAIN, INPUT_KEY, OUTPUT_KEY_TEST,
    OUTPUT_KEY_TRAIN,
};

fn validate_curve(name: &str, folds: i64, stage_limit: Option<usize>) -> Result<()> {
    validate_name(name)?;
    if folds < 2 {
        return Err(Error::Configuration(format!(
            "learning curve [{name}] requires at least 2 folds, got [{folds}]"
        )));
    }
    if stage_limit == Some(0) {
        return Err(Error::Configuration(format!(
            "learning curve [{name}] stage limit must be at least 1"
        )));
    }
    Ok(())
}

/// Builds the curve parameter space once the staged corpus is known.
pub struct CurveSpaceBuilder {
    folds: i64,
    stage_limit: Option<usize>,
    comparator: Option<CogroupFn>,
    fixed_test_set: bool,
}

impl CurveSpaceBuilder {
    pub fn new(folds: i64) -> Self {
        Self { folds, stage_limit: None, comparator: None, fixed_test_set: false }
    }

    pub fn with_stage_limit(mut self, limit: usize) -> Self {
        self.stage_limit = Some(limit);
        self
    }

    pub fn with_comparator(mut self, comparator: CogroupFn) -> Self {
        self.comparator = Some(comparator);
        self
    }

    /// Schedules over all buckets; evaluation uses an external test set.
    pub fn with_fixed_test_set(mut self) -> Self {
        self.fixed_test_set = true;
        self
    }
}

impl SpaceBuilder for CurveSpaceBuilder {
    fn build(&mut self, ctx: &mut TaskContext<'_>) -> Result<ParameterSpace> {
        let input = ctx.folder(INPUT_KEY, AccessMode::ReadOnly)?;
        let ids: Vec<String> =
            list_staged(&input)?.iter().map(|p| p.display().to_string()).collect();

        let mut space = ParameterSpace::new();
        if self.fixed_test_set {
            let mut dimension = FixedTestSetCurveDimension::new("files", self.folds);
            if let Some(limit) = self.stage_limit {
                dimension = dimension.with_stage_limit(limit);
            }
            if let Some(comparator) = &self.comparator {
                dimension = dimension.with_comparator(Arc::clone(comparator));
            }
            dimension.set_instances(ids)?;
            space.add(Box::new(dimension));
        } else {
            let mut dimension = LearningCurveDimension::new("files", self.folds);
            if let Some(limit) = self.stage_limit {
                dimension = dimension.with_stage_limit(limit);
            }
            if let Some(comparator) = &self.comparator {
                dimension = dimension.with_comparator(Arc::clone(comparator));
            }
            dimension.set_instances(ids)?;
            space.add(Box::new(dimension));
        }
        space.add_static(DIM_FILES_ROOT, vec![DiscriminatorValue::Path(input)]);
        Ok(space)
    }
}

/// Cross-validation-style learning curve: every training size, every
/// held-out bucket, every rotation.
pub struct ExperimentLearningCurve {
    name: String,
    reader: Arc<dyn CorpusReader>,
    folds: i64,
    stage_limit: Option<usize>,
    preprocessor: Arc<dyn Preprocessor>,
    space: ParameterSpace,
    comparator: Option<CogroupFn>,
    collectors: Vec<Arc<dyn MetaCollector>>,
    report_factories: Vec<ReportFactory>,
    collision_policy: CollisionPolicy,
}

impl ExperimentLearningCurve {
    pub fn new(name: impl Into<String>, reader: Arc<dyn CorpusReader>, folds: i64) -> Self {
        Self {
            name: name.into(),
            reader,
            folds,
            stage_limit: None,
            preprocessor: Arc::new(NoopPreprocessor),
            space: ParameterSpace::new(),
            comparator: None,
            collectors: Vec::new(),
            report_factories: Vec::new(),
            collision_policy: CollisionPolicy::default(),
        }
    }

    /// Caps the rotations kept per training-size/validation-bucket stage.
    pub fn with_stage_limit(mut self, limit: usize) -> Self {
        self.stage_limit = Some(limit);
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: Arc<dyn Preprocessor>) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_parameter_space(mut self, space: ParameterSpace) -> Self {
        self.space = space;
        self
    }

    pub fn with_comparator(mut self, comparator: CogroupFn) -> Self {
        self.comparator = Some(comparator);
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
        validate_curve(&self.name, self.folds, self.stage_limit)?;

        let init_name = format!("InitTrain-{}", self.name);
        let init = InitTask::train(&init_name, Arc::clone(&self.reader), self.preprocessor);

        let mut builder = CurveSpaceBuilder::new(self.folds);
        if let Some(limit) = self.stage_limit {
            builder = builder.with_stage_limit(limit);
        }
        if let Some(comparator) = self.comparator {
            builder = builder.with_comparator(comparator);
        }

        let mut inner = BatchTask::new(format!("CurveBatch-{}", self.name));
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

        let mut outer = BatchTask::new(format!("LearningCurve-{}", self.name));
        outer.meta_mut().set_task_type(TaskType::CrossValidation);
        outer.set_execution_policy(ExecutionPolicy::UseExisting);
        outer.set_parameter_space(space);
        outer.add_task(work(init));
        outer.add_task(TaskNode::Batch(inner));
        Ok(TaskNode::Batch(outer))
    }
}

/// Learning curve against a fixed, separately staged test set: training
/// sizes run up to all `k` buckets and every run evaluates the same data.
pub struct ExperimentLearningCurveFixedTestSet {
    name: String,
    reader_train: Arc<dyn CorpusReader>,
    reader_test: Arc<dyn CorpusReader>,
    folds: i64,
    stage_limit: Option<usize>,
    preprocessor: Arc<dyn Preprocessor>,
    space: ParameterSpace,
    comparator: Option<CogroupFn>,
    collectors: Vec<Arc<dyn MetaCollector>>,
    report_factories: Vec<ReportFactory>,
    collision_policy: CollisionPolicy,
}

impl ExperimentLearningCurveFixedTestSet {
    pub fn new(
        name: impl Into<String>,
        reader_train: Arc<dyn CorpusReader>,
        reader_test: Arc<dyn CorpusReader>,
        folds: i64,
    ) -> Self {
        Self {
            name: name.into(),
            reader_train,
            reader_test,
            folds,
            stage_limit: None,
            preprocessor: Arc::new(NoopPreprocessor),
            space: ParameterSpace::new(),
            comparator: None,
            collectors: Vec::new(),
            report_factories: Vec::new(),
            collision_policy: CollisionPolicy::default(),
        }
    }

    pub fn with_stage_limit(mut self, limit: usize) -> Self {
        self.stage_limit = Some(limit);
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: Arc<dyn Preprocessor>) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_parameter_space(mut self, space: ParameterSpace) -> Self {
        self.space = space;
        self
    }

    pub fn with_comparator(mut self, comparator: CogroupFn) -> Self {
        self.comparator = Some(comparator);
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
        validate_curve(&self.name, self.folds, self.stage_limit)?;

        let init_train_name = format!("InitTrain-{}", self.name);
        let init_test_name = format!("InitTest-{}", self.name);
        let init_train = InitTask::train(
            &init_train_name,
            Arc::clone(&self.reader_train),
            Arc::clone(&self.preprocessor),
        );
        let init_test = InitTask::test(
            &init_test_name,
            Arc::clone(&self.reader_test),
            Arc::clone(&self.preprocessor),
        );

        let mut builder = CurveSpaceBuilder::new(self.folds).with_fixed_test_set();
        if let Some(limit) = self.stage_limit {
            builder = builder.with_stage_limit(limit);
        }
        if let Some(comparator) = self.comparator {
            builder = builder.with_comparator(comparator);
        }

        let mut inner = BatchTask::new(format!("CurveBatch-{}", self.name));
        inner.meta_mut().add_import(&init_train_name, OUTPUT_KEY_TRAIN, INPUT_KEY);
        inner.set_execution_policy(ExecutionPolicy::UseExisting);
        inner.set_space_builder(Box::new(builder));
        inner
            .meta_mut()
            .add_report(Box::new(CombinedOutcomeReport::with_policy(self.collision_policy)));

        let pipeline = PipelinePlan {
            experiment: self.name.clone(),
            train_source: (init_train_name, OUTPUT_KEY_TRAIN),
            test_source: Some((init_test_name, OUTPUT_KEY_TEST)),
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
            vec![DiscriminatorValue::Str(self.reader_train.source_id())],
        );
        space.add_static(
            DIM_READER_TEST,
            vec![DiscriminatorValue::Str(self.reader_test.source_id())],
        );

        let mut outer = BatchTask::new(format!("LearningCurveFixedTest-{}", self.name));
        outer.meta_mut().set_task_type(TaskType::CrossValidation);
        outer.set_execution_policy(ExecutionPolicy::UseExisting);
        outer.set_parameter_space(space);
        outer.add_task(work(init_train));
        outer.add_task(work(init_test));
        outer.add_task(TaskNode::Batch(inner));
        Ok(TaskNode::Batch(outer))
    }
}
