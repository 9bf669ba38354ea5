//! Core pipeline task shells: staging, vocabulary collection, meta
//! collection and feature extraction.
//!
//! These tasks own the orchestration around external collaborators; the
//! interesting NLP and feature machinery stays behind the `Preprocessor`,
//! `MetaCollector` and adapter `DataSink` seams.

use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use log::info;

use crate::adapter::resolve_adapter;
use crate::data::{list_staged, read_instance, write_instance, CorpusReader, Preprocessor, TextInstance};
use crate::engine::context::TaskContext;
use crate::error::Result;
use crate::storage::AccessMode;
use crate::task::{
    Task, TaskMeta, TaskType, COLLECTION_INPUT_KEY_TEST, COLLECTION_INPUT_KEY_TRAIN,
    DIM_CLASSIFICATION_ARGS, DIM_FEATURE_MODE, DIM_FEATURE_SET, DIM_FILES_ROOT,
    DIM_FILES_TRAINING, DIM_FILES_VALIDATION, DIM_LEARNING_MODE, DIM_READER_TEST,
    DIM_READER_TRAIN, FILENAME_OUTCOMES, INPUT_KEY, META_KEY, OUTCOMES_KEY, OUTPUT_KEY,
    OUTPUT_KEY_TRAIN, OUTPUT_KEY_TEST,
};

/// Stages the corpus: reads raw instances, preprocesses them and writes
/// one JSON file per instance. Always the first task of a batch.
pub struct InitTask {
    meta: TaskMeta,
    reader: Arc<dyn CorpusReader>,
    preprocessor: Arc<dyn Preprocessor>,
    output_key: &'static str,
}

impl InitTask {
    pub fn train(
        name: impl Into<String>,
        reader: Arc<dyn CorpusReader>,
        preprocessor: Arc<dyn Preprocessor>,
    ) -> Self {
        let mut meta = TaskMeta::new(name);
        meta.set_task_type(TaskType::InitTrain);
        meta.declare_discriminator(DIM_READER_TRAIN);
        meta.declare_discriminator(DIM_LEARNING_MODE);
        meta.declare_discriminator(DIM_FEATURE_MODE);
        Self { meta, reader, preprocessor, output_key: OUTPUT_KEY_TRAIN }
    }

    pub fn test(
        name: impl Into<String>,
        reader: Arc<dyn CorpusReader>,
        preprocessor: Arc<dyn Preprocessor>,
    ) -> Self {
        let mut meta = TaskMeta::new(name);
        meta.set_task_type(TaskType::InitTest);
        meta.declare_discriminator(DIM_READER_TEST);
        meta.declare_discriminator(DIM_LEARNING_MODE);
        meta.declare_discriminator(DIM_FEATURE_MODE);
        Self { meta, reader, preprocessor, output_key: OUTPUT_KEY_TEST }
    }

    /// Storage key this init task stages under.
    pub fn output_key(&self) -> &'static str {
        self.output_key
    }
}

impl Task for InitTask {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }

    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        let out = ctx.folder(self.output_key, AccessMode::ReadWrite)?;
        let mut staged = 0usize;
        for mut instance in self.reader.read()? {
            self.preprocessor.process(&mut instance)?;
            write_instance(&out, &instance)?;
            staged += 1;
        }
        info!("[{}] staged {staged} instances under [{}]", self.meta.name(), self.output_key);
        Ok(())
    }
}

/// Collects the outcome vocabulary over the staged train (and, when
/// wired, test) instances into a sorted one-label-per-line file.
pub struct OutcomeCollectionTask {
    meta: TaskMeta,
}

impl OutcomeCollectionTask {
    pub fn new(name: impl Into<String>) -> Self {
        let mut meta = TaskMeta::new(name);
        meta.set_task_type(TaskType::Collection);
        Self { meta }
    }
}

impl Task for OutcomeCollectionTask {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }

    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        let mut outcomes = std::collections::BTreeSet::new();
        for key in [COLLECTION_INPUT_KEY_TRAIN, COLLECTION_INPUT_KEY_TEST] {
            if !ctx.has_import(key) {
                continue;
            }
            let dir = ctx.folder(key, AccessMode::ReadOnly)?;
            for path in list_staged(&dir)? {
                let instance = read_instance(&path)?;
                outcomes.extend(instance.outcomes.into_iter().filter(|o| !o.is_empty()));
            }
        }

        let out = ctx.folder(OUTCOMES_KEY, AccessMode::ReadWrite)?;
        let mut file = std::fs::File::create(out.join(FILENAME_OUTCOMES))?;
        for outcome in &outcomes {
            writeln!(file, "{outcome}")?;
        }
        info!("[{}] collected {} distinct outcomes", self.meta.name(), outcomes.len());
        Ok(())
    }
}

/// Collects corpus-level metadata (frequency counts, n-gram inventories
/// and similar) over the training instances.
pub trait MetaCollector: Send + Sync {
    fn id(&self) -> &str;
    fn collect(&self, instances: &[TextInstance], out_dir: &Path) -> Result<()>;
}

/// Runs the configured meta collectors over the per-run training slice.
pub struct MetaInfoTask {
    meta: TaskMeta,
    collectors: Vec<Arc<dyn MetaCollector>>,
}

impl MetaInfoTask {
    pub fn new(name: impl Into<String>) -> Self {
        let mut meta = TaskMeta::new(name);
        meta.set_task_type(TaskType::Meta);
        meta.declare_discriminator(DIM_FEATURE_SET);
        meta.declare_discriminator(DIM_FEATURE_MODE);
        meta.declare_discriminator(DIM_FILES_ROOT);
        meta.declare_discriminator(DIM_FILES_TRAINING);
        Self { meta, collectors: Vec::new() }
    }

    pub fn add_collector(&mut self, collector: Arc<dyn MetaCollector>) {
        self.collectors.push(collector);
    }
}

impl Task for MetaInfoTask {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }

    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        let instances = select_instances(ctx, DIM_FILES_TRAINING)?;
        let out = ctx.folder(META_KEY, AccessMode::ReadWrite)?;
        for collector in &self.collectors {
            collector.collect(&instances, &out)?;
        }
        Ok(())
    }
}

/// Materializes the per-run instance slice in the learner's input format
/// through the adapter's data sink.
pub struct ExtractFeaturesTask {
    meta: TaskMeta,
    is_test: bool,
}

impl ExtractFeaturesTask {
    fn new(name: impl Into<String>, is_test: bool) -> Self {
        let mut meta = TaskMeta::new(name);
        meta.set_task_type(if is_test {
            TaskType::FeatureExtractionTest
        } else {
            TaskType::FeatureExtractionTrain
        });
        meta.declare_discriminator(DIM_FILES_ROOT);
        meta.declare_discriminator(DIM_FILES_TRAINING);
        meta.declare_discriminator(DIM_FILES_VALIDATION);
        meta.declare_discriminator(DIM_LEARNING_MODE);
        meta.declare_discriminator(DIM_FEATURE_MODE);
        meta.declare_discriminator(DIM_FEATURE_SET);
        meta.declare_discriminator(DIM_CLASSIFICATION_ARGS);
        Self { meta, is_test }
    }

    pub fn train(name: impl Into<String>) -> Self {
        Self::new(name, false)
    }

    pub fn test(name: impl Into<String>) -> Self {
        Self::new(name, true)
    }
}

impl Task for ExtractFeaturesTask {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }

    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        let selector = if self.is_test { DIM_FILES_VALIDATION } else { DIM_FILES_TRAINING };
        let instances = select_instances(ctx, selector)?;
        let adapter = resolve_adapter(ctx.config().classification_args()?)?;
        let out = ctx.folder(OUTPUT_KEY, AccessMode::ReadWrite)?;
        adapter.data_sink().write(&out, &instances)?;
        info!(
            "[{}] extracted {} instances via [{}]",
            self.meta.name(),
            instances.len(),
            adapter.name()
        );
        Ok(())
    }
}

/// Per-run instance selection: an explicit file-list discriminator when
/// the surrounding batch swept one in, otherwise the whole imported input
/// folder.
fn select_instances(ctx: &mut TaskContext<'_>, list_name: &str) -> Result<Vec<TextInstance>> {
    if let Some(files) = ctx.config().list_value(list_name) {
        return files.iter().map(|f| read_instance(Path::new(f))).collect();
    }
    let dir = ctx.folder(INPUT_KEY, AccessMode::ReadOnly)?;
    list_staged(&dir)?.iter().map(|p| read_instance(p)).collect()
}
