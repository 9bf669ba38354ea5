//! Task model: work units, batches, the adapter facade and the wire names
//! shared by producers and consumers.
//!
//! ## Architecture
//!
//! - `core`: init, outcome-collection, meta and feature-extraction shells
//! - `batch`: nested task graphs with a parameter space and execution policy
//! - `facade`: late-bound delegate task resolved from the adapter binding
//!
//! A task declares its data dependencies as imports (source task, source
//! key, local key) and the discriminator names it is sensitive to. Cross
//! task data flow happens exclusively through those declared edges; every
//! execution owns its output folder.

pub mod batch;
pub mod core;
pub mod facade;

pub use batch::{BatchTask, ExecutionPolicy, SpaceBuilder, TaskNode};
pub use core::{ExtractFeaturesTask, InitTask, MetaCollector, MetaInfoTask, OutcomeCollectionTask};
pub use facade::{FacadeKind, FacadeTask};


use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::context::TaskContext;
use crate::error::{Error, Result};
use crate::report::Report;

// Discriminator names.
pub const DIM_READER_TRAIN: &str = "readerTrain";
pub const DIM_READER_TEST: &str = "readerTest";
pub const DIM_CLASSIFICATION_ARGS: &str = "classificationArguments";
pub const DIM_LEARNING_MODE: &str = "learningMode";
pub const DIM_FEATURE_MODE: &str = "featureMode";
pub const DIM_FEATURE_SET: &str = "featureSet";
pub const DIM_FILES_ROOT: &str = "filesRoot";
pub const DIM_FILES_TRAINING: &str = "files_training";
pub const DIM_FILES_VALIDATION: &str = "files_validation";
pub const DIM_NUM_TRAINING_FOLDS: &str = "numTrainingFolds";
pub const DIM_OUTPUT_FOLDER: &str = "outputFolder";

// Storage keys shared by convention between producers and consumers.
pub const OUTPUT_KEY_TRAIN: &str = "preprocessorOutputTrain";
pub const OUTPUT_KEY_TEST: &str = "preprocessorOutputTest";
pub const META_KEY: &str = "meta";
pub const INPUT_KEY: &str = "input";
pub const OUTPUT_KEY: &str = "output";
pub const OUTCOMES_KEY: &str = "outcomes";
pub const OUTCOMES_INPUT_KEY: &str = "outcomesFolder";
pub const COLLECTION_INPUT_KEY_TRAIN: &str = "inputTrain";
pub const COLLECTION_INPUT_KEY_TEST: &str = "inputTest";
pub const TEST_TASK_INPUT_KEY_TRAINING_DATA: &str = "input.train";
pub const TEST_TASK_INPUT_KEY_TEST_DATA: &str = "input.test";
pub const TEST_TASK_OUTPUT_KEY: &str = "output";
pub const UNIT_SPLIT_KEY: &str = "unitSplit";

// File names.
pub const FILENAME_OUTCOMES: &str = "outcomes.txt";
pub const ID_OUTCOME_KEY: &str = "id2outcome.txt";
pub const BASELINE_MAJORITY_ID_OUTCOME_KEY: &str = "baselineMajority2outcome.txt";
pub const BASELINE_RANDOM_ID_OUTCOME_KEY: &str = "baselineRandom2outcome.txt";
pub const FILE_COMBINED_ID_OUTCOME_KEY: &str = "combinedId2Outcome.txt";

/// Attribute under which the semantic task type is mirrored.
pub const TC_TASK_TYPE: &str = "TcTaskType";

/// Requesting this fold count partitions one instance per fold.
pub const LEAVE_ONE_OUT: i64 = -1;

/// Gold value recorded for unlabeled prediction input.
pub const UNKNOWN_OUTCOME: &str = "UNKNOWN_OUTCOME";

/// Semantic task tag consumed by reports and downstream filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskType {
    #[serde(rename = "INIT_TRAIN")]
    InitTrain,
    #[serde(rename = "INIT_TEST")]
    InitTest,
    #[serde(rename = "COLLECTION")]
    Collection,
    #[serde(rename = "META")]
    Meta,
    #[serde(rename = "FEATURE_EXTRACTION_TRAIN")]
    FeatureExtractionTrain,
    #[serde(rename = "FEATURE_EXTRACTION_TEST")]
    FeatureExtractionTest,
    #[serde(rename = "MACHINE_LEARNING_ADAPTER")]
    MachineLearningAdapter,
    #[serde(rename = "FACADE_TASK")]
    Facade,
    #[serde(rename = "CROSS_VALIDATION")]
    CrossValidation,
    #[serde(rename = "EVALUATION")]
    Evaluation,
}

impl TaskType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InitTrain => "INIT_TRAIN",
            Self::InitTest => "INIT_TEST",
            Self::Collection => "COLLECTION",
            Self::Meta => "META",
            Self::FeatureExtractionTrain => "FEATURE_EXTRACTION_TRAIN",
            Self::FeatureExtractionTest => "FEATURE_EXTRACTION_TEST",
            Self::MachineLearningAdapter => "MACHINE_LEARNING_ADAPTER",
            Self::Facade => "FACADE_TASK",
            Self::CrossValidation => "CROSS_VALIDATION",
            Self::Evaluation => "EVALUATION",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How instances are grouped for learning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningMode {
    SingleLabel,
    MultiLabel,
    Regression,
}

impl LearningMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SingleLabel => "singleLabel",
            Self::MultiLabel => "multiLabel",
            Self::Regression => "regression",
        }
    }
}

impl FromStr for LearningMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "singleLabel" => Ok(Self::SingleLabel),
            "multiLabel" => Ok(Self::MultiLabel),
            "regression" => Ok(Self::Regression),
            other => {
                Err(Error::Configuration(format!("unknown learning mode [{other}]")))
            }
        }
    }
}

/// Granularity of the classification target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureMode {
    Document,
    Unit,
    Sequence,
    Pair,
}

impl FeatureMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Unit => "unit",
            Self::Sequence => "sequence",
            Self::Pair => "pair",
        }
    }
}

/// One declared data dependency: read the producer's `source_key` folder
/// under this task's `local_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskImport {
    pub source_task: String,
    pub source_key: String,
    pub local_key: String,
}

/// Identity and wiring shared by every task node.
pub struct TaskMeta {
    name: String,
    task_type: Option<TaskType>,
    imports: Vec<TaskImport>,
    attributes: BTreeMap<String, String>,
    discriminators: Vec<String>,
    reports: Vec<Box<dyn Report>>,
}

impl TaskMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task_type: None,
            imports: Vec::new(),
            attributes: BTreeMap::new(),
            discriminators: Vec::new(),
            reports: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn task_type(&self) -> Option<TaskType> {
        self.task_type
    }

    /// Tags the task and mirrors the tag as the `TcTaskType` attribute.
    pub fn set_task_type(&mut self, task_type: TaskType) {
        self.task_type = Some(task_type);
        self.attributes.insert(TC_TASK_TYPE.into(), task_type.as_str().into());
    }

    pub fn add_import(&mut self, source_task: &str, source_key: &str, local_key: &str) {
        self.imports.push(TaskImport {
            source_task: source_task.into(),
            source_key: source_key.into(),
            local_key: local_key.into(),
        });
    }

    pub fn add_import_edge(&mut self, import: TaskImport) {
        self.imports.push(import);
    }

    pub fn imports(&self) -> &[TaskImport] {
        &self.imports
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Declares a discriminator this task is sensitive to; recorded with
    /// each execution.
    pub fn declare_discriminator(&mut self, name: impl Into<String>) {
        self.discriminators.push(name.into());
    }

    pub fn declared_discriminators(&self) -> &[String] {
        &self.discriminators
    }

    pub fn add_report(&mut self, report: Box<dyn Report>) {
        self.reports.push(report);
    }

    pub fn reports_mut(&mut self) -> &mut [Box<dyn Report>] {
        &mut self.reports
    }
}

/// A unit of work executed once per parameter-space point.
pub trait Task: Send {
    fn meta(&self) -> &TaskMeta;

    fn meta_mut(&mut self) -> &mut TaskMeta;

    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<()>;
}

impl std::fmt::Debug for dyn Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("name", &self.meta().name()).finish()
    }
}
