//! Experiment orchestration for text classification.
//!
//! `ensayar` expresses a machine-learning experiment as a graph of tasks
//! connected by typed imports: readers stage corpora, meta and feature
//! extraction derive artifacts, an adapter facade trains and evaluates,
//! reports aggregate outcomes. The engine schedules the graph by data
//! readiness, parameterizes it over a swept parameter space and reuses
//! prior executions whose configuration is unchanged.
//!
//! Module map:
//! - `data`: text instances, corpus readers, staged-file helpers
//! - `dimension`: parameter space, fold and learning-curve dimensions
//! - `task`: task trait, batches, the late-bound adapter facade
//! - `adapter`: machine-learning adapter boundary and majority-class baseline
//! - `split`: classification-unit splitting for undersized corpora
//! - `engine`: execution scheduling, caching and record keeping
//! - `storage`: filesystem-backed execution directories
//! - `report`: per-fold outcome aggregation
//! - `experiment`: pre-wired graphs (train/test, cross-validation, curves)
//!
//! # Example
//!
//! ```ignore
//! let reader = VecReader::new("corpus", instances);
//! let experiment = ExperimentCrossValidation::new("reuters", Arc::new(reader), 10)
//!     .with_parameter_space(space);
//! let mut graph = experiment.build()?;
//!
//! let mut engine = Engine::new(FilesystemStorage::new("work")?)?;
//! let root = engine.run(&mut graph)?;
//! ```

pub mod adapter;
pub mod data;
pub mod dimension;
pub mod engine;
pub mod error;
pub mod experiment;
pub mod report;
pub mod split;
pub mod storage;
pub mod task;

pub use adapter::{ClassificationArg, LearningAdapter, MajorityClassAdapter};
pub use data::{CorpusReader, TextInstance, VecReader};
pub use dimension::{DiscriminatorValue, Discriminators, ParameterSpace};
pub use engine::Engine;
pub use error::{Error, Result};
pub use experiment::{
    ExperimentCrossValidation, ExperimentLearningCurve, ExperimentLearningCurveFixedTestSet,
    ExperimentPrediction, ExperimentSaveModel, ExperimentTrainTest,
};
pub use report::CollisionPolicy;
pub use storage::FilesystemStorage;
pub use task::{FeatureMode, LearningMode, TaskNode};
