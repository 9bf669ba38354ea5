//! Learning-adapter boundary.
//!
//! An adapter supplies everything the framework must not know about a
//! concrete learner: the test task, the model-serialization task, optional
//! outcome/baseline reports and the data sink that materializes extracted
//! instances in the learner's input format. Adapters travel through the
//! parameter space as the first element of the `classificationArguments`
//! discriminator, so one experiment graph can sweep several learners.
//!
//! # Example
//!
//! ```ignore
//! use ensayar::adapter::{ClassificationArg, MajorityClassAdapter, resolve_adapter};
//! use std::sync::Arc;
//!
//! let args = vec![
//!     ClassificationArg::adapter(MajorityClassAdapter::new()),
//!     ClassificationArg::param("-ratio 0.75"),
//! ];
//! let adapter = resolve_adapter(&args)?;
//! assert_eq!(adapter.name(), "MajorityClass");
//! ```

mod baseline;

pub use baseline::{
    read_features, MajorityBaselineReport, MajorityClassAdapter, MajorityModel,
    MajoritySaveModelTask, MajorityTestTask, TsvDataSink, MODEL_FILE,
};

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::data::TextInstance;
use crate::error::{Error, Result};
use crate::report::Report;
use crate::task::Task;

/// File name the bundled data sink writes extracted instances to.
pub const FEATURES_FILE: &str = "features.txt";

/// Writes extracted instances into a task's output folder in whatever
/// format the learner consumes.
pub trait DataSink: Send {
    fn write(&mut self, dir: &Path, instances: &[TextInstance]) -> Result<()>;
}

/// Capability interface of a pluggable learner.
pub trait LearningAdapter: Send + Sync {
    /// Stable name; rendered into discriminators and execution records.
    fn name(&self) -> &str;

    /// Fresh task that trains on the extracted training data and writes an
    /// `id2outcome.txt` prediction file for the extracted test data.
    fn test_task(&self) -> Box<dyn Task>;

    /// Fresh task that trains and serializes the model to the configured
    /// output folder.
    fn save_model_task(&self) -> Box<dyn Task>;

    /// Sink used by feature extraction to materialize instances.
    fn data_sink(&self) -> Box<dyn DataSink>;

    /// Optional report producing an additional outcome file.
    fn outcome_report(&self) -> Option<Box<dyn Report>> {
        None
    }

    /// Optional majority-class baseline outcome report.
    fn majority_baseline_report(&self) -> Option<Box<dyn Report>> {
        None
    }

    /// Optional random baseline outcome report.
    fn random_baseline_report(&self) -> Option<Box<dyn Report>> {
        None
    }
}

impl fmt::Debug for dyn LearningAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LearningAdapter({})", self.name())
    }
}

/// One element of the `classificationArguments` discriminator value.
///
/// The first element must be the adapter itself; the remaining elements are
/// opaque parameter strings passed through to the learner.
#[derive(Clone)]
pub enum ClassificationArg {
    Adapter(Arc<dyn LearningAdapter>),
    Param(String),
}

impl ClassificationArg {
    pub fn adapter(adapter: impl LearningAdapter + 'static) -> Self {
        Self::Adapter(Arc::new(adapter))
    }

    pub fn param(value: impl Into<String>) -> Self {
        Self::Param(value.into())
    }

    /// Canonical string form used in cache keys and persisted records.
    pub fn render(&self) -> String {
        match self {
            Self::Adapter(a) => a.name().to_string(),
            Self::Param(p) => p.clone(),
        }
    }
}

impl fmt::Debug for ClassificationArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adapter(a) => write!(f, "Adapter({})", a.name()),
            Self::Param(p) => write!(f, "Param({p})"),
        }
    }
}

/// Resolves the adapter from a classification-argument list.
///
/// The contract is positional: the adapter must be the first element.
/// Anything else fails immediately; retrying without a configuration change
/// would reproduce the error.
pub fn resolve_adapter(args: &[ClassificationArg]) -> Result<Arc<dyn LearningAdapter>> {
    match args.first() {
        Some(ClassificationArg::Adapter(adapter)) => Ok(Arc::clone(adapter)),
        Some(ClassificationArg::Param(p)) => Err(Error::InvalidAdapter(p.clone())),
        None => Err(Error::InvalidAdapter("<empty argument list>".into())),
    }
}

/// Renders a full argument list the way it appears in execution records.
pub fn render_args(args: &[ClassificationArg]) -> String {
    args.iter().map(ClassificationArg::render).collect::<Vec<_>>().join(" ")
}
