//! Crate-wide error type.
//!
//! Every failure mode of the experiment engine is fatal and propagates
//! unchanged to the caller of `Engine::run`; there is no local recovery.

use thiserror::Error;

/// Errors raised while building or running an experiment graph.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid build-time configuration (missing experiment name, bad fold
    /// count, missing discriminator, import misuse).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Fewer classification units available than the experiment requires.
    #[error("insufficient data: need {requested} classification units, have {available}")]
    InsufficientData { requested: usize, available: usize },

    /// A fold came out empty during bucket assignment. The histogram lists
    /// the sizes of the folds filled before the failure.
    #[error("detected an empty fold: {index}. There may be fewer cogroups than requested folds. Previous folds: {histogram}")]
    EmptyFold { index: usize, histogram: String },

    /// The first classification argument did not carry a learning adapter.
    #[error("first classification argument must be a learning adapter, got [{0}]")]
    InvalidAdapter(String),

    /// A dynamic dimension was read before its configuration was injected
    /// or before iteration started.
    #[error("dimension [{0}] has no current value: not configured or not advanced")]
    NotConfigured(String),

    /// The same instance id appeared in two merged outcome files while the
    /// collision policy was set to fail.
    #[error("duplicate instance id across merged outcome files: [{0}]")]
    OutcomeCollision(String),

    /// The scheduler could not make progress because some tasks import from
    /// producers that never execute.
    #[error("unable to resolve data dependencies for tasks: {0}")]
    UnresolvedDependency(String),

    /// A task imports from a source task with no completed execution.
    #[error("task [{task}] imports from [{source}] which has no completed execution")]
    MissingImport { task: String, r#source: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
