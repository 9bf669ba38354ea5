//! Parameter space and dimensions.
//!
//! A [`ParameterSpace`] sweeps an experiment over configuration axes. A
//! static dimension holds a fixed value list; dynamic dimensions (fold
//! bundles, learning-curve bundles, function dimensions) compute their
//! values lazily, after a configuration has been injected. Each point of
//! the space is a [`Discriminators`] map: named values that parameterize
//! task execution and form the basis of cache keys.
//!
//! ## Architecture
//!
//! - `fold`: deterministic k-fold bucketing with comparator cogrouping
//! - `curve`: learning-curve run scheduling (rotations, dedup, stage limit)
//! - `function`: late-bound value axes computed from resolved configuration
//!
//! Iteration protocol, shared by every dimension: `rewind()` places the
//! cursor before the first value, `advance()` moves it, `current()` reads
//! the bindings at the cursor. A dynamic dimension must not yield a value
//! before `configure()` has injected its inputs.

pub mod fold;
pub mod function;

mod curve;

pub use curve::{FixedTestSetCurveDimension, LearningCurveDimension, TrainTestSplit};
pub use fold::{partition, CogroupFn, FoldDimension};
pub use function::DynamicFunctionDimension;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::adapter::{render_args, ClassificationArg};
use crate::error::{Error, Result};

/// A named configuration value.
///
/// Values render to a canonical string for cache keys and persisted
/// execution records; adapters render as their name.
#[derive(Clone)]
pub enum DiscriminatorValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Path(PathBuf),
    List(Vec<String>),
    Args(Vec<ClassificationArg>),
}

impl DiscriminatorValue {
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    /// Canonical rendering, stable across runs for identical logical values.
    pub fn render(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Path(p) => p.display().to_string(),
            Self::List(items) => items.join(","),
            Self::Args(args) => render_args(args),
        }
    }
}

impl fmt::Debug for DiscriminatorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "Str({s:?})"),
            Self::Int(i) => write!(f, "Int({i})"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Path(p) => write!(f, "Path({})", p.display()),
            Self::List(items) => write!(f, "List({items:?})"),
            Self::Args(args) => write!(f, "Args({args:?})"),
        }
    }
}

/// Resolved configuration of one parameter-space point: name → value.
#[derive(Clone, Default)]
pub struct Discriminators {
    values: BTreeMap<String, DiscriminatorValue>,
}

impl Discriminators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: DiscriminatorValue) {
        self.values.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: DiscriminatorValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&DiscriminatorValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn str_value(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(DiscriminatorValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn list_value(&self, name: &str) -> Option<&[String]> {
        match self.values.get(name) {
            Some(DiscriminatorValue::List(items)) => Some(items),
            _ => None,
        }
    }

    pub fn path_value(&self, name: &str) -> Option<&PathBuf> {
        match self.values.get(name) {
            Some(DiscriminatorValue::Path(p)) => Some(p),
            _ => None,
        }
    }

    pub fn args_value(&self, name: &str) -> Option<&[ClassificationArg]> {
        match self.values.get(name) {
            Some(DiscriminatorValue::Args(args)) => Some(args),
            _ => None,
        }
    }

    /// The classification-argument list, required for adapter resolution.
    pub fn classification_args(&self) -> Result<&[ClassificationArg]> {
        self.args_value(crate::task::DIM_CLASSIFICATION_ARGS).ok_or_else(|| {
            Error::Configuration(format!(
                "discriminator [{}] is not set",
                crate::task::DIM_CLASSIFICATION_ARGS
            ))
        })
    }

    /// Right-biased merge: `other` wins on name clashes.
    pub fn merged(&self, other: &Discriminators) -> Discriminators {
        let mut values = self.values.clone();
        for (k, v) in &other.values {
            values.insert(k.clone(), v.clone());
        }
        Discriminators { values }
    }

    /// Deterministic rendered form, sorted by name.
    pub fn rendered(&self) -> BTreeMap<String, String> {
        self.values.iter().map(|(k, v)| (k.clone(), v.render())).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DiscriminatorValue)> {
        self.values.iter()
    }
}

impl fmt::Debug for Discriminators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.iter().map(|(k, v)| (k, v.render()))).finish()
    }
}

/// One configuration axis of a parameter space.
///
/// `current()` returns a full binding map because bundle dimensions (folds,
/// learning-curve runs) contribute several names per value.
pub trait Dimension: Send {
    fn name(&self) -> &str;

    /// Injects the resolved outer configuration. Static dimensions ignore it.
    fn configure(&mut self, config: &Discriminators) -> Result<()> {
        let _ = config;
        Ok(())
    }

    /// Places the cursor before the first value.
    fn rewind(&mut self);

    fn has_next(&self) -> bool;

    fn advance(&mut self) -> Result<()>;

    fn current(&self) -> Result<Discriminators>;
}

/// Fixed value list under a single name.
pub struct StaticDimension {
    name: String,
    values: Vec<DiscriminatorValue>,
    cursor: Option<usize>,
}

impl StaticDimension {
    pub fn new(name: impl Into<String>, values: Vec<DiscriminatorValue>) -> Self {
        Self { name: name.into(), values, cursor: None }
    }
}

impl Dimension for StaticDimension {
    fn name(&self) -> &str {
        &self.name
    }

    fn rewind(&mut self) {
        self.cursor = None;
    }

    fn has_next(&self) -> bool {
        match self.cursor {
            None => !self.values.is_empty(),
            Some(i) => i + 1 < self.values.len(),
        }
    }

    fn advance(&mut self) -> Result<()> {
        let next = match self.cursor {
            None => 0,
            Some(i) => i + 1,
        };
        if next >= self.values.len() {
            return Err(Error::NotConfigured(self.name.clone()));
        }
        self.cursor = Some(next);
        Ok(())
    }

    fn current(&self) -> Result<Discriminators> {
        let idx = self.cursor.ok_or_else(|| Error::NotConfigured(self.name.clone()))?;
        let mut bindings = Discriminators::new();
        bindings.set(&self.name, self.values[idx].clone());
        Ok(bindings)
    }
}

/// Ordered collection of dimensions, swept as a cartesian product.
#[derive(Default)]
pub struct ParameterSpace {
    dimensions: Vec<Box<dyn Dimension>>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, dimension: Box<dyn Dimension>) {
        self.dimensions.push(dimension);
    }

    /// Adds a fixed single-name dimension.
    pub fn add_static(&mut self, name: impl Into<String>, values: Vec<DiscriminatorValue>) {
        self.add(Box::new(StaticDimension::new(name, values)));
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Materializes every point of the space on top of an inherited base
    /// configuration. The first-added dimension varies slowest. A space
    /// with no dimensions yields one point: the base itself.
    ///
    /// Every dimension is configured with the base before iteration, so
    /// dynamic dimensions see the inherited values they depend on.
    pub fn points(&mut self, base: &Discriminators) -> Result<Vec<Discriminators>> {
        let mut per_dimension: Vec<Vec<Discriminators>> = Vec::with_capacity(self.dimensions.len());
        for dim in &mut self.dimensions {
            dim.configure(base)?;
            dim.rewind();
            let mut values = Vec::new();
            while dim.has_next() {
                dim.advance()?;
                values.push(dim.current()?);
            }
            if values.is_empty() {
                return Err(Error::Configuration(format!(
                    "dimension [{}] yields no values",
                    dim.name()
                )));
            }
            per_dimension.push(values);
        }

        let mut points = vec![base.clone()];
        for values in &per_dimension {
            let mut expanded = Vec::with_capacity(points.len() * values.len());
            for point in &points {
                for bindings in values {
                    expanded.push(point.merged(bindings));
                }
            }
            points = expanded;
        }
        Ok(points)
    }
}
