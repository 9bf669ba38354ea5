//! Deterministic k-fold bucketing.
//!
//! Partitioning is a pure function over a sorted identifier list; the
//! [`FoldDimension`] wraps it as a dimension bundle that yields one
//! training/validation file-list pair per fold. Configuration is explicit:
//! the bundle stays `Unconfigured` until `set_instances` injects the
//! discovered file list, and reading it before that fails.

use std::sync::Arc;

use log::debug;

use crate::dimension::{Dimension, DiscriminatorValue, Discriminators};
use crate::error::{Error, Result};
use crate::task::LEAVE_ONE_OUT;

/// Suffix appended to the bundle name for the training file list.
pub const TRAINING_SUFFIX: &str = "_training";
/// Suffix appended to the bundle name for the held-out file list.
pub const VALIDATION_SUFFIX: &str = "_validation";

/// Predicate deciding whether two identifiers must land in the same fold.
pub type CogroupFn = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Splits `ids` into `k` disjoint, non-empty buckets.
///
/// Identifiers are stably sorted first, then grouped: with a comparator,
/// ids whose pairwise predicate holds are kept together and whole groups
/// are assigned round-robin; without one, each id is its own group. Passing
/// [`LEAVE_ONE_OUT`] as `k` uses one bucket per identifier.
///
/// Fails with `InsufficientData` when `k` exceeds the identifier count and
/// with `EmptyFold` when grouping collapses the ids into fewer cogroups
/// than folds, reporting the sizes of the folds filled so far.
pub fn partition(
    ids: &[String],
    k: i64,
    comparator: Option<&CogroupFn>,
) -> Result<Vec<Vec<String>>> {
    let mut sorted: Vec<String> = ids.to_vec();
    sorted.sort();

    let folds = if k == LEAVE_ONE_OUT { sorted.len() } else { k.max(0) as usize };
    if folds == 0 || folds > sorted.len() {
        return Err(Error::InsufficientData { requested: folds, available: sorted.len() });
    }

    let groups = match comparator {
        Some(cmp) => cogroup(&sorted, cmp),
        None => sorted.into_iter().map(|id| vec![id]).collect(),
    };

    let mut buckets: Vec<Vec<String>> = vec![Vec::new(); folds];
    for (i, group) in groups.into_iter().enumerate() {
        buckets[i % folds].extend(group);
    }

    let mut histogram = String::new();
    for (index, bucket) in buckets.iter().enumerate() {
        if bucket.is_empty() {
            return Err(Error::EmptyFold { index, histogram: histogram.trim_end().to_string() });
        }
        histogram.push_str(&format!("fold {}: size {}. ", index, bucket.len()));
    }

    debug!(
        "partitioned {} identifiers into {} folds: [{}]",
        buckets.iter().map(Vec::len).sum::<usize>(),
        folds,
        buckets.iter().map(|b| b.len().to_string()).collect::<Vec<_>>().join(", ")
    );
    Ok(buckets)
}

/// Groups sorted ids by the transitive closure of the cogroup predicate.
///
/// Each id joins the first existing group whose representative it must
/// cogroup with; the scan order is the sorted id order, so the result is
/// deterministic.
fn cogroup(sorted: &[String], cmp: &CogroupFn) -> Vec<Vec<String>> {
    let mut groups: Vec<Vec<String>> = Vec::new();
    for id in sorted {
        let slot = groups.iter().position(|g| cmp(&g[0], id));
        match slot {
            Some(i) => groups[i].push(id.clone()),
            None => groups.push(vec![id.clone()]),
        }
    }
    groups
}

enum FoldState {
    Unconfigured,
    Configured { buckets: Vec<Vec<String>>, cursor: Option<usize> },
}

/// Dimension bundle sweeping the k folds of a partitioned instance list.
///
/// Per fold `v` the bundle binds `<name>_training` to every bucket except
/// `v` (flattened in bucket order) and `<name>_validation` to bucket `v`.
pub struct FoldDimension {
    name: String,
    requested_folds: i64,
    comparator: Option<CogroupFn>,
    state: FoldState,
}

impl FoldDimension {
    pub fn new(name: impl Into<String>, requested_folds: i64) -> Self {
        Self { name: name.into(), requested_folds, comparator: None, state: FoldState::Unconfigured }
    }

    pub fn with_comparator(mut self, comparator: CogroupFn) -> Self {
        self.comparator = Some(comparator);
        self
    }

    /// Injects the discovered instance identifiers and computes the buckets.
    pub fn set_instances(&mut self, ids: Vec<String>) -> Result<()> {
        let buckets = partition(&ids, self.requested_folds, self.comparator.as_ref())?;
        self.state = FoldState::Configured { buckets, cursor: None };
        Ok(())
    }

    /// The computed buckets; fails before `set_instances`.
    pub fn buckets(&self) -> Result<&[Vec<String>]> {
        match &self.state {
            FoldState::Configured { buckets, .. } => Ok(buckets),
            FoldState::Unconfigured => Err(Error::NotConfigured(self.name.clone())),
        }
    }
}

impl Dimension for FoldDimension {
    fn name(&self) -> &str {
        &self.name
    }

    fn rewind(&mut self) {
        if let FoldState::Configured { cursor, .. } = &mut self.state {
            *cursor = None;
        }
    }

    fn has_next(&self) -> bool {
        match &self.state {
            FoldState::Unconfigured => false,
            FoldState::Configured { buckets, cursor } => match cursor {
                None => !buckets.is_empty(),
                Some(i) => i + 1 < buckets.len(),
            },
        }
    }

    fn advance(&mut self) -> Result<()> {
        match &mut self.state {
            FoldState::Unconfigured => Err(Error::NotConfigured(self.name.clone())),
            FoldState::Configured { buckets, cursor } => {
                let next = match cursor {
                    None => 0,
                    Some(i) => *i + 1,
                };
                if next >= buckets.len() {
                    return Err(Error::NotConfigured(self.name.clone()));
                }
                *cursor = Some(next);
                Ok(())
            }
        }
    }

    fn current(&self) -> Result<Discriminators> {
        match &self.state {
            FoldState::Unconfigured => Err(Error::NotConfigured(self.name.clone())),
            FoldState::Configured { buckets, cursor } => {
                let v = cursor.ok_or_else(|| Error::NotConfigured(self.name.clone()))?;
                let mut training = Vec::new();
                for (i, bucket) in buckets.iter().enumerate() {
                    if i != v {
                        training.extend(bucket.iter().cloned());
                    }
                }
                let mut bindings = Discriminators::new();
                bindings.set(
                    format!("{}{}", self.name, TRAINING_SUFFIX),
                    DiscriminatorValue::List(training),
                );
                bindings.set(
                    format!("{}{}", self.name, VALIDATION_SUFFIX),
                    DiscriminatorValue::List(buckets[v].clone()),
                );
                Ok(bindings)
            }
        }
    }
}
