//! Learning-curve run scheduling.
//!
//! Given k buckets, a learning-curve bundle enumerates training subsets of
//! every size, built as contiguous wrap-around rotations over the bucket
//! indices. The cross-validation variant holds one bucket out per run; the
//! fixed-test-set variant trains on rotations over all buckets and leaves
//! evaluation to an externally staged test set.

use std::fmt;

use crate::dimension::fold::{partition, CogroupFn, TRAINING_SUFFIX, VALIDATION_SUFFIX};
use crate::dimension::{Dimension, DiscriminatorValue, Discriminators};
use crate::error::{Error, Result};
use crate::task::DIM_NUM_TRAINING_FOLDS;

/// One scheduled learning-curve run: training bucket indices (sorted) and
/// the held-out validation bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    train: Vec<usize>,
    test: usize,
}

impl TrainTestSplit {
    pub fn new(mut train: Vec<usize>, test: usize) -> Self {
        train.sort_unstable();
        Self { train, test }
    }

    pub fn train(&self) -> &[usize] {
        &self.train
    }

    pub fn test(&self) -> usize {
        self.test
    }
}

impl fmt::Display for TrainTestSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let train =
            self.train.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
        write!(f, "[Train: ({train}), Test: ({})]", self.test)
    }
}

/// Contiguous wrap-around slice of `len` indices starting at `start`.
fn rotation(seq: &[usize], start: usize, len: usize) -> Vec<usize> {
    (0..len).map(|offset| seq[(start + offset) % seq.len()]).collect()
}

/// Rotations for one `(size, excluded)` stage, deduplicated and limited.
///
/// All rotations of the full remaining sequence select the same set, so
/// only the first is kept at full size. A stage limit keeps the first
/// `limit` rotations in generation order, never a sample.
fn stage_rotations(
    seq: &[usize],
    size: usize,
    limit: Option<usize>,
) -> Vec<Vec<usize>> {
    let mut stages: Vec<Vec<usize>> =
        (0..seq.len()).map(|start| rotation(seq, start, size)).collect();
    if size == seq.len() {
        stages.truncate(1);
    }
    if let Some(l) = limit {
        stages.truncate(l);
    }
    stages
}

fn validate_schedule(folds: i64, limit: Option<usize>, name: &str) -> Result<()> {
    if folds < 2 {
        return Err(Error::Configuration(format!(
            "learning curve [{name}] requires at least 2 folds, got [{folds}]"
        )));
    }
    if limit == Some(0) {
        return Err(Error::Configuration(format!(
            "learning curve [{name}] stage limit must be at least 1"
        )));
    }
    Ok(())
}

enum CurveState {
    Unconfigured,
    Configured { buckets: Vec<Vec<String>>, runs: Vec<TrainTestSplit>, cursor: Option<usize> },
}

/// Cross-validation learning-curve bundle.
///
/// Runs cover every training size `1..=k-1`; for each size and each
/// validation bucket, up to `k-1` rotations of the remaining buckets are
/// scheduled. Per run the bundle binds `<name>_training`,
/// `<name>_validation` and the `numTrainingFolds` bucket labels used
/// downstream to group same-size runs when plotting the curve.
pub struct LearningCurveDimension {
    name: String,
    requested_folds: i64,
    comparator: Option<CogroupFn>,
    stage_limit: Option<usize>,
    state: CurveState,
}

impl LearningCurveDimension {
    pub fn new(name: impl Into<String>, requested_folds: i64) -> Self {
        Self {
            name: name.into(),
            requested_folds,
            comparator: None,
            stage_limit: None,
            state: CurveState::Unconfigured,
        }
    }

    pub fn with_comparator(mut self, comparator: CogroupFn) -> Self {
        self.comparator = Some(comparator);
        self
    }

    /// Caps the training-subset variations kept per `(size, validation)`
    /// stage. Zero is rejected when the instances are injected.
    pub fn with_stage_limit(mut self, limit: usize) -> Self {
        self.stage_limit = Some(limit);
        self
    }

    /// Injects the discovered instance identifiers, computes the buckets
    /// and schedules every run.
    pub fn set_instances(&mut self, ids: Vec<String>) -> Result<()> {
        validate_schedule(self.requested_folds, self.stage_limit, &self.name)?;
        let buckets = partition(&ids, self.requested_folds, self.comparator.as_ref())?;
        let k = buckets.len();

        let mut runs = Vec::new();
        for size in 1..k {
            for v in 0..k {
                let seq: Vec<usize> = (0..k).filter(|&i| i != v).collect();
                for stage in stage_rotations(&seq, size, self.stage_limit) {
                    runs.push(TrainTestSplit::new(stage, v));
                }
            }
        }
        self.state = CurveState::Configured { buckets, runs, cursor: None };
        Ok(())
    }

    /// The scheduled runs; fails before `set_instances`.
    pub fn runs(&self) -> Result<&[TrainTestSplit]> {
        match &self.state {
            CurveState::Configured { runs, .. } => Ok(runs),
            CurveState::Unconfigured => Err(Error::NotConfigured(self.name.clone())),
        }
    }
}

impl Dimension for LearningCurveDimension {
    fn name(&self) -> &str {
        &self.name
    }

    fn rewind(&mut self) {
        if let CurveState::Configured { cursor, .. } = &mut self.state {
            *cursor = None;
        }
    }

    fn has_next(&self) -> bool {
        match &self.state {
            CurveState::Unconfigured => false,
            CurveState::Configured { runs, cursor, .. } => match cursor {
                None => !runs.is_empty(),
                Some(i) => i + 1 < runs.len(),
            },
        }
    }

    fn advance(&mut self) -> Result<()> {
        match &mut self.state {
            CurveState::Unconfigured => Err(Error::NotConfigured(self.name.clone())),
            CurveState::Configured { runs, cursor, .. } => {
                let next = match cursor {
                    None => 0,
                    Some(i) => *i + 1,
                };
                if next >= runs.len() {
                    return Err(Error::NotConfigured(self.name.clone()));
                }
                *cursor = Some(next);
                Ok(())
            }
        }
    }

    fn current(&self) -> Result<Discriminators> {
        match &self.state {
            CurveState::Unconfigured => Err(Error::NotConfigured(self.name.clone())),
            CurveState::Configured { buckets, runs, cursor } => {
                let idx = cursor.ok_or_else(|| Error::NotConfigured(self.name.clone()))?;
                let run = &runs[idx];

                let mut training = Vec::new();
                let mut labels = Vec::new();
                for &b in run.train() {
                    training.extend(buckets[b].iter().cloned());
                    labels.push(format!("bucket_{b}"));
                }

                let mut bindings = Discriminators::new();
                bindings.set(
                    format!("{}{}", self.name, TRAINING_SUFFIX),
                    DiscriminatorValue::List(training),
                );
                bindings.set(
                    format!("{}{}", self.name, VALIDATION_SUFFIX),
                    DiscriminatorValue::List(buckets[run.test()].clone()),
                );
                bindings.set(DIM_NUM_TRAINING_FOLDS, DiscriminatorValue::List(labels));
                Ok(bindings)
            }
        }
    }
}

enum FixedState {
    Unconfigured,
    Configured { buckets: Vec<Vec<String>>, runs: Vec<Vec<usize>>, cursor: Option<usize> },
}

/// Learning-curve bundle for a fixed, externally staged test set.
///
/// Training sizes run `1..=k` over all buckets since none is held out;
/// per run only `<name>_training` and the bucket labels are bound.
pub struct FixedTestSetCurveDimension {
    name: String,
    requested_folds: i64,
    comparator: Option<CogroupFn>,
    stage_limit: Option<usize>,
    state: FixedState,
}

impl FixedTestSetCurveDimension {
    pub fn new(name: impl Into<String>, requested_folds: i64) -> Self {
        Self {
            name: name.into(),
            requested_folds,
            comparator: None,
            stage_limit: None,
            state: FixedState::Unconfigured,
        }
    }

    pub fn with_comparator(mut self, comparator: CogroupFn) -> Self {
        self.comparator = Some(comparator);
        self
    }

    pub fn with_stage_limit(mut self, limit: usize) -> Self {
        self.stage_limit = Some(limit);
        self
    }

    pub fn set_instances(&mut self, ids: Vec<String>) -> Result<()> {
        validate_schedule(self.requested_folds, self.stage_limit, &self.name)?;
        let buckets = partition(&ids, self.requested_folds, self.comparator.as_ref())?;
        let k = buckets.len();
        let seq: Vec<usize> = (0..k).collect();

        let mut runs = Vec::new();
        for size in 1..=k {
            for mut stage in stage_rotations(&seq, size, self.stage_limit) {
                stage.sort_unstable();
                runs.push(stage);
            }
        }
        self.state = FixedState::Configured { buckets, runs, cursor: None };
        Ok(())
    }

    pub fn runs(&self) -> Result<&[Vec<usize>]> {
        match &self.state {
            FixedState::Configured { runs, .. } => Ok(runs),
            FixedState::Unconfigured => Err(Error::NotConfigured(self.name.clone())),
        }
    }
}

impl Dimension for FixedTestSetCurveDimension {
    fn name(&self) -> &str {
        &self.name
    }

    fn rewind(&mut self) {
        if let FixedState::Configured { cursor, .. } = &mut self.state {
            *cursor = None;
        }
    }

    fn has_next(&self) -> bool {
        match &self.state {
            FixedState::Unconfigured => false,
            FixedState::Configured { runs, cursor, .. } => match cursor {
                None => !runs.is_empty(),
                Some(i) => i + 1 < runs.len(),
            },
        }
    }

    fn advance(&mut self) -> Result<()> {
        match &mut self.state {
            FixedState::Unconfigured => Err(Error::NotConfigured(self.name.clone())),
            FixedState::Configured { runs, cursor, .. } => {
                let next = match cursor {
                    None => 0,
                    Some(i) => *i + 1,
                };
                if next >= runs.len() {
                    return Err(Error::NotConfigured(self.name.clone()));
                }
                *cursor = Some(next);
                Ok(())
            }
        }
    }

    fn current(&self) -> Result<Discriminators> {
        match &self.state {
            FixedState::Unconfigured => Err(Error::NotConfigured(self.name.clone())),
            FixedState::Configured { buckets, runs, cursor } => {
                let idx = cursor.ok_or_else(|| Error::NotConfigured(self.name.clone()))?;
                let run = &runs[idx];

                let mut training = Vec::new();
                let mut labels = Vec::new();
                for &b in run {
                    training.extend(buckets[b].iter().cloned());
                    labels.push(format!("bucket_{b}"));
                }

                let mut bindings = Discriminators::new();
                bindings.set(
                    format!("{}{}", self.name, TRAINING_SUFFIX),
                    DiscriminatorValue::List(training),
                );
                bindings.set(DIM_NUM_TRAINING_FOLDS, DiscriminatorValue::List(labels));
                Ok(bindings)
            }
        }
    }
}
