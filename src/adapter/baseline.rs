//! Bundled majority-class learner.
//!
//! Small enough to have no external dependency, yet a complete adapter: it
//! exercises the facade resolution path, the train/test import wiring and
//! the outcome-file format end to end. Also the reference learner for
//! experiment tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use log::info;
use serde::{Deserialize, Serialize};

use crate::adapter::{DataSink, LearningAdapter, FEATURES_FILE};
use crate::data::TextInstance;
use crate::engine::context::TaskContext;
use crate::error::{Error, Result};
use crate::report::{Report, ReportContext, ID_OUTCOME_HEADER, LABELS_PREFIX};
use crate::storage::AccessMode;
use crate::task::{
    LearningMode, Task, TaskMeta, BASELINE_MAJORITY_ID_OUTCOME_KEY, DIM_CLASSIFICATION_ARGS,
    DIM_LEARNING_MODE, DIM_OUTPUT_FOLDER, ID_OUTCOME_KEY, TEST_TASK_INPUT_KEY_TEST_DATA,
    TEST_TASK_INPUT_KEY_TRAINING_DATA, TEST_TASK_OUTPUT_KEY, UNKNOWN_OUTCOME,
};

/// File a save-model run serializes the learned state to.
pub const MODEL_FILE: &str = "model.json";

/// Serialized form of the trained majority learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MajorityModel {
    pub adapter: String,
    pub label: String,
    pub labels: Vec<String>,
}

/// Tab-separated sink: one instance per line as `id`, comma-joined
/// outcomes, text. Tabs, newlines and commas are reserved separators and
/// get blanked in the payload.
#[derive(Debug, Default)]
pub struct TsvDataSink;

impl DataSink for TsvDataSink {
    fn write(&mut self, dir: &Path, instances: &[TextInstance]) -> Result<()> {
        let mut content = String::new();
        for instance in instances {
            let outcomes: Vec<String> =
                instance.outcomes.iter().map(|o| sanitize(o)).collect();
            content.push_str(&format!(
                "{}\t{}\t{}\n",
                sanitize(&instance.id),
                outcomes.join(","),
                sanitize(&instance.text)
            ));
        }
        fs::write(dir.join(FEATURES_FILE), content)?;
        Ok(())
    }
}

fn sanitize(value: &str) -> String {
    value.replace(['\t', '\n', '\r', ','], " ")
}

/// Reads a folder written by [`TsvDataSink`] back into instances.
pub fn read_features(dir: &Path) -> Result<Vec<TextInstance>> {
    let content = fs::read_to_string(dir.join(FEATURES_FILE))?;
    let mut instances = Vec::new();
    for line in content.lines() {
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(3, '\t');
        let id = parts.next().unwrap_or_default().to_string();
        let outcomes = parts.next().unwrap_or_default();
        let text = parts.next().unwrap_or_default().to_string();
        let outcomes = if outcomes.is_empty() {
            Vec::new()
        } else {
            outcomes.split(',').map(str::to_string).collect()
        };
        instances.push(TextInstance { id, outcomes, text });
    }
    Ok(instances)
}

/// Always predicts the most frequent training label, or the training mean
/// for regression. Multi-label data is rejected.
#[derive(Debug, Default)]
pub struct MajorityClassAdapter;

impl MajorityClassAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl LearningAdapter for MajorityClassAdapter {
    fn name(&self) -> &str {
        "MajorityClass"
    }

    fn test_task(&self) -> Box<dyn Task> {
        Box::new(MajorityTestTask::new())
    }

    fn save_model_task(&self) -> Box<dyn Task> {
        Box::new(MajoritySaveModelTask::new())
    }

    fn data_sink(&self) -> Box<dyn DataSink> {
        Box::new(TsvDataSink)
    }

    fn majority_baseline_report(&self) -> Option<Box<dyn Report>> {
        Some(Box::new(MajorityBaselineReport))
    }
}

/// Trains on `input.train`, predicts `input.test` and writes the
/// id-to-outcome file in its output folder.
pub struct MajorityTestTask {
    meta: TaskMeta,
}

impl MajorityTestTask {
    pub fn new() -> Self {
        let mut meta = TaskMeta::new("MajorityClassTestTask");
        meta.declare_discriminator(DIM_CLASSIFICATION_ARGS);
        meta.declare_discriminator(DIM_LEARNING_MODE);
        Self { meta }
    }
}

impl Default for MajorityTestTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for MajorityTestTask {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }

    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        let mode = learning_mode(ctx)?;
        let train_dir = ctx.folder(TEST_TASK_INPUT_KEY_TRAINING_DATA, AccessMode::ReadOnly)?;
        let test_dir = ctx.folder(TEST_TASK_INPUT_KEY_TEST_DATA, AccessMode::ReadOnly)?;
        let out = ctx.folder(TEST_TASK_OUTPUT_KEY, AccessMode::ReadWrite)?;

        let train = read_features(&train_dir)?;
        let test = read_features(&test_dir)?;
        let content = match mode {
            LearningMode::SingleLabel => predict_single_label(&train, &test)?,
            LearningMode::Regression => predict_regression(&train, &test)?,
            LearningMode::MultiLabel => {
                return Err(Error::Configuration(
                    "majority baseline does not support multiLabel".into(),
                ))
            }
        };
        fs::write(out.join(ID_OUTCOME_KEY), content)?;
        info!(
            "[{}] predicted {} instances from {} training instances",
            self.meta.name(),
            test.len(),
            train.len()
        );
        Ok(())
    }
}

/// Trains on `input.train` and serializes the model into the folder named
/// by the `outputFolder` discriminator.
pub struct MajoritySaveModelTask {
    meta: TaskMeta,
}

impl MajoritySaveModelTask {
    pub fn new() -> Self {
        let mut meta = TaskMeta::new("MajorityClassSaveModelTask");
        meta.declare_discriminator(DIM_CLASSIFICATION_ARGS);
        meta.declare_discriminator(DIM_LEARNING_MODE);
        meta.declare_discriminator(DIM_OUTPUT_FOLDER);
        Self { meta }
    }
}

impl Default for MajoritySaveModelTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for MajoritySaveModelTask {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }

    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        let mode = learning_mode(ctx)?;
        let target = ctx
            .config()
            .path_value(DIM_OUTPUT_FOLDER)
            .ok_or_else(|| {
                Error::Configuration(format!("discriminator [{DIM_OUTPUT_FOLDER}] is not set"))
            })?
            .clone();
        let train_dir = ctx.folder(TEST_TASK_INPUT_KEY_TRAINING_DATA, AccessMode::ReadOnly)?;
        let train = read_features(&train_dir)?;

        let model = match mode {
            LearningMode::SingleLabel => {
                let label = majority_label(&train)?;
                let mut labels = Vec::new();
                for instance in &train {
                    if let Some(first) = instance.outcomes.first() {
                        if !first.is_empty() {
                            intern(&mut labels, first);
                        }
                    }
                }
                MajorityModel { adapter: "MajorityClass".into(), label, labels }
            }
            LearningMode::Regression => MajorityModel {
                adapter: "MajorityClass".into(),
                label: mean_value(&train)?.to_string(),
                labels: Vec::new(),
            },
            LearningMode::MultiLabel => {
                return Err(Error::Configuration(
                    "majority baseline does not support multiLabel".into(),
                ))
            }
        };
        let json = serde_json::to_string_pretty(&model)?;
        fs::create_dir_all(&target)?;
        fs::write(target.join(MODEL_FILE), &json)?;
        let own = ctx.folder(TEST_TASK_OUTPUT_KEY, AccessMode::ReadWrite)?;
        fs::write(own.join(MODEL_FILE), &json)?;
        info!("[{}] wrote model to [{}]", self.meta.name(), target.display());
        Ok(())
    }
}

/// Rewrites the test task's predictions with the majority training label
/// (the training mean for regression) into the baseline outcome file.
pub struct MajorityBaselineReport;

impl Report for MajorityBaselineReport {
    fn execute(&mut self, ctx: &mut ReportContext<'_>) -> Result<()> {
        let mode = LearningMode::from_str(ctx.config().str_value(DIM_LEARNING_MODE).ok_or_else(
            || Error::Configuration(format!("discriminator [{DIM_LEARNING_MODE}] is not set")),
        )?)?;
        let train_dir = ctx.folder(TEST_TASK_INPUT_KEY_TRAINING_DATA, AccessMode::ReadOnly)?;
        let out = ctx.folder(TEST_TASK_OUTPUT_KEY, AccessMode::ReadWrite)?;
        let train = read_features(&train_dir)?;
        let content = fs::read_to_string(out.join(ID_OUTCOME_KEY))?;

        let rewritten = match mode {
            LearningMode::SingleLabel => {
                rewrite_predictions(&content, &majority_label(&train)?)?
            }
            LearningMode::Regression => {
                rewrite_predictions(&content, &mean_value(&train)?.to_string())?
            }
            LearningMode::MultiLabel => {
                return Err(Error::Configuration(
                    "majority baseline does not support multiLabel".into(),
                ))
            }
        };
        fs::write(out.join(BASELINE_MAJORITY_ID_OUTCOME_KEY), rewritten)?;
        Ok(())
    }
}

fn learning_mode(ctx: &TaskContext<'_>) -> Result<LearningMode> {
    let raw = ctx.config().str_value(DIM_LEARNING_MODE).ok_or_else(|| {
        Error::Configuration(format!("discriminator [{DIM_LEARNING_MODE}] is not set"))
    })?;
    LearningMode::from_str(raw)
}

/// Most frequent first outcome; ties break to the lexicographically
/// smallest label.
fn majority_label(instances: &[TextInstance]) -> Result<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for instance in instances {
        if let Some(first) = instance.outcomes.first() {
            if !first.is_empty() {
                *counts.entry(first).or_default() += 1;
            }
        }
    }
    let mut best: Option<(&str, usize)> = None;
    for (label, n) in &counts {
        if best.map_or(true, |(_, count)| *n > count) {
            best = Some((label, *n));
        }
    }
    best.map(|(label, _)| label.to_string())
        .ok_or(Error::InsufficientData { requested: 1, available: 0 })
}

fn mean_value(instances: &[TextInstance]) -> Result<f64> {
    let mut sum = 0.0;
    let mut n = 0usize;
    for instance in instances {
        if let Some(first) = instance.outcomes.first() {
            let value: f64 = first.parse().map_err(|_| {
                Error::Configuration(format!(
                    "outcome [{first}] of instance [{}] is not numeric",
                    instance.id
                ))
            })?;
            sum += value;
            n += 1;
        }
    }
    if n == 0 {
        return Err(Error::InsufficientData { requested: 1, available: 0 });
    }
    Ok(sum / n as f64)
}

fn intern(labels: &mut Vec<String>, label: &str) -> usize {
    if let Some(pos) = labels.iter().position(|l| l == label) {
        return pos;
    }
    labels.push(label.to_string());
    labels.len() - 1
}

fn label_line(labels: &[String]) -> String {
    if labels.is_empty() {
        return LABELS_PREFIX.to_string();
    }
    let body: Vec<String> =
        labels.iter().enumerate().map(|(i, l)| format!("{i}={l}")).collect();
    format!("{LABELS_PREFIX} {}", body.join(" "))
}

fn predict_single_label(train: &[TextInstance], test: &[TextInstance]) -> Result<String> {
    let majority = majority_label(train)?;
    let mut labels: Vec<String> = Vec::new();
    for instance in train {
        if let Some(first) = instance.outcomes.first() {
            if !first.is_empty() {
                intern(&mut labels, first);
            }
        }
    }
    let prediction = intern(&mut labels, &majority);

    let mut records = Vec::with_capacity(test.len());
    for instance in test {
        let gold = instance
            .outcomes
            .first()
            .filter(|o| !o.is_empty())
            .map_or(UNKNOWN_OUTCOME, String::as_str);
        let gold = intern(&mut labels, gold);
        records.push(format!("{}={prediction};{gold};-1", instance.id));
    }

    let mut content = format!("{ID_OUTCOME_HEADER}\n{}\n", label_line(&labels));
    for record in records {
        content.push_str(&record);
        content.push('\n');
    }
    Ok(content)
}

fn predict_regression(train: &[TextInstance], test: &[TextInstance]) -> Result<String> {
    let mean = mean_value(train)?;
    let mut content = format!("{ID_OUTCOME_HEADER}\n{LABELS_PREFIX}\n");
    for instance in test {
        let gold = instance
            .outcomes
            .first()
            .filter(|o| !o.is_empty())
            .map_or(UNKNOWN_OUTCOME, String::as_str);
        content.push_str(&format!("{}={mean};{gold};-1\n", instance.id));
    }
    Ok(content)
}

/// Replaces every prediction column with the baseline value. The label
/// mapping is extended in place when the baseline label is unseen.
fn rewrite_predictions(content: &str, baseline: &str) -> Result<String> {
    let mut mapping: Vec<String> = Vec::new();
    let mut indexed = false;
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix(LABELS_PREFIX) {
            for pair in rest.split_whitespace() {
                let (_, label) = pair.split_once('=').ok_or_else(|| {
                    Error::Configuration(format!("malformed label mapping entry [{pair}]"))
                })?;
                mapping.push(label.to_string());
            }
            indexed = true;
        }
    }

    let prediction = if indexed && !mapping.is_empty() {
        intern(&mut mapping, baseline).to_string()
    } else {
        baseline.to_string()
    };

    let mut out = String::new();
    for line in content.lines() {
        if line.starts_with(LABELS_PREFIX) {
            out.push_str(&label_line(&mapping));
        } else if line.starts_with('#') || line.is_empty() {
            out.push_str(line);
        } else if let Some((id, rest)) = line.rsplit_once('=') {
            let columns: Vec<&str> = rest.split(';').collect();
            if columns.len() != 3 {
                return Err(Error::Configuration(format!("malformed outcome line [{line}]")));
            }
            out.push_str(&format!("{id}={prediction};{};{}", columns[1], columns[2]));
        } else {
            return Err(Error::Configuration(format!("malformed outcome line [{line}]")));
        }
        out.push('\n');
    }
    Ok(out)
}
