//! Outcome-file codec and merge.
//!
//! A per-run outcome file has two header lines and one record per
//! classified instance:
//!
//! ```text
//! #ID=PREDICTION;GOLDSTANDARD;THRESHOLD
//! #labels 0=comp.graphics 1=sci.med
//! doc42=1;0;-1
//! ```
//!
//! For single-label learning, prediction and gold are indices into the
//! file's own label mapping; folds may number their labels differently, so
//! the combiner translates indices to label strings on parse and re-indexes
//! against one unified numbering on write. Multi-label records carry
//! positional 0/1 vectors and the mappings are unioned; regression records
//! pass through untouched.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use log::warn;

use crate::error::{Error, Result};
use crate::task::LearningMode;

/// First header line of every outcome file.
pub const ID_OUTCOME_HEADER: &str = "#ID=PREDICTION;GOLDSTANDARD;THRESHOLD";
/// Prefix of the label-mapping header line.
pub const LABELS_PREFIX: &str = "#labels";

/// What to do when the same instance id appears in two merged files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// Reject the merge.
    Fail,
    /// Later record wins, keeping the first record's position.
    #[default]
    Overwrite,
    /// Earlier record wins.
    FirstWins,
}

/// One merged outcome record. For single-label data, prediction and gold
/// hold label strings; otherwise the raw encoded values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeRecord {
    pub id: String,
    pub prediction: String,
    pub gold: String,
    pub threshold: String,
}

/// Merges per-run outcome files into one combined stream.
pub struct OutcomeCombiner {
    mode: LearningMode,
    policy: CollisionPolicy,
    records: Vec<OutcomeRecord>,
    index: HashMap<String, usize>,
    label_union: BTreeMap<usize, String>,
}

impl OutcomeCombiner {
    pub fn new(mode: LearningMode) -> Self {
        Self {
            mode,
            policy: CollisionPolicy::default(),
            records: Vec::new(),
            index: HashMap::new(),
            label_union: BTreeMap::new(),
        }
    }

    pub fn with_policy(mut self, policy: CollisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn records(&self) -> &[OutcomeRecord] {
        &self.records
    }

    /// Parses and merges one outcome file.
    pub fn add_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)?;
        self.add_content(&content)
    }

    /// Parses and merges outcome-file content.
    pub fn add_content(&mut self, content: &str) -> Result<()> {
        let mut mapping: Option<BTreeMap<usize, String>> = None;
        for line in content.lines() {
            let line = line.trim_end();
            if line.is_empty() || line == ID_OUTCOME_HEADER {
                continue;
            }
            if let Some(rest) = line.strip_prefix(LABELS_PREFIX) {
                let parsed = parse_label_mapping(rest)?;
                if self.mode == LearningMode::MultiLabel {
                    self.union_labels(&parsed)?;
                }
                mapping = Some(parsed);
                continue;
            }
            let record = parse_record(line, self.mode, mapping.as_ref())?;
            self.insert(record)?;
        }
        Ok(())
    }

    fn union_labels(&mut self, parsed: &BTreeMap<usize, String>) -> Result<()> {
        for (idx, label) in parsed {
            match self.label_union.get(idx) {
                Some(existing) if existing != label => {
                    return Err(Error::Configuration(format!(
                        "inconsistent label mappings: index {idx} is [{existing}] and [{label}]"
                    )));
                }
                Some(_) => {}
                None => {
                    self.label_union.insert(*idx, label.clone());
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, record: OutcomeRecord) -> Result<()> {
        match self.index.get(&record.id) {
            None => {
                self.index.insert(record.id.clone(), self.records.len());
                self.records.push(record);
            }
            Some(&pos) => match self.policy {
                CollisionPolicy::Fail => {
                    return Err(Error::OutcomeCollision(record.id));
                }
                CollisionPolicy::Overwrite => {
                    warn!("overwriting outcome record for duplicate id [{}]", record.id);
                    self.records[pos] = record;
                }
                CollisionPolicy::FirstWins => {}
            },
        }
        Ok(())
    }

    /// Renders the combined stream with a unified label numbering.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(ID_OUTCOME_HEADER);
        out.push('\n');

        match self.mode {
            LearningMode::SingleLabel => {
                let labels = self.unified_labels();
                let index_of: HashMap<&String, usize> =
                    labels.iter().enumerate().map(|(i, l)| (l, i)).collect();
                out.push_str(&render_label_line(labels.iter()));
                out.push('\n');
                for rec in &self.records {
                    out.push_str(&format!(
                        "{}={};{};{}\n",
                        rec.id, index_of[&rec.prediction], index_of[&rec.gold], rec.threshold
                    ));
                }
            }
            LearningMode::MultiLabel => {
                out.push_str(&render_label_line(self.label_union.values()));
                out.push('\n');
                for rec in &self.records {
                    out.push_str(&format!(
                        "{}={};{};{}\n",
                        rec.id, rec.prediction, rec.gold, rec.threshold
                    ));
                }
            }
            LearningMode::Regression => {
                out.push_str(LABELS_PREFIX);
                out.push('\n');
                for rec in &self.records {
                    out.push_str(&format!(
                        "{}={};{};{}\n",
                        rec.id, rec.prediction, rec.gold, rec.threshold
                    ));
                }
            }
        }
        out
    }

    /// Writes the combined stream to a file.
    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render())?;
        Ok(())
    }

    /// Label strings in first-appearance order over the merged records,
    /// prediction before gold. Deterministic for deterministic input order.
    fn unified_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for rec in &self.records {
            for value in [&rec.prediction, &rec.gold] {
                if !labels.contains(value) {
                    labels.push(value.clone());
                }
            }
        }
        labels
    }
}

fn render_label_line<'a>(labels: impl Iterator<Item = &'a String>) -> String {
    let body = labels
        .enumerate()
        .map(|(i, label)| format!("{i}={label}"))
        .collect::<Vec<_>>()
        .join(" ");
    if body.is_empty() {
        LABELS_PREFIX.to_string()
    } else {
        format!("{LABELS_PREFIX} {body}")
    }
}

fn parse_label_mapping(rest: &str) -> Result<BTreeMap<usize, String>> {
    let mut mapping = BTreeMap::new();
    for token in rest.split_whitespace() {
        let (idx, label) = token.split_once('=').ok_or_else(|| {
            Error::Configuration(format!("malformed label mapping token [{token}]"))
        })?;
        let idx: usize = idx.parse().map_err(|_| {
            Error::Configuration(format!("malformed label index in token [{token}]"))
        })?;
        mapping.insert(idx, label.to_string());
    }
    Ok(mapping)
}

fn parse_record(
    line: &str,
    mode: LearningMode,
    mapping: Option<&BTreeMap<usize, String>>,
) -> Result<OutcomeRecord> {
    // The last '=' separates the id from the payload; ids may contain '='.
    let split = line
        .rfind('=')
        .ok_or_else(|| Error::Configuration(format!("malformed outcome line [{line}]")))?;
    let id = &line[..split];
    let payload = &line[split + 1..];

    let parts: Vec<&str> = payload.split(';').collect();
    if parts.len() != 3 {
        return Err(Error::Configuration(format!("malformed outcome line [{line}]")));
    }

    let (prediction, gold) = match mode {
        LearningMode::SingleLabel => {
            let mapping = mapping.ok_or_else(|| {
                Error::Configuration(format!(
                    "outcome line [{line}] appeared before a {LABELS_PREFIX} header"
                ))
            })?;
            (resolve_label(parts[0], mapping)?, resolve_label(parts[1], mapping)?)
        }
        LearningMode::MultiLabel | LearningMode::Regression => {
            (parts[0].to_string(), parts[1].to_string())
        }
    };

    Ok(OutcomeRecord {
        id: id.to_string(),
        prediction,
        gold,
        threshold: parts[2].to_string(),
    })
}

fn resolve_label(index: &str, mapping: &BTreeMap<usize, String>) -> Result<String> {
    let idx: usize = index
        .trim()
        .parse()
        .map_err(|_| Error::Configuration(format!("malformed label index [{index}]")))?;
    mapping.get(&idx).cloned().ok_or_else(|| {
        Error::Configuration(format!("label index [{idx}] missing from {LABELS_PREFIX} header"))
    })
}
