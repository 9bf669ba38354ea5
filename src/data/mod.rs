//! Instance model and staged-corpus IO.
//!
//! An experiment stages its corpus once during initialization: every
//! [`TextInstance`] becomes one pretty-printed JSON file in the init task's
//! output folder, and all downstream partitioning operates on the sorted
//! list of those file paths. Readers and preprocessors are collaborator
//! traits; the crate ships no NLP of its own.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// File extension used for staged instances.
pub const STAGED_EXTENSION: &str = "json";

/// One classifiable instance: an identifier, its gold outcome(s) and the
/// raw text payload.
///
/// `outcomes` carries one label for single-label learning, several for
/// multi-label, a numeric string for regression, and may be empty for
/// unlabeled prediction input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextInstance {
    pub id: String,
    pub outcomes: Vec<String>,
    pub text: String,
}

impl TextInstance {
    pub fn new(id: impl Into<String>, outcomes: Vec<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), outcomes, text: text.into() }
    }

    /// Single-label convenience constructor.
    pub fn labeled(id: impl Into<String>, outcome: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), outcomes: vec![outcome.into()], text: text.into() }
    }
}

/// Produces the raw instances of a corpus.
///
/// `source_id` must be stable across runs: it is rendered into the reader
/// discriminator and therefore participates in cache keys.
pub trait CorpusReader: Send + Sync {
    fn source_id(&self) -> String;
    fn read(&self) -> Result<Vec<TextInstance>>;
}

/// In-memory reader, mainly useful for tests and demos.
pub struct VecReader {
    id: String,
    instances: Vec<TextInstance>,
}

impl VecReader {
    pub fn new(id: impl Into<String>, instances: Vec<TextInstance>) -> Self {
        Self { id: id.into(), instances }
    }
}

impl CorpusReader for VecReader {
    fn source_id(&self) -> String {
        self.id.clone()
    }

    fn read(&self) -> Result<Vec<TextInstance>> {
        Ok(self.instances.clone())
    }
}

/// Transforms an instance in place before staging (tokenization,
/// normalization and similar concerns live behind this seam).
pub trait Preprocessor: Send + Sync {
    fn id(&self) -> String;
    fn process(&self, instance: &mut TextInstance) -> Result<()>;
}

/// Stages instances unchanged.
pub struct NoopPreprocessor;

impl Preprocessor for NoopPreprocessor {
    fn id(&self) -> String {
        "noop".into()
    }

    fn process(&self, _instance: &mut TextInstance) -> Result<()> {
        Ok(())
    }
}

/// Writes one staged JSON file for the instance, named after its id.
pub fn write_instance(dir: &Path, instance: &TextInstance) -> Result<PathBuf> {
    let path = dir.join(format!("{}.{}", instance.id, STAGED_EXTENSION));
    let json = serde_json::to_string_pretty(instance)?;
    fs::write(&path, json)?;
    Ok(path)
}

/// Reads a staged instance back.
pub fn read_instance(path: &Path) -> Result<TextInstance> {
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

/// Lists the staged instance files of a folder, sorted by path.
///
/// Sorting makes every downstream partition deterministic across platforms.
pub fn list_staged(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(STAGED_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Reads every staged instance of a folder in sorted order.
pub fn read_staged(dir: &Path) -> Result<Vec<TextInstance>> {
    list_staged(dir)?.iter().map(|p| read_instance(p)).collect()
}
