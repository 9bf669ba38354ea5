//! Synthetic splitting of staged instances into classification units.
//!
//! Unit and sequence experiments partition at unit granularity. When fewer
//! staged files exist than requested folds, each file is decomposed into
//! one file per atomic unit first, so the partitioner has enough material
//! to work with.

use std::path::{Path, PathBuf};

use log::debug;

use crate::data::{list_staged, read_instance, write_instance, TextInstance};
use crate::error::Result;

/// Decomposes one staged instance into its atomic classification units.
pub trait UnitSplitter: Send + Sync {
    fn split(&self, instance: &TextInstance) -> Result<Vec<TextInstance>>;
}

/// One unit per non-empty text line. Outcomes align positionally when the
/// instance carries one outcome per line; otherwise every unit inherits
/// the full outcome list.
#[derive(Debug, Default)]
pub struct LineUnitSplitter;

impl UnitSplitter for LineUnitSplitter {
    fn split(&self, instance: &TextInstance) -> Result<Vec<TextInstance>> {
        let lines: Vec<&str> = instance.text.lines().filter(|l| !l.is_empty()).collect();
        let positional = instance.outcomes.len() == lines.len();
        let units = lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let outcomes = if positional {
                    vec![instance.outcomes[i].clone()]
                } else {
                    instance.outcomes.clone()
                };
                TextInstance::new(format!("{}_{i:04}", instance.id), outcomes, *line)
            })
            .collect();
        Ok(units)
    }
}

/// Rewrites the staged files as one file per unit and returns the sorted
/// new list. The output folder must belong to the caller's execution.
pub fn create_minimal_split(
    files: &[PathBuf],
    splitter: &dyn UnitSplitter,
    out_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut written = 0usize;
    for path in files {
        let instance = read_instance(path)?;
        for unit in splitter.split(&instance)? {
            write_instance(out_dir, &unit)?;
            written += 1;
        }
    }
    debug!("split {} staged files into {written} units", files.len());
    list_staged(out_dir)
}
