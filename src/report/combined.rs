//! Batch-level aggregation of per-run outcome files.

use std::str::FromStr;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::report::{CollisionPolicy, OutcomeCombiner, Report, ReportContext};
use crate::storage::AccessMode;
use crate::task::{
    LearningMode, TaskType, DIM_LEARNING_MODE, FILE_COMBINED_ID_OUTCOME_KEY, ID_OUTCOME_KEY,
    TEST_TASK_OUTPUT_KEY,
};

/// Merges the `id2outcome.txt` of every machine-learning-adapter run under
/// a batch into one `combinedId2Outcome.txt` at the batch root.
///
/// Attach to the inner cross-validation batch (one file per fold) or to a
/// train-test batch (a single file, combined for a uniform output shape).
pub struct CombinedOutcomeReport {
    policy: CollisionPolicy,
}

impl CombinedOutcomeReport {
    pub fn new() -> Self {
        Self { policy: CollisionPolicy::default() }
    }

    pub fn with_policy(policy: CollisionPolicy) -> Self {
        Self { policy }
    }

    /// Adapter executions reachable from the batch, in completion order.
    fn collect_adapter_runs(
        ctx: &ReportContext<'_>,
        execution_id: &str,
        out: &mut Vec<String>,
    ) -> Result<()> {
        let record = ctx.record(execution_id)?;
        if record.task_type == Some(TaskType::MachineLearningAdapter) {
            out.push(execution_id.to_string());
        }
        for child in &record.child_executions {
            Self::collect_adapter_runs(ctx, child, out)?;
        }
        Ok(())
    }
}

impl Default for CombinedOutcomeReport {
    fn default() -> Self {
        Self::new()
    }
}

impl Report for CombinedOutcomeReport {
    fn execute(&mut self, ctx: &mut ReportContext<'_>) -> Result<()> {
        let mode_value = ctx
            .config()
            .str_value(DIM_LEARNING_MODE)
            .ok_or_else(|| {
                Error::Configuration(format!("discriminator [{DIM_LEARNING_MODE}] is not set"))
            })?
            .to_string();
        let mode = LearningMode::from_str(&mode_value)?;

        let mut adapter_runs = Vec::new();
        for id in ctx.subtask_executions().to_vec() {
            Self::collect_adapter_runs(ctx, &id, &mut adapter_runs)?;
        }
        debug!(
            "combining outcomes of {} adapter runs under {}",
            adapter_runs.len(),
            ctx.execution_id()
        );

        let mut combiner = OutcomeCombiner::new(mode).with_policy(self.policy);
        for id in &adapter_runs {
            let outcome =
                ctx.execution_folder(id, TEST_TASK_OUTPUT_KEY)?.join(ID_OUTCOME_KEY);
            combiner.add_file(&outcome)?;
        }

        let target = ctx.file(FILE_COMBINED_ID_OUTCOME_KEY, AccessMode::ReadWrite)?;
        combiner.write(&target)?;
        info!(
            "wrote {} combined outcome records to {}",
            combiner.records().len(),
            target.display()
        );
        Ok(())
    }
}
