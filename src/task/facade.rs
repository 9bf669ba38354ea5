//! Adapter facade: a task whose real work is delegated to a sub-task that
//! only exists once the classification arguments are resolved.

use log::info;

use crate::adapter::resolve_adapter;
use crate::dimension::Discriminators;
use crate::error::{Error, Result};
use crate::report::Report;
use crate::task::{Task, TaskMeta, TaskType};

/// Which adapter factory the facade calls when it resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacadeKind {
    /// Train on the extracted training data, predict the test data.
    Test,
    /// Train and serialize the model.
    SaveModel,
}

/// Factory for reports re-attached to every freshly resolved delegate.
pub type ReportFactory = Box<dyn Fn() -> Box<dyn Report> + Send>;

/// Resolves the learning adapter from the `classificationArguments`
/// discriminator and wires the adapter's task as its sole child.
///
/// The facade is deliberately never cacheable: the delegate's identity can
/// change between parameter-space points of one experiment, so every run
/// re-resolves the adapter and atomically replaces the delegate slot. The
/// facade's declared imports are copied onto each fresh delegate.
pub struct FacadeTask {
    meta: TaskMeta,
    kind: FacadeKind,
    experiment_name: String,
    report_factories: Vec<ReportFactory>,
    delegate: Option<Box<dyn Task>>,
}

impl FacadeTask {
    pub fn new(name: impl Into<String>, kind: FacadeKind, experiment_name: impl Into<String>) -> Self {
        let mut meta = TaskMeta::new(name);
        meta.set_task_type(TaskType::Facade);
        Self {
            meta,
            kind,
            experiment_name: experiment_name.into(),
            report_factories: Vec::new(),
            delegate: None,
        }
    }

    pub fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }

    pub fn kind(&self) -> FacadeKind {
        self.kind
    }

    /// Registers a user report attached to every resolved delegate.
    pub fn add_report_factory(&mut self, factory: ReportFactory) {
        self.report_factories.push(factory);
    }

    /// Always false: resolution must happen again on every run.
    pub fn is_initialized(&self) -> bool {
        false
    }

    /// Resolves the adapter and replaces the delegate slot.
    ///
    /// Fails with `InvalidAdapter` when the first classification argument
    /// is not an adapter and with `Configuration` when the discriminator
    /// is missing entirely.
    pub fn initialize(&mut self, config: &Discriminators) -> Result<()> {
        let args = config.classification_args()?;
        let adapter = resolve_adapter(args)?;

        let mut delegate = match self.kind {
            FacadeKind::Test => adapter.test_task(),
            FacadeKind::SaveModel => adapter.save_model_task(),
        };

        {
            let meta = delegate.meta_mut();
            meta.set_name(format!("{}-{}", meta.name(), self.experiment_name));
            meta.set_task_type(TaskType::MachineLearningAdapter);
            for import in self.meta.imports().to_vec() {
                meta.add_import_edge(import);
            }
            if let Some(report) = adapter.outcome_report() {
                meta.add_report(report);
            }
            if let Some(report) = adapter.majority_baseline_report() {
                meta.add_report(report);
            }
            if let Some(report) = adapter.random_baseline_report() {
                meta.add_report(report);
            }
            for factory in &self.report_factories {
                meta.add_report(factory());
            }
        }

        info!(
            "facade [{}] resolved adapter [{}] into delegate [{}]",
            self.meta.name(),
            adapter.name(),
            delegate.meta().name()
        );
        self.delegate = Some(delegate);
        Ok(())
    }

    /// The currently wired delegate, if any resolution has happened.
    pub fn delegate(&self) -> Option<&dyn Task> {
        self.delegate.as_deref()
    }

    pub fn delegate_mut(&mut self) -> Option<&mut Box<dyn Task>> {
        self.delegate.as_mut()
    }
}

impl std::fmt::Debug for FacadeTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacadeTask")
            .field("name", &self.meta.name())
            .field("kind", &self.kind)
            .field("delegate", &self.delegate.as_ref().map(|d| d.meta().name()))
            .finish()
    }
}

/// Unresolved-delegate guard used by the engine.
pub fn expect_delegate(facade: &mut FacadeTask) -> Result<&mut Box<dyn Task>> {
    let name = facade.meta().name().to_string();
    facade
        .delegate_mut()
        .ok_or_else(|| Error::Configuration(format!("facade [{name}] has no resolved delegate")))
}
