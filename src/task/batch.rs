//! Nested task graphs.

use crate::dimension::ParameterSpace;
use crate::engine::context::TaskContext;
use crate::error::Result;
use crate::task::{FacadeTask, Task, TaskMeta};

/// Whether a batch reuses completed executions with a matching cache key
/// or always runs its children again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionPolicy {
    #[default]
    RunAgain,
    UseExisting,
}

/// Computes a batch's parameter space at initialization time.
///
/// Cross-validation and learning-curve batches cannot know their sweep
/// statically: the fold assignment depends on files a previously executed
/// task staged. The builder runs once per batch execution, against the
/// batch's own context with its imports resolved.
pub trait SpaceBuilder: Send {
    fn build(&mut self, ctx: &mut TaskContext<'_>) -> Result<ParameterSpace>;
}

/// One node of an experiment graph.
pub enum TaskNode {
    /// A plain work task.
    Work(Box<dyn Task>),
    /// A nested batch with its own parameter space.
    Batch(BatchTask),
    /// A facade resolving its delegate from the adapter binding.
    Facade(FacadeTask),
}

impl TaskNode {
    pub fn meta(&self) -> &TaskMeta {
        match self {
            Self::Work(task) => task.meta(),
            Self::Batch(batch) => batch.meta(),
            Self::Facade(facade) => facade.meta(),
        }
    }

    pub fn meta_mut(&mut self) -> &mut TaskMeta {
        match self {
            Self::Work(task) => task.meta_mut(),
            Self::Batch(batch) => batch.meta_mut(),
            Self::Facade(facade) => facade.meta_mut(),
        }
    }

    pub fn name(&self) -> &str {
        self.meta().name()
    }
}

impl std::fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Work(task) => f.debug_tuple("Work").field(&task.meta().name()).finish(),
            Self::Batch(batch) => f.debug_tuple("Batch").field(&batch.meta().name()).finish(),
            Self::Facade(facade) => f.debug_tuple("Facade").field(&facade.meta().name()).finish(),
        }
    }
}

/// An ordered collection of child nodes swept over a parameter space.
///
/// Children execute once per point, in declaration order as far as their
/// imports allow. By convention the first child added is the experiment's
/// initialization task; downstream restart and caching semantics rely on
/// that ordering.
pub struct BatchTask {
    meta: TaskMeta,
    children: Vec<TaskNode>,
    space: ParameterSpace,
    space_builder: Option<Box<dyn SpaceBuilder>>,
    policy: ExecutionPolicy,
}

impl BatchTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: TaskMeta::new(name),
            children: Vec::new(),
            space: ParameterSpace::new(),
            space_builder: None,
            policy: ExecutionPolicy::default(),
        }
    }

    pub fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }

    pub fn add_task(&mut self, node: TaskNode) {
        self.children.push(node);
    }

    pub fn children(&self) -> &[TaskNode] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [TaskNode] {
        &mut self.children
    }

    pub fn set_parameter_space(&mut self, space: ParameterSpace) {
        self.space = space;
    }

    pub fn parameter_space_mut(&mut self) -> &mut ParameterSpace {
        &mut self.space
    }

    /// Installs the two-phase space computation hook.
    pub fn set_space_builder(&mut self, builder: Box<dyn SpaceBuilder>) {
        self.space_builder = Some(builder);
    }

    pub fn take_space_builder(&mut self) -> Option<Box<dyn SpaceBuilder>> {
        self.space_builder.take()
    }

    pub fn set_execution_policy(&mut self, policy: ExecutionPolicy) {
        self.policy = policy;
    }

    pub fn execution_policy(&self) -> ExecutionPolicy {
        self.policy
    }
}
