//! Late-bound function dimensions.

use crate::dimension::{Dimension, DiscriminatorValue, Discriminators};
use crate::error::{Error, Result};

/// Value factory invoked once per configuration injection.
pub type DimensionFn =
    Box<dyn FnMut(&Discriminators) -> Result<Vec<DiscriminatorValue>> + Send>;

enum FnState {
    Unconfigured,
    Configured { values: Vec<DiscriminatorValue>, cursor: Option<usize> },
}

/// A configuration axis whose values are computed from the resolved outer
/// configuration instead of a static list.
///
/// The dimension is unusable until [`Dimension::configure`] has run: the
/// distinction between "never configured" and "configured, not advanced"
/// is explicit state, not a null check. Rewinding resets the cursor but
/// keeps the computed values; reconfiguring recomputes them.
pub struct DynamicFunctionDimension {
    name: String,
    factory: DimensionFn,
    state: FnState,
}

impl DynamicFunctionDimension {
    pub fn new(name: impl Into<String>, factory: DimensionFn) -> Self {
        Self { name: name.into(), factory, state: FnState::Unconfigured }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.state, FnState::Configured { .. })
    }
}

impl Dimension for DynamicFunctionDimension {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, config: &Discriminators) -> Result<()> {
        let values = (self.factory)(config)?;
        self.state = FnState::Configured { values, cursor: None };
        Ok(())
    }

    fn rewind(&mut self) {
        if let FnState::Configured { cursor, .. } = &mut self.state {
            *cursor = None;
        }
    }

    fn has_next(&self) -> bool {
        match &self.state {
            FnState::Unconfigured => false,
            FnState::Configured { values, cursor } => match cursor {
                None => !values.is_empty(),
                Some(i) => i + 1 < values.len(),
            },
        }
    }

    fn advance(&mut self) -> Result<()> {
        match &mut self.state {
            FnState::Unconfigured => Err(Error::NotConfigured(self.name.clone())),
            FnState::Configured { values, cursor } => {
                let next = match cursor {
                    None => 0,
                    Some(i) => *i + 1,
                };
                if next >= values.len() {
                    return Err(Error::NotConfigured(self.name.clone()));
                }
                *cursor = Some(next);
                Ok(())
            }
        }
    }

    fn current(&self) -> Result<Discriminators> {
        match &self.state {
            FnState::Unconfigured => Err(Error::NotConfigured(self.name.clone())),
            FnState::Configured { values, cursor } => {
                let idx = cursor.ok_or_else(|| Error::NotConfigured(self.name.clone()))?;
                let mut bindings = Discriminators::new();
                bindings.set(&self.name, values[idx].clone());
                Ok(bindings)
            }
        }
    }
}
