//! Stage handles, modules and the stage arena.
//!
//! Stages are long-lived units of work registered once in a [`StageArena`]
//! and addressed by a stable [`StageId`]. Each slot carries the mutable
//! state the backtracking engine may touch: configuration, contract and
//! invoke entry point.

mod arena;
mod invoke;

pub use arena::{StageArena, StageConfig, StageSlot};
pub use invoke::{Invoke, InvokeFn};

use crate::context::StageContext;
use crate::errors::BacktrackError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// Named values flowing into and out of a stage.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Stable index of a stage inside a [`StageArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageId(usize);

impl StageId {
    /// Creates a handle from a raw arena index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage#{}", self.0)
    }
}

/// Trait for the execution logic behind a stage.
///
/// Implementations receive the already-validated inputs and the effective
/// configuration through the [`StageContext`]; caching and trace recording
/// happen around them.
pub trait StageModule: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Computes the stage outputs.
    fn forward(&self, ctx: &StageContext<'_>, inputs: &Fields) -> Result<Fields, BacktrackError>;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&StageContext<'_>, &Fields) -> Result<Fields, BacktrackError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageContext<'_>, &Fields) -> Result<Fields, BacktrackError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageContext<'_>, &Fields) -> Result<Fields, BacktrackError> + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

impl<F> StageModule for FnStage<F>
where
    F: Fn(&StageContext<'_>, &Fields) -> Result<Fields, BacktrackError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, ctx: &StageContext<'_>, inputs: &Fields) -> Result<Fields, BacktrackError> {
        (self.func)(ctx, inputs)
    }
}

/// Builds a [`Fields`] map from key/value pairs.
#[must_use]
pub fn fields<K, I>(pairs: I) -> Fields
where
    K: Into<String>,
    I: IntoIterator<Item = (K, serde_json::Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
