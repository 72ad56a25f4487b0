//! Fault localization over an execution trace.

use crate::stages::StageId;
use crate::trace::TraceEntry;
use serde::{Deserialize, Serialize};

/// Outcome of blame resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Blame {
    /// The stage of the most recent trace entry.
    Stage(StageId),
    /// The trace was empty.
    NoTrace,
}

impl Blame {
    /// Returns the blamed stage, if any.
    #[must_use]
    pub fn stage(self) -> Option<StageId> {
        match self {
            Self::Stage(stage) => Some(stage),
            Self::NoTrace => None,
        }
    }
}

/// Blames the stage that ran last.
///
/// Earlier entries are ignored.
#[must_use]
pub fn resolve_blame(trace: &[TraceEntry]) -> Blame {
    trace.last().map_or(Blame::NoTrace, |entry| Blame::Stage(entry.stage))
}
