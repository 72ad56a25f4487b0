//! Event sink system for observability.
//!
//! The orchestrator reports every attempt, blame decision, mutation and
//! rollback through an [`EventSink`] in addition to its `tracing` output.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event names emitted by the backtracking engine.
pub mod names {
    /// An attempt is about to invoke the pipeline.
    pub const ATTEMPT_STARTED: &str = "backtrack.attempt.started";
    /// An attempt raised an assertion failure.
    pub const ATTEMPT_FAILED: &str = "backtrack.attempt.failed";
    /// A failure carried no trace to blame.
    pub const BLAME_MISSING: &str = "backtrack.blame.missing";
    /// A stage was mutated before the next attempt.
    pub const STAGE_MUTATED: &str = "backtrack.stage.mutated";
    /// A mutated stage was rolled back.
    pub const STAGE_RESTORED: &str = "backtrack.stage.restored";
    /// An attempt completed without assertion failure.
    pub const SUCCEEDED: &str = "backtrack.succeeded";
    /// Every attempt failed.
    pub const EXHAUSTED: &str = "backtrack.exhausted";
}
