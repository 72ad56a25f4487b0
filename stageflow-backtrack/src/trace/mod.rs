//! Execution trace recorded by the runtime.
//!
//! One trace exists per run frame. Entries are appended in execution order
//! and never rewritten.

use crate::stages::{Fields, StageId};
use serde::{Deserialize, Serialize};

/// A single `(stage, inputs, outputs)` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// The stage that ran.
    pub stage: StageId,
    /// Inputs it received, after defaults were applied.
    pub inputs: Fields,
    /// Outputs it produced.
    pub outputs: Fields,
}

impl TraceEntry {
    /// Creates a new trace entry.
    #[must_use]
    pub fn new(stage: StageId, inputs: Fields, outputs: Fields) -> Self {
        Self {
            stage,
            inputs,
            outputs,
        }
    }
}

/// Append-only ordered trace of stage executions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionTrace {
    entries: Vec<TraceEntry>,
}

impl ExecutionTrace {
    /// Creates an empty trace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    /// Returns the most recent entry.
    #[must_use]
    pub fn last(&self) -> Option<&TraceEntry> {
        self.entries.last()
    }

    /// Returns all entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> Vec<StageId> {
        self.entries.iter().map(|e| e.stage).collect()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has run yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the trace and returns its entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<TraceEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_preserves_order() {
        let mut trace = ExecutionTrace::new();
        assert!(trace.is_empty());
        assert!(trace.last().is_none());

        trace.record(TraceEntry::new(StageId::new(1), Fields::new(), Fields::new()));
        trace.record(TraceEntry::new(StageId::new(0), Fields::new(), Fields::new()));

        assert_eq!(trace.len(), 2);
        assert_eq!(trace.stages(), vec![StageId::new(1), StageId::new(0)]);
        assert_eq!(trace.last().unwrap().stage, StageId::new(0));
    }
}
