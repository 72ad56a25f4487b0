//! Error types for the backtracking engine.
//!
//! Only [`BacktrackError::Assertion`] is ever intercepted by the retry
//! orchestrator. Every other variant propagates to the caller unchanged.

use crate::stages::StageId;
use crate::trace::TraceEntry;
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for backtracking operations.
#[derive(Debug, Error)]
pub enum BacktrackError {
    /// An assertion predicate returned `false`.
    #[error("{0}")]
    Assertion(#[from] AssertionFailure),

    /// An assertion predicate returned something other than a boolean.
    #[error("{0}")]
    InvalidAssertion(#[from] InvalidAssertionError),

    /// A stage was invoked in a way its contract does not allow.
    #[error("{0}")]
    Contract(#[from] ContractError),

    /// A stage handle does not belong to the arena.
    #[error("Unknown stage: {0}")]
    UnknownStage(StageId),

    /// A stage's own logic failed.
    #[error("Stage '{stage}' failed: {message}")]
    Stage {
        /// The stage name.
        stage: String,
        /// The failure message.
        message: String,
    },

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// All attempts failed their assertions.
    #[error("{0}")]
    Exhausted(#[from] RetryExhausted),

    /// Any other error raised by the wrapped pipeline.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] anyhow::Error),
}

impl BacktrackError {
    /// Creates a stage failure.
    #[must_use]
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Returns the assertion failure if this error is one.
    #[must_use]
    pub fn as_assertion_failure(&self) -> Option<&AssertionFailure> {
        match self {
            Self::Assertion(failure) => Some(failure),
            _ => None,
        }
    }

    /// Returns true if the orchestrator may retry after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Assertion(_))
    }
}

/// Raised when an assertion predicate evaluates to `false`.
///
/// Carries the trace visible at the moment the assertion was evaluated so
/// that blame can be assigned without consulting the runtime again.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct AssertionFailure {
    /// The assertion message.
    pub message: String,
    /// Trace entries captured at raise time, oldest first.
    pub trace_snapshot: Vec<TraceEntry>,
}

impl AssertionFailure {
    /// Creates a new assertion failure.
    #[must_use]
    pub fn new(message: impl Into<String>, trace_snapshot: Vec<TraceEntry>) -> Self {
        Self {
            message: message.into(),
            trace_snapshot,
        }
    }

    /// Returns the stage of the most recent trace entry.
    #[must_use]
    pub fn last_stage(&self) -> Option<StageId> {
        self.trace_snapshot.last().map(|entry| entry.stage)
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!("AssertionFailure"));
        map.insert("message".to_string(), serde_json::json!(self.message));
        map.insert(
            "trace_len".to_string(),
            serde_json::json!(self.trace_snapshot.len()),
        );
        if let Some(stage) = self.last_stage() {
            map.insert("last_stage".to_string(), serde_json::json!(stage.index()));
        }
        map
    }
}

/// Raised when an assertion predicate yields a non-boolean value.
///
/// This is a programming error and is never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Assertion function should always return a bool, got {found} (message: '{message}')")]
pub struct InvalidAssertionError {
    /// The assertion message.
    pub message: String,
    /// Description of the value the predicate produced.
    pub found: String,
}

impl InvalidAssertionError {
    /// Creates a new invalid assertion error.
    #[must_use]
    pub fn new(message: impl Into<String>, found: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            found: found.into(),
        }
    }
}

/// Contract violations detected when a stage is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// A declared input field was not supplied.
    #[error("Stage '{stage}' is missing required input '{field}'")]
    MissingInput {
        /// The stage name.
        stage: String,
        /// The missing field.
        field: String,
    },

    /// A declared output field was not produced.
    #[error("Stage '{stage}' did not produce declared output '{field}'")]
    MissingOutput {
        /// The stage name.
        stage: String,
        /// The missing field.
        field: String,
    },
}

impl ContractError {
    /// Creates a missing input error.
    #[must_use]
    pub fn missing_input(stage: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingInput {
            stage: stage.into(),
            field: field.into(),
        }
    }

    /// Creates a missing output error.
    #[must_use]
    pub fn missing_output(stage: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingOutput {
            stage: stage.into(),
            field: field.into(),
        }
    }
}

/// Produced when every attempt failed its assertions.
///
/// The wrapped callables never return this; it only appears when a caller
/// opts in through `RetryReport::into_result`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Backtracking exhausted after {attempts} attempt(s){}", message_suffix(.last_message))]
pub struct RetryExhausted {
    /// Number of attempts made.
    pub attempts: usize,
    /// Message of the last assertion failure.
    pub last_message: Option<String>,
}

fn message_suffix(message: &Option<String>) -> String {
    message.as_ref().map(|m| format!(": {m}")).unwrap_or_default()
}

impl RetryExhausted {
    /// Creates a new exhaustion error.
    #[must_use]
    pub fn new(attempts: usize, last_message: Option<String>) -> Self {
        Self {
            attempts,
            last_message,
        }
    }
}
