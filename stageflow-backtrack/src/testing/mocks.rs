//! Mock stages for testing.

use parking_lot::Mutex;

use crate::context::StageContext;
use crate::errors::BacktrackError;
use crate::stages::{Fields, StageModule};

/// One recorded execution of a [`RecordingStage`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Inputs passed to the module.
    pub inputs: Fields,
    /// Effective temperature.
    pub temperature: Option<f64>,
    /// Contract field names at call time.
    pub fields: Vec<String>,
}

/// A stage that records every execution and returns fixed outputs.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    outputs: Fields,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingStage {
    /// Creates a stage returning `outputs` on every call.
    #[must_use]
    pub fn new(name: impl Into<String>, outputs: Fields) -> Self {
        Self {
            name: name.into(),
            outputs,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns every recorded execution.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the most recent execution.
    #[must_use]
    pub fn last_call(&self) -> Option<RecordedCall> {
        self.calls.lock().last().cloned()
    }

    /// Resets call tracking.
    pub fn reset(&self) {
        self.calls.lock().clear();
    }
}

impl StageModule for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, ctx: &StageContext<'_>, inputs: &Fields) -> Result<Fields, BacktrackError> {
        self.calls.lock().push(RecordedCall {
            inputs: inputs.clone(),
            temperature: ctx.temperature(),
            fields: ctx
                .contract()
                .field_names()
                .into_iter()
                .map(String::from)
                .collect(),
        });
        Ok(self.outputs.clone())
    }
}

/// A stage that returns a scripted sequence of outputs.
///
/// Call `n` returns the `n`-th script entry; the last entry repeats once the
/// script is used up.
#[derive(Debug)]
pub struct ScriptedStage {
    name: String,
    script: Vec<Fields>,
    cursor: Mutex<usize>,
}

impl ScriptedStage {
    /// Creates a scripted stage.
    #[must_use]
    pub fn new(name: impl Into<String>, script: Vec<Fields>) -> Self {
        Self {
            name: name.into(),
            script,
            cursor: Mutex::new(0),
        }
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.cursor.lock()
    }
}

impl StageModule for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, _ctx: &StageContext<'_>, _inputs: &Fields) -> Result<Fields, BacktrackError> {
        let mut cursor = self.cursor.lock();
        let index = (*cursor).min(self.script.len().saturating_sub(1));
        *cursor += 1;
        self.script
            .get(index)
            .cloned()
            .ok_or_else(|| BacktrackError::stage(&self.name, "empty script"))
    }
}

/// A stage that always fails with a stage error.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    error: String,
}

impl FailingStage {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
        }
    }
}

impl StageModule for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, _ctx: &StageContext<'_>, _inputs: &Fields) -> Result<Fields, BacktrackError> {
        Err(BacktrackError::stage(&self.name, &self.error))
    }
}
