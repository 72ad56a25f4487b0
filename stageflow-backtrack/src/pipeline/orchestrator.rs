//! The retry orchestrator.
//!
//! [`Backtracker`] runs a pipeline closure up to `max_backtracks + 1` times.
//! Each attempt runs in its own frame of the [`Runtime`], so it starts with
//! an empty trace. Only [`BacktrackError::Assertion`] is retried; every other
//! error propagates at once. Stage mutations are recorded in a
//! [`LedgerGuard`] and rolled back on every exit path.

use super::blame::{resolve_blame, Blame};
use super::policy::{BacktrackConfig, BacktrackPolicy};
use crate::context::{Runtime, SettingsOverrides};
use crate::errors::{AssertionFailure, BacktrackError, RetryExhausted};
use crate::events::names;
use crate::mutation::{ConfigMutator, ContractMutator, LedgerGuard};
use crate::stages::StageId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

/// Mutable state of one orchestrated call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Index of the current attempt (0-based).
    pub attempt: usize,
    /// Stage blamed for the most recent failure.
    pub backtrack_to: Option<StageId>,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

/// How an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The pipeline returned a value.
    Succeeded,
    /// The pipeline raised an assertion failure.
    AssertionFailed,
}

/// Diagnostics of a single attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Attempt index.
    pub index: usize,
    /// When the pipeline was invoked.
    pub started_at: DateTime<Utc>,
    /// When the pipeline returned.
    pub ended_at: DateTime<Utc>,
    /// Result of the attempt.
    pub outcome: AttemptOutcome,
    /// Stage blamed for the failure.
    pub blame: Option<StageId>,
    /// Failure message.
    pub message: Option<String>,
    /// Temperature override applied to this attempt.
    pub temperature: Option<f64>,
}

/// Result of an orchestrated call together with its attempt history.
#[derive(Debug, Clone)]
pub struct RetryReport<T> {
    /// Unique id of the call.
    pub run_id: Uuid,
    /// Policy that was applied.
    pub policy: BacktrackPolicy,
    /// Value of the first attempt that did not fail an assertion.
    pub result: Option<T>,
    /// One record per attempt, in order.
    pub attempts: Vec<AttemptRecord>,
    /// Stages whose mutations were rolled back.
    pub restored: Vec<StageId>,
    /// True if every attempt failed.
    pub exhausted: bool,
}

impl<T> RetryReport<T> {
    /// Returns true if every attempt failed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Returns the message of the last failed attempt.
    #[must_use]
    pub fn last_message(&self) -> Option<&str> {
        self.attempts
            .iter()
            .rev()
            .find_map(|attempt| attempt.message.as_deref())
    }

    /// Discards the history and returns the result.
    #[must_use]
    pub fn into_option(self) -> Option<T> {
        self.result
    }

    /// Returns the result, turning exhaustion into an error.
    pub fn into_result(self) -> Result<T, BacktrackError> {
        let attempts = self.attempts.len();
        let last_message = self.last_message().map(String::from);
        self.result
            .ok_or_else(|| RetryExhausted::new(attempts, last_message).into())
    }
}

/// Runs a pipeline closure with assertion-driven backtracking.
#[derive(Debug, Clone, Default)]
pub struct Backtracker {
    config: BacktrackConfig,
}

impl Backtracker {
    /// Creates a backtracker.
    #[must_use]
    pub fn new(config: BacktrackConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BacktrackConfig {
        &self.config
    }

    /// Runs `pipeline` and returns the first successful value.
    ///
    /// Returns `Ok(None)` when every attempt failed an assertion.
    ///
    /// # Errors
    ///
    /// Any error other than [`BacktrackError::Assertion`] raised by the
    /// pipeline, or by a mutation, after every mutation was rolled back.
    pub fn run<T, F>(&self, runtime: &Runtime, pipeline: F) -> Result<Option<T>, BacktrackError>
    where
        F: FnMut(&Runtime) -> Result<T, BacktrackError>,
    {
        self.run_report(runtime, pipeline).map(RetryReport::into_option)
    }

    /// Runs `pipeline` and returns the full attempt history.
    pub fn run_report<T, F>(
        &self,
        runtime: &Runtime,
        mut pipeline: F,
    ) -> Result<RetryReport<T>, BacktrackError>
    where
        F: FnMut(&Runtime) -> Result<T, BacktrackError>,
    {
        self.config.validate()?;

        let run_id = Uuid::new_v4();
        let policy = self.config.policy;
        let span = info_span!("backtrack", run_id = %run_id, policy = %policy);
        let _enter = span.enter();

        let mut guard = LedgerGuard::new(runtime);
        let mut state = RetryState::default();
        let mut attempts = Vec::with_capacity(self.config.max_attempts());
        let mut result = None;

        for attempt in 0..self.config.max_attempts() {
            state.attempt = attempt;
            let temperature = self.prepare(runtime, &mut guard, &state)?;
            let overrides = match (policy, temperature) {
                (BacktrackPolicy::GlobalPerturbation, Some(t)) => {
                    ConfigMutator::global_temperature(t)
                }
                _ => SettingsOverrides::none(),
            };

            debug!(attempt, "Starting attempt");
            runtime.event_sink().emit(
                names::ATTEMPT_STARTED,
                Some(json!({"run_id": run_id, "attempt": attempt, "temperature": temperature})),
            );

            let started_at = Utc::now();
            let outcome = runtime.run_frame(&overrides, || pipeline(runtime));
            let ended_at = Utc::now();

            match outcome {
                Ok(value) => {
                    info!(attempt, "Attempt succeeded");
                    runtime.event_sink().emit(
                        names::SUCCEEDED,
                        Some(json!({"run_id": run_id, "attempt": attempt})),
                    );
                    attempts.push(AttemptRecord {
                        index: attempt,
                        started_at,
                        ended_at,
                        outcome: AttemptOutcome::Succeeded,
                        blame: None,
                        message: None,
                        temperature,
                    });
                    result = Some(value);
                    break;
                }
                Err(BacktrackError::Assertion(failure)) => {
                    let blame = self.on_failure(runtime, run_id, &mut state, &failure);
                    attempts.push(AttemptRecord {
                        index: attempt,
                        started_at,
                        ended_at,
                        outcome: AttemptOutcome::AssertionFailed,
                        blame,
                        message: Some(failure.message),
                        temperature,
                    });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Pipeline failed, not retrying");
                    return Err(e);
                }
            }
        }

        let restored = guard.finish();
        let exhausted = result.is_none();
        if exhausted {
            warn!(
                attempts = attempts.len(),
                last_error = state.last_error.as_deref().unwrap_or_default(),
                "Backtracking exhausted, returning no result"
            );
            runtime.event_sink().emit(
                names::EXHAUSTED,
                Some(json!({
                    "run_id": run_id,
                    "attempts": attempts.len(),
                    "last_error": state.last_error,
                })),
            );
        }

        Ok(RetryReport {
            run_id,
            policy,
            result,
            attempts,
            restored,
            exhausted,
        })
    }

    /// Records blame and the failure message for the next attempt.
    fn on_failure(
        &self,
        runtime: &Runtime,
        run_id: Uuid,
        state: &mut RetryState,
        failure: &AssertionFailure,
    ) -> Option<StageId> {
        let blame = resolve_blame(&failure.trace_snapshot);
        match blame {
            Blame::Stage(stage) => state.backtrack_to = Some(stage),
            Blame::NoTrace => {
                warn!(
                    attempt = state.attempt,
                    "UNREACHABLE: no trace available, this should not happen. Is this run time?"
                );
                runtime.event_sink().emit(
                    names::BLAME_MISSING,
                    Some(json!({"run_id": run_id, "attempt": state.attempt})),
                );
            }
        }

        let stage_name = blame.stage().and_then(|s| runtime.stages().name(s).ok());
        warn!(
            attempt = state.attempt,
            message = %failure.message,
            blame = stage_name.as_deref().unwrap_or("<none>"),
            "Assertion failed"
        );
        runtime.event_sink().emit(
            names::ATTEMPT_FAILED,
            Some(json!({
                "run_id": run_id,
                "attempt": state.attempt,
                "message": failure.message,
                "blame": blame.stage().map(StageId::index),
                "blame_name": stage_name,
            })),
        );

        state.last_error = Some(failure.message.clone());
        blame.stage()
    }

    /// Applies the policy's mutation before an attempt.
    ///
    /// Returns the temperature override in effect for the attempt.
    fn prepare(
        &self,
        runtime: &Runtime,
        guard: &mut LedgerGuard,
        state: &RetryState,
    ) -> Result<Option<f64>, BacktrackError> {
        let Some(stage) = state.backtrack_to.filter(|_| state.attempt > 0) else {
            return Ok(None);
        };
        let arena = runtime.stages();

        match self.config.policy {
            BacktrackPolicy::Blind => Ok(None),
            BacktrackPolicy::GlobalPerturbation => {
                let temperature = self.temperature_at(state.attempt);
                info!(
                    attempt = state.attempt,
                    blame = %stage,
                    temperature,
                    "Perturbing global temperature"
                );
                runtime.event_sink().emit(
                    names::STAGE_MUTATED,
                    Some(json!({
                        "attempt": state.attempt,
                        "scope": "global",
                        "temperature": temperature,
                    })),
                );
                Ok(Some(temperature))
            }
            BacktrackPolicy::TargetedPerturbation => {
                let temperature = self.temperature_at(state.attempt);
                let change = ConfigMutator::set_temperature(arena, stage, temperature)?;
                info!(
                    attempt = state.attempt,
                    stage = %stage,
                    before = ?change.previous,
                    after = %change.current,
                    "Perturbing stage temperature"
                );
                runtime.event_sink().emit(
                    names::STAGE_MUTATED,
                    Some(json!({
                        "attempt": state.attempt,
                        "scope": "stage",
                        "stage": stage.index(),
                        "before": change.previous,
                        "after": change.current,
                    })),
                );
                guard.ledger_mut().record_config(change);
                Ok(Some(temperature))
            }
            BacktrackPolicy::FeedbackInjection => {
                let message = state.last_error.clone().unwrap_or_default();
                let original = guard.ledger_mut().record_snapshot(arena, stage)?;
                let contract =
                    ContractMutator::inject_feedback(arena, stage, &original, &message)?;
                info!(
                    attempt = state.attempt,
                    stage = %stage,
                    feedback = %message,
                    version = contract.version(),
                    "Injecting feedback"
                );
                runtime.event_sink().emit(
                    names::STAGE_MUTATED,
                    Some(json!({
                        "attempt": state.attempt,
                        "scope": "contract",
                        "stage": stage.index(),
                        "feedback": message,
                        "fields": contract.field_names(),
                    })),
                );
                Ok(None)
            }
        }
    }

    fn temperature_at(&self, attempt: usize) -> f64 {
        self.config
            .schedule()
            .map_or(0.0, |schedule| schedule.at(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::StageArena;

    #[test]
    fn test_report_into_result() {
        let report: RetryReport<u32> = RetryReport {
            run_id: Uuid::new_v4(),
            policy: BacktrackPolicy::Blind,
            result: None,
            attempts: vec![AttemptRecord {
                index: 0,
                started_at: Utc::now(),
                ended_at: Utc::now(),
                outcome: AttemptOutcome::AssertionFailed,
                blame: None,
                message: Some("too long".into()),
                temperature: None,
            }],
            restored: Vec::new(),
            exhausted: true,
        };

        assert_eq!(report.last_message(), Some("too long"));
        match report.into_result().unwrap_err() {
            BacktrackError::Exhausted(e) => {
                assert_eq!(e.attempts, 1);
                assert_eq!(e.last_message.as_deref(), Some("too long"));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[test]
    fn test_first_attempt_success_runs_once() {
        let runtime = Runtime::new(StageArena::new());
        let mut calls = 0;

        let report = Backtracker::default()
            .run_report(&runtime, |_rt| {
                calls += 1;
                Ok("done")
            })
            .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(report.result, Some("done"));
        assert!(!report.is_exhausted());
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.attempts[0].outcome, AttemptOutcome::Succeeded);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let runtime = Runtime::new(StageArena::new());
        let config = BacktrackConfig::default()
            .with_schedule(crate::pipeline::TemperatureSchedule::new(f64::NAN, 0.1));

        let err = Backtracker::new(config)
            .run(&runtime, |_rt| Ok(()))
            .unwrap_err();
        assert!(matches!(err, BacktrackError::Config(_)));
    }
}
