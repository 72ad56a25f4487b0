//! Backtracking policies and their configuration.

use crate::errors::BacktrackError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Repair strategy applied between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacktrackPolicy {
    /// Re-run without mutating anything.
    #[default]
    Blind,
    /// Raise the temperature of every stage for the next attempt.
    GlobalPerturbation,
    /// Raise the temperature of the blamed stage only.
    TargetedPerturbation,
    /// Feed the failure message back into the blamed stage as an input.
    FeedbackInjection,
}

impl BacktrackPolicy {
    /// Returns the policy name as used in logs and events.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Blind => "blind",
            Self::GlobalPerturbation => "global_perturbation",
            Self::TargetedPerturbation => "targeted_perturbation",
            Self::FeedbackInjection => "feedback_injection",
        }
    }

    /// Returns the default temperature schedule, if the policy uses one.
    #[must_use]
    pub const fn default_schedule(self) -> Option<TemperatureSchedule> {
        match self {
            Self::GlobalPerturbation => Some(TemperatureSchedule::global()),
            Self::TargetedPerturbation => Some(TemperatureSchedule::targeted()),
            Self::Blind | Self::FeedbackInjection => None,
        }
    }
}

impl fmt::Display for BacktrackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Temperature used on attempt `i`: `base + step * i`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureSchedule {
    /// Temperature at attempt zero.
    pub base: f64,
    /// Increment per attempt.
    pub step: f64,
}

impl TemperatureSchedule {
    /// Creates a schedule.
    #[must_use]
    pub const fn new(base: f64, step: f64) -> Self {
        Self { base, step }
    }

    /// Default schedule of the global perturbation policy.
    #[must_use]
    pub const fn global() -> Self {
        Self::new(0.71, 0.002)
    }

    /// Default schedule of the targeted perturbation policy.
    #[must_use]
    pub const fn targeted() -> Self {
        Self::new(0.7, 0.001)
    }

    /// Returns the temperature for an attempt.
    #[must_use]
    pub fn at(&self, attempt: usize) -> f64 {
        self.base + self.step * attempt as f64
    }

    /// Checks that both values are finite and non-negative.
    pub fn validate(&self) -> Result<(), BacktrackError> {
        if !self.base.is_finite() || self.base < 0.0 {
            return Err(BacktrackError::Config(format!(
                "schedule base must be a non-negative number, got {}",
                self.base
            )));
        }
        if !self.step.is_finite() || self.step < 0.0 {
            return Err(BacktrackError::Config(format!(
                "schedule step must be a non-negative number, got {}",
                self.step
            )));
        }
        Ok(())
    }
}

fn default_max_backtracks() -> usize {
    2
}

/// Configuration of one orchestrated call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktrackConfig {
    /// Additional attempts after the first.
    #[serde(default = "default_max_backtracks")]
    pub max_backtracks: usize,
    /// Repair strategy.
    #[serde(default)]
    pub policy: BacktrackPolicy,
    /// Temperature schedule; the policy default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<TemperatureSchedule>,
}

impl Default for BacktrackConfig {
    fn default() -> Self {
        Self {
            max_backtracks: default_max_backtracks(),
            policy: BacktrackPolicy::default(),
            schedule: None,
        }
    }
}

impl BacktrackConfig {
    /// Creates a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a config for a policy.
    #[must_use]
    pub fn for_policy(policy: BacktrackPolicy, max_backtracks: usize) -> Self {
        Self {
            max_backtracks,
            policy,
            schedule: None,
        }
    }

    /// Sets the number of backtracks.
    #[must_use]
    pub fn with_max_backtracks(mut self, max_backtracks: usize) -> Self {
        self.max_backtracks = max_backtracks;
        self
    }

    /// Sets the policy.
    #[must_use]
    pub fn with_policy(mut self, policy: BacktrackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets an explicit temperature schedule.
    #[must_use]
    pub fn with_schedule(mut self, schedule: TemperatureSchedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Returns the schedule in effect, if the policy uses one.
    #[must_use]
    pub fn schedule(&self) -> Option<TemperatureSchedule> {
        match self.policy {
            BacktrackPolicy::GlobalPerturbation | BacktrackPolicy::TargetedPerturbation => {
                self.schedule.or_else(|| self.policy.default_schedule())
            }
            BacktrackPolicy::Blind | BacktrackPolicy::FeedbackInjection => None,
        }
    }

    /// Returns the maximum number of pipeline invocations.
    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.max_backtracks.saturating_add(1)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), BacktrackError> {
        if let Some(schedule) = &self.schedule {
            schedule.validate()?;
        }
        Ok(())
    }

    /// Parses and validates a config from JSON.
    pub fn from_json(json: &str) -> Result<Self, BacktrackError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BacktrackError::Config(format!("invalid backtrack config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = BacktrackConfig::default();
        assert_eq!(config.max_backtracks, 2);
        assert_eq!(config.policy, BacktrackPolicy::Blind);
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.schedule(), None);
    }

    #[test]
    fn test_policy_default_schedules() {
        let global = BacktrackConfig::for_policy(BacktrackPolicy::GlobalPerturbation, 2);
        assert_eq!(global.schedule(), Some(TemperatureSchedule::new(0.71, 0.002)));

        let targeted = BacktrackConfig::for_policy(BacktrackPolicy::TargetedPerturbation, 2);
        assert_eq!(targeted.schedule(), Some(TemperatureSchedule::new(0.7, 0.001)));

        let custom = targeted.with_schedule(TemperatureSchedule::new(1.0, 0.1));
        assert!((custom.schedule().unwrap().at(2) - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_schedule_at() {
        let schedule = TemperatureSchedule::targeted();
        assert_eq!(schedule.at(0), 0.7);
        assert!((schedule.at(2) - 0.702).abs() < 1e-12);
    }

    #[test]
    fn test_from_json() {
        let config = BacktrackConfig::from_json(
            r#"{"policy": "feedback_injection", "max_backtracks": 4}"#,
        )
        .unwrap();
        assert_eq!(config.policy, BacktrackPolicy::FeedbackInjection);
        assert_eq!(config.max_backtracks, 4);

        let config = BacktrackConfig::from_json("{}").unwrap();
        assert_eq!(config, BacktrackConfig::default());
    }

    #[test]
    fn test_from_json_rejects_bad_input() {
        assert!(matches!(
            BacktrackConfig::from_json(r#"{"policy": "random"}"#),
            Err(BacktrackError::Config(_))
        ));
        assert!(matches!(
            BacktrackConfig::from_json(r#"{"schedule": {"base": -1.0, "step": 0.1}}"#),
            Err(BacktrackError::Config(_))
        ));
    }

    #[test]
    fn test_policy_display() {
        assert_eq!(BacktrackPolicy::TargetedPerturbation.to_string(), "targeted_perturbation");
    }
}
