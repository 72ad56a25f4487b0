//! Process-level execution parameters and per-frame overrides.

use crate::stages::StageConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration key holding the sampling temperature.
pub const TEMPERATURE_KEY: &str = "temperature";

/// Execution parameters visible to every stage of a run.
///
/// A stage's own configuration takes precedence over these values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Randomization temperature for the whole pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Additional named parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl ExecutionSettings {
    /// Creates empty settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets a named parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Returns these settings with `overrides` applied on top.
    #[must_use]
    pub fn merged(&self, overrides: &SettingsOverrides) -> Self {
        let mut next = self.clone();
        if let Some(t) = overrides.temperature {
            next.temperature = Some(t);
        }
        next.params
            .extend(overrides.params.iter().map(|(k, v)| (k.clone(), v.clone())));
        next
    }

    /// Computes the configuration a stage actually runs with.
    #[must_use]
    pub fn effective_config(&self, stage_config: &StageConfig) -> StageConfig {
        let mut config: StageConfig = self.params.clone();
        if let Some(t) = self.temperature {
            config.insert(TEMPERATURE_KEY.to_string(), serde_json::json!(t));
        }
        config.extend(stage_config.iter().map(|(k, v)| (k.clone(), v.clone())));
        config
    }
}

/// Overrides pushed for the duration of one run frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsOverrides {
    temperature: Option<f64>,
    params: BTreeMap<String, serde_json::Value>,
}

impl SettingsOverrides {
    /// Creates an empty override set.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Overrides the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Overrides a named parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Returns the overridden temperature.
    #[must_use]
    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    /// Returns true if nothing is overridden.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.params.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merged_overrides_temperature() {
        let base = ExecutionSettings::new()
            .with_temperature(0.0)
            .with_param("max_tokens", json!(100));
        let merged = base.merged(&SettingsOverrides::none().with_temperature(0.712));

        assert_eq!(merged.temperature, Some(0.712));
        assert_eq!(merged.params["max_tokens"], 100);
        assert_eq!(base.temperature, Some(0.0));
    }

    #[test]
    fn test_stage_config_wins_over_settings() {
        let settings = ExecutionSettings::new().with_temperature(0.0);
        let mut stage = StageConfig::new();
        stage.insert(TEMPERATURE_KEY.into(), json!(0.701));

        let effective = settings.effective_config(&stage);
        assert_eq!(effective[TEMPERATURE_KEY], json!(0.701));

        let effective = settings.effective_config(&StageConfig::new());
        assert_eq!(effective[TEMPERATURE_KEY], json!(0.0));
    }

    #[test]
    fn test_empty_overrides() {
        assert!(SettingsOverrides::none().is_empty());
        assert!(!SettingsOverrides::none().with_param("k", json!(1)).is_empty());
    }
}
