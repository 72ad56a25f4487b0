//! Numeric configuration perturbation.

use crate::context::{SettingsOverrides, TEMPERATURE_KEY};
use crate::errors::BacktrackError;
use crate::stages::{StageArena, StageId};
use serde::{Deserialize, Serialize};

/// A single configuration write, with enough detail to undo it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigChange {
    /// The mutated stage.
    pub stage: StageId,
    /// The configuration key.
    pub key: String,
    /// Value before the write; `None` if the key was absent.
    pub previous: Option<serde_json::Value>,
    /// Value after the write.
    pub current: serde_json::Value,
}

/// Read-modify-write of stage configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigMutator;

impl ConfigMutator {
    /// Writes `value` under `key` in the stage configuration.
    pub fn set(
        arena: &StageArena,
        stage: StageId,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<ConfigChange, BacktrackError> {
        let key = key.into();
        let previous = arena.set_config_value(stage, key.clone(), value.clone())?;
        Ok(ConfigChange {
            stage,
            key,
            previous,
            current: value,
        })
    }

    /// Overrides the temperature of one stage.
    pub fn set_temperature(
        arena: &StageArena,
        stage: StageId,
        temperature: f64,
    ) -> Result<ConfigChange, BacktrackError> {
        Self::set(arena, stage, TEMPERATURE_KEY, serde_json::json!(temperature))
    }

    /// Undoes a change, removing the key if it did not exist before.
    pub fn restore(arena: &StageArena, change: &ConfigChange) -> Result<(), BacktrackError> {
        match &change.previous {
            Some(previous) => {
                arena.set_config_value(change.stage, change.key.clone(), previous.clone())?;
            }
            None => {
                arena.remove_config_value(change.stage, &change.key)?;
            }
        }
        Ok(())
    }

    /// Overrides the temperature of every stage for one run frame.
    #[must_use]
    pub fn global_temperature(temperature: f64) -> SettingsOverrides {
        SettingsOverrides::none().with_temperature(temperature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::StageContract;
    use crate::stages::{Fields, FnStage};
    use serde_json::json;

    fn arena() -> (StageArena, StageId) {
        let arena = StageArena::new();
        let id = arena.register(
            FnStage::new("generate", |_ctx, _inputs| Ok(Fields::new())),
            StageContract::new("noop"),
        );
        (arena, id)
    }

    #[test]
    fn test_set_temperature_reports_previous() {
        let (arena, id) = arena();

        let change = ConfigMutator::set_temperature(&arena, id, 0.701).unwrap();
        assert_eq!(change.previous, None);
        assert_eq!(change.current, json!(0.701));
        assert_eq!(arena.config_value(id, TEMPERATURE_KEY).unwrap(), Some(json!(0.701)));

        let change = ConfigMutator::set_temperature(&arena, id, 0.702).unwrap();
        assert_eq!(change.previous, Some(json!(0.701)));
    }

    #[test]
    fn test_restore_absent_key_removes_it() {
        let (arena, id) = arena();
        let change = ConfigMutator::set_temperature(&arena, id, 0.9).unwrap();

        ConfigMutator::restore(&arena, &change).unwrap();
        assert!(arena.config(id).unwrap().is_empty());
    }

    #[test]
    fn test_restore_existing_key_puts_value_back() {
        let (arena, id) = arena();
        arena.set_config_value(id, "temperature", json!(0.2)).unwrap();

        let change = ConfigMutator::set_temperature(&arena, id, 0.9).unwrap();
        ConfigMutator::restore(&arena, &change).unwrap();
        assert_eq!(arena.config_value(id, "temperature").unwrap(), Some(json!(0.2)));
    }

    #[test]
    fn test_global_temperature_override() {
        assert_eq!(ConfigMutator::global_temperature(0.712).temperature(), Some(0.712));
    }
}
