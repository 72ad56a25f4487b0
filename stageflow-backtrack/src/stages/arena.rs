//! Shared arena of stage slots addressed by [`StageId`].

use super::{Invoke, StageId, StageModule};
use crate::contracts::StageContract;
use crate::errors::BacktrackError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Named configuration values of a stage (e.g. `temperature`).
pub type StageConfig = BTreeMap<String, serde_json::Value>;

/// The mutable state of one registered stage.
#[derive(Debug, Clone)]
pub struct StageSlot {
    /// Stage name.
    pub name: String,
    /// Stage configuration, read by the execution layer on every call.
    pub config: StageConfig,
    /// Declared contract.
    pub contract: StageContract,
    /// Current invoke entry point.
    pub invoke: Invoke,
}

/// Arena holding every stage of a pipeline.
///
/// Cloning the arena shares the slots: a mutation through one handle is
/// visible through every other. Use [`StageArena::fork`] to obtain an
/// isolated copy.
#[derive(Debug, Clone, Default)]
pub struct StageArena {
    slots: Arc<RwLock<Vec<StageSlot>>>,
}

impl StageArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stage module with its contract.
    pub fn register<M>(&self, module: M, contract: StageContract) -> StageId
    where
        M: StageModule + 'static,
    {
        self.register_arc(Arc::new(module), contract)
    }

    /// Registers a shared stage module with its contract.
    pub fn register_arc(&self, module: Arc<dyn StageModule>, contract: StageContract) -> StageId {
        let slot = StageSlot {
            name: module.name().to_string(),
            config: StageConfig::new(),
            contract,
            invoke: Invoke::module(module),
        };

        let mut slots = self.slots.write();
        slots.push(slot);
        StageId::new(slots.len() - 1)
    }

    /// Returns the number of registered stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Returns true if no stage is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Returns every registered handle in registration order.
    #[must_use]
    pub fn ids(&self) -> Vec<StageId> {
        (0..self.len()).map(StageId::new).collect()
    }

    /// Finds the first stage registered under `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<StageId> {
        self.slots
            .read()
            .iter()
            .position(|slot| slot.name == name)
            .map(StageId::new)
    }

    /// Returns a copy of the whole slot.
    pub fn slot(&self, id: StageId) -> Result<StageSlot, BacktrackError> {
        self.with_slot(id, Clone::clone)
    }

    /// Returns the stage name.
    pub fn name(&self, id: StageId) -> Result<String, BacktrackError> {
        self.with_slot(id, |slot| slot.name.clone())
    }

    /// Returns a copy of the stage configuration.
    pub fn config(&self, id: StageId) -> Result<StageConfig, BacktrackError> {
        self.with_slot(id, |slot| slot.config.clone())
    }

    /// Returns a single configuration value.
    pub fn config_value(
        &self,
        id: StageId,
        key: &str,
    ) -> Result<Option<serde_json::Value>, BacktrackError> {
        self.with_slot(id, |slot| slot.config.get(key).cloned())
    }

    /// Sets a configuration value and returns the previous one.
    pub fn set_config_value(
        &self,
        id: StageId,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<Option<serde_json::Value>, BacktrackError> {
        let key = key.into();
        self.with_slot_mut(id, |slot| slot.config.insert(key, value))
    }

    /// Removes a configuration value and returns it.
    pub fn remove_config_value(
        &self,
        id: StageId,
        key: &str,
    ) -> Result<Option<serde_json::Value>, BacktrackError> {
        self.with_slot_mut(id, |slot| slot.config.remove(key))
    }

    /// Returns a copy of the stage contract.
    pub fn contract(&self, id: StageId) -> Result<StageContract, BacktrackError> {
        self.with_slot(id, |slot| slot.contract.clone())
    }

    /// Replaces the stage contract and returns the previous one.
    pub fn replace_contract(
        &self,
        id: StageId,
        contract: StageContract,
    ) -> Result<StageContract, BacktrackError> {
        self.with_slot_mut(id, |slot| std::mem::replace(&mut slot.contract, contract))
    }

    /// Returns the current invoke entry point.
    pub fn invoke(&self, id: StageId) -> Result<Invoke, BacktrackError> {
        self.with_slot(id, |slot| slot.invoke.clone())
    }

    /// Replaces the invoke entry point and returns the previous one.
    pub fn replace_invoke(&self, id: StageId, invoke: Invoke) -> Result<Invoke, BacktrackError> {
        self.with_slot_mut(id, |slot| std::mem::replace(&mut slot.invoke, invoke))
    }

    /// Creates an isolated copy of the arena.
    ///
    /// Stage handles stay valid in the fork; mutations on either side are
    /// not visible to the other. Concurrent orchestrated runs over the same
    /// stages should each work on their own fork.
    #[must_use]
    pub fn fork(&self) -> Self {
        Self {
            slots: Arc::new(RwLock::new(self.slots.read().clone())),
        }
    }

    fn with_slot<R>(
        &self,
        id: StageId,
        f: impl FnOnce(&StageSlot) -> R,
    ) -> Result<R, BacktrackError> {
        let slots = self.slots.read();
        slots
            .get(id.index())
            .map(f)
            .ok_or(BacktrackError::UnknownStage(id))
    }

    fn with_slot_mut<R>(
        &self,
        id: StageId,
        f: impl FnOnce(&mut StageSlot) -> R,
    ) -> Result<R, BacktrackError> {
        let mut slots = self.slots.write();
        slots
            .get_mut(id.index())
            .map(f)
            .ok_or(BacktrackError::UnknownStage(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{Fields, FnStage};
    use serde_json::json;

    fn arena_with(names: &[&str]) -> StageArena {
        let arena = StageArena::new();
        for name in names {
            arena.register(
                FnStage::new(*name, |_ctx, _inputs| Ok(Fields::new())),
                StageContract::new("noop"),
            );
        }
        arena
    }

    #[test]
    fn test_register_assigns_sequential_ids() {
        let arena = arena_with(&["retrieve", "generate"]);

        assert_eq!(arena.len(), 2);
        assert_eq!(arena.ids(), vec![StageId::new(0), StageId::new(1)]);
        assert_eq!(arena.find("generate"), Some(StageId::new(1)));
        assert_eq!(arena.find("missing"), None);
    }

    #[test]
    fn test_config_roundtrip_returns_previous() {
        let arena = arena_with(&["generate"]);
        let id = StageId::new(0);

        let prev = arena.set_config_value(id, "temperature", json!(0.5)).unwrap();
        assert_eq!(prev, None);
        let prev = arena.set_config_value(id, "temperature", json!(0.9)).unwrap();
        assert_eq!(prev, Some(json!(0.5)));
        assert_eq!(arena.config_value(id, "temperature").unwrap(), Some(json!(0.9)));

        assert_eq!(arena.remove_config_value(id, "temperature").unwrap(), Some(json!(0.9)));
        assert!(arena.config(id).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_stage_is_an_error() {
        let arena = arena_with(&[]);
        let err = arena.name(StageId::new(7)).unwrap_err();
        assert!(matches!(err, BacktrackError::UnknownStage(id) if id.index() == 7));
    }

    #[test]
    fn test_clones_share_and_forks_isolate() {
        let arena = arena_with(&["generate"]);
        let id = StageId::new(0);
        let shared = arena.clone();
        let forked = arena.fork();

        shared.set_config_value(id, "temperature", json!(1.0)).unwrap();

        assert_eq!(arena.config_value(id, "temperature").unwrap(), Some(json!(1.0)));
        assert_eq!(forked.config_value(id, "temperature").unwrap(), None);
    }
}
