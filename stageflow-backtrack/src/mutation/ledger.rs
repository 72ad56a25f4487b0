//! Bookkeeping of original stage state and guaranteed rollback.

use super::config::{ConfigChange, ConfigMutator};
use super::contract::{ContractMutator, StageSnapshot};
use crate::context::Runtime;
use crate::errors::BacktrackError;
use crate::events::names;
use crate::stages::{StageArena, StageId};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Originals of every stage touched during one orchestrated call.
///
/// Only the first record per stage (or per stage and config key) is kept,
/// so later mutations never overwrite the pre-run state.
#[derive(Debug, Default)]
pub struct MutationLedger {
    snapshots: BTreeMap<StageId, StageSnapshot>,
    configs: BTreeMap<(StageId, String), ConfigChange>,
}

impl MutationLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the stage's contract and invoke unless already recorded.
    ///
    /// Returns the recorded original.
    pub fn record_snapshot(
        &mut self,
        arena: &StageArena,
        stage: StageId,
    ) -> Result<StageSnapshot, BacktrackError> {
        if let Some(original) = self.snapshots.get(&stage) {
            return Ok(original.clone());
        }
        let original = ContractMutator::snapshot(arena, stage)?;
        self.snapshots.insert(stage, original.clone());
        Ok(original)
    }

    /// Records a configuration write unless the key was already recorded.
    pub fn record_config(&mut self, change: ConfigChange) {
        self.configs
            .entry((change.stage, change.key.clone()))
            .or_insert(change);
    }

    /// Returns the recorded original of a stage.
    #[must_use]
    pub fn original(&self, stage: StageId) -> Option<&StageSnapshot> {
        self.snapshots.get(&stage)
    }

    /// Returns every stage with pending rollback work, in index order.
    #[must_use]
    pub fn mutated_stages(&self) -> Vec<StageId> {
        let mut stages: Vec<StageId> = self
            .snapshots
            .keys()
            .copied()
            .chain(self.configs.keys().map(|(stage, _)| *stage))
            .collect();
        stages.sort_unstable();
        stages.dedup();
        stages
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty() && self.configs.is_empty()
    }

    /// Restores every recorded original and empties the ledger.
    ///
    /// Restoration of one stage failing does not stop the others. Returns
    /// the stages that were restored.
    pub fn rollback(&mut self, runtime: &Runtime) -> Vec<StageId> {
        let stages = self.mutated_stages();
        let arena = runtime.stages();
        let mut failed = Vec::new();

        for (stage, original) in std::mem::take(&mut self.snapshots) {
            if let Err(e) = ContractMutator::restore(arena, stage, &original) {
                warn!(stage = %stage, error = %e, "Failed to restore stage contract");
                failed.push(stage);
            }
        }
        for ((stage, key), change) in std::mem::take(&mut self.configs) {
            if let Err(e) = ConfigMutator::restore(arena, &change) {
                warn!(stage = %stage, key = %key, error = %e, "Failed to restore stage config");
                failed.push(stage);
            }
        }

        let restored: Vec<StageId> = stages
            .into_iter()
            .filter(|stage| !failed.contains(stage))
            .collect();
        for stage in &restored {
            debug!(stage = %stage, "Stage restored");
            runtime.event_sink().emit(
                names::STAGE_RESTORED,
                Some(serde_json::json!({
                    "stage": stage.index(),
                    "name": arena.name(*stage).ok(),
                })),
            );
        }
        restored
    }
}

/// Rolls a [`MutationLedger`] back when dropped.
///
/// Call [`LedgerGuard::finish`] on the normal path to learn which stages
/// were restored; early returns and unwinding are covered by `Drop`.
#[derive(Debug)]
pub struct LedgerGuard {
    runtime: Runtime,
    ledger: MutationLedger,
}

impl LedgerGuard {
    /// Creates a guard with an empty ledger.
    #[must_use]
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            runtime: runtime.clone(),
            ledger: MutationLedger::new(),
        }
    }

    /// Returns the ledger.
    #[must_use]
    pub fn ledger(&self) -> &MutationLedger {
        &self.ledger
    }

    /// Returns the ledger for recording.
    pub fn ledger_mut(&mut self) -> &mut MutationLedger {
        &mut self.ledger
    }

    /// Rolls back now and returns the restored stages.
    pub fn finish(mut self) -> Vec<StageId> {
        self.ledger.rollback(&self.runtime)
    }
}

impl Drop for LedgerGuard {
    fn drop(&mut self) {
        if !self.ledger.is_empty() {
            self.ledger.rollback(&self.runtime);
        }
    }
}
