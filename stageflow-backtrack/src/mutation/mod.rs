//! Reversible stage mutations.
//!
//! This module provides:
//! - Temperature perturbation of a stage or of the whole run
//! - Contract extension/reversion and invoke wrapping
//! - A ledger of originals that rolls every mutation back exactly once

mod config;
mod contract;
mod ledger;

pub use config::{ConfigChange, ConfigMutator};
pub use contract::{feedback_field, ContractMutator, StageSnapshot, FEEDBACK_FIELD};
pub use ledger::{LedgerGuard, MutationLedger};
