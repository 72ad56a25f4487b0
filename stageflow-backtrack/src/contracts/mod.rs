//! Stage contracts.
//!
//! This module provides:
//! - Field descriptors with input/output roles
//! - Versioned, immutable contract snapshots
//! - Input/output validation against a contract

mod contract;

pub use contract::{FieldRole, FieldSpec, StageContract};
