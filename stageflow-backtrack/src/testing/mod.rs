//! Testing utilities for backtracking pipelines.
//!
//! This module provides:
//! - Recording, scripted and failing stages
//! - A pipeline fixture with a collecting event sink
//! - Assertions for stage rollback and emitted events

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_event_count, assert_events_in_order, assert_state_restored};
pub use fixtures::{StageState, TestPipeline};
pub use mocks::{FailingStage, RecordedCall, RecordingStage, ScriptedStage};
