//! Pipeline retry orchestration.
//!
//! This module provides:
//! - Backtracking policies and their configuration
//! - Blame resolution over an execution trace
//! - The retry orchestrator and its attempt report
//! - One wrapping transform per policy

mod blame;
mod orchestrator;
mod policy;
mod transforms;


pub use blame::{resolve_blame, Blame};
pub use orchestrator::{AttemptOutcome, AttemptRecord, Backtracker, RetryReport, RetryState};
pub use policy::{BacktrackConfig, BacktrackPolicy, TemperatureSchedule};
pub use transforms::{
    assert_latest_feedback_transform, assert_latest_transform, assert_transform,
    assert_update_transform, backtrack_transform,
};
