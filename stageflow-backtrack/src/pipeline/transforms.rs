//! Wrapping operations, one per policy.
//!
//! Each transform turns a pipeline closure `FnMut(&Runtime, A) -> Result<T>`
//! into one with the same arguments that returns `Result<Option<T>>`, where
//! `None` means every attempt failed its assertions.

use super::orchestrator::Backtracker;
use super::policy::{BacktrackConfig, BacktrackPolicy};
use crate::context::Runtime;
use crate::errors::BacktrackError;

/// Wraps `func` with backtracking driven by `config`.
pub fn backtrack_transform<A, T, F>(
    config: BacktrackConfig,
    mut func: F,
) -> impl FnMut(&Runtime, A) -> Result<Option<T>, BacktrackError>
where
    A: Clone,
    F: FnMut(&Runtime, A) -> Result<T, BacktrackError>,
{
    let backtracker = Backtracker::new(config);
    move |runtime: &Runtime, args: A| {
        backtracker.run(runtime, |rt: &Runtime| func(rt, args.clone()))
    }
}

/// Blind retry.
pub fn assert_transform<A, T, F>(
    max_backtracks: usize,
    func: F,
) -> impl FnMut(&Runtime, A) -> Result<Option<T>, BacktrackError>
where
    A: Clone,
    F: FnMut(&Runtime, A) -> Result<T, BacktrackError>,
{
    backtrack_transform(
        BacktrackConfig::for_policy(BacktrackPolicy::Blind, max_backtracks),
        func,
    )
}

/// Retry with a rising temperature for the whole pipeline.
pub fn assert_update_transform<A, T, F>(
    max_backtracks: usize,
    func: F,
) -> impl FnMut(&Runtime, A) -> Result<Option<T>, BacktrackError>
where
    A: Clone,
    F: FnMut(&Runtime, A) -> Result<T, BacktrackError>,
{
    backtrack_transform(
        BacktrackConfig::for_policy(BacktrackPolicy::GlobalPerturbation, max_backtracks),
        func,
    )
}

/// Retry with a rising temperature on the blamed stage only.
pub fn assert_latest_transform<A, T, F>(
    max_backtracks: usize,
    func: F,
) -> impl FnMut(&Runtime, A) -> Result<Option<T>, BacktrackError>
where
    A: Clone,
    F: FnMut(&Runtime, A) -> Result<T, BacktrackError>,
{
    backtrack_transform(
        BacktrackConfig::for_policy(BacktrackPolicy::TargetedPerturbation, max_backtracks),
        func,
    )
}

/// Retry with the failure message injected into the blamed stage.
pub fn assert_latest_feedback_transform<A, T, F>(
    max_backtracks: usize,
    func: F,
) -> impl FnMut(&Runtime, A) -> Result<Option<T>, BacktrackError>
where
    A: Clone,
    F: FnMut(&Runtime, A) -> Result<T, BacktrackError>,
{
    backtrack_transform(
        BacktrackConfig::for_policy(BacktrackPolicy::FeedbackInjection, max_backtracks),
        func,
    )
}
