//! # Stageflow Backtrack
//!
//! Assertion-driven backtracking retries for multi-stage pipelines.
//!
//! A pipeline run asserts post-conditions on its outputs. When an assertion
//! fails, the engine blames the stage that ran last, mutates that stage (or
//! the whole run) according to the active policy, and re-runs the pipeline:
//!
//! - **Blind**: re-run unchanged
//! - **Global perturbation**: raise the temperature of every stage
//! - **Targeted perturbation**: raise the temperature of the blamed stage
//! - **Feedback injection**: feed the failure message to the blamed stage
//!
//! Every mutation is rolled back before control returns to the caller.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stageflow_backtrack::prelude::*;
//!
//! let arena = StageArena::new();
//! let generate = arena.register(GenerateStage::new(), contract);
//! let runtime = Runtime::new(arena);
//!
//! let mut answer = assert_latest_feedback_transform(2, |rt: &Runtime, question: String| {
//!     let out = rt.call(generate, fields([("question", json!(question))]))?;
//!     assert_that(rt, out["answer"].as_str().is_some_and(|a| a.len() < 40), "answer must be short")?;
//!     Ok(out)
//! });
//!
//! let result = answer(&runtime, "What is the capital of France?".into())?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod assertion;
pub mod cache;
pub mod context;
pub mod contracts;
pub mod errors;
pub mod events;
pub mod mutation;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod testing;
pub mod trace;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::assertion::{assert_that, Assertion, AssertionArgs, Verdict};
    pub use crate::cache::{InMemoryStageCache, NoCache, StageCache};
    pub use crate::context::{ExecutionSettings, Runtime, SettingsOverrides, StageContext};
    pub use crate::contracts::{FieldRole, FieldSpec, StageContract};
    pub use crate::errors::{
        AssertionFailure, BacktrackError, ContractError, InvalidAssertionError, RetryExhausted,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LogConfig, LogFormat};
    pub use crate::pipeline::{
        assert_latest_feedback_transform, assert_latest_transform, assert_transform,
        assert_update_transform, backtrack_transform, BacktrackConfig, BacktrackPolicy,
        Backtracker, RetryReport, TemperatureSchedule,
    };
    pub use crate::stages::{fields, Fields, FnStage, StageArena, StageId, StageModule};
    pub use crate::trace::{ExecutionTrace, TraceEntry};
}
