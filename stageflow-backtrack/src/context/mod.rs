//! Context management for pipeline execution.
//!
//! This module provides:
//! - Execution settings and scoped overrides
//! - The runtime handle with push/pop run frames
//! - Per-invocation stage contexts

mod runtime;
mod settings;

pub use runtime::{Runtime, StageContext};
pub use settings::{ExecutionSettings, SettingsOverrides, TEMPERATURE_KEY};
