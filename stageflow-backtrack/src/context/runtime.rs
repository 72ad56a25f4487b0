//! The execution layer: scoped run frames and stage invocation.

use super::settings::{ExecutionSettings, SettingsOverrides, TEMPERATURE_KEY};
use crate::cache::{cache_key, InMemoryStageCache, StageCache};
use crate::contracts::StageContract;
use crate::errors::BacktrackError;
use crate::events::{EventSink, NoOpEventSink};
use crate::stages::{Fields, StageArena, StageConfig, StageId, StageModule};
use crate::trace::{ExecutionTrace, TraceEntry};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::debug;

/// Settings and trace of one (possibly nested) pipeline run.
#[derive(Debug, Clone, Default)]
struct RunFrame {
    settings: ExecutionSettings,
    trace: ExecutionTrace,
}

impl RunFrame {
    fn root(settings: ExecutionSettings) -> Self {
        Self {
            settings,
            trace: ExecutionTrace::new(),
        }
    }
}

/// Handle to the execution layer.
///
/// Cheap to clone; clones share the arena, the cache, the event sink and
/// the base settings. Frames are kept per thread: each thread sees its own
/// stack, whose bottom frame holds the base settings and the trace of calls
/// made outside any [`Runtime::run_frame`].
#[derive(Clone)]
pub struct Runtime {
    stages: StageArena,
    base: Arc<RwLock<ExecutionSettings>>,
    frames: Arc<DashMap<ThreadId, Vec<RunFrame>>>,
    cache: Arc<dyn StageCache>,
    event_sink: Arc<dyn EventSink>,
}

impl Runtime {
    /// Creates a runtime over an arena with an in-memory cache.
    #[must_use]
    pub fn new(stages: StageArena) -> Self {
        Self {
            stages,
            base: Arc::new(RwLock::new(ExecutionSettings::default())),
            frames: Arc::new(DashMap::new()),
            cache: Arc::new(InMemoryStageCache::new()),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the base execution settings.
    #[must_use]
    pub fn with_settings(self, settings: ExecutionSettings) -> Self {
        for mut stack in self.frames.iter_mut() {
            if let Some(root) = stack.first_mut() {
                root.settings = settings.clone();
            }
        }
        *self.base.write() = settings;
        self
    }

    /// Sets the result cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn StageCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the stage arena.
    #[must_use]
    pub fn stages(&self) -> &StageArena {
        &self.stages
    }

    /// Returns the result cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn StageCache> {
        &self.cache
    }

    /// Returns the event sink.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.event_sink
    }

    /// Returns the settings of the calling thread's innermost frame.
    #[must_use]
    pub fn settings(&self) -> ExecutionSettings {
        self.frames
            .get(&thread::current().id())
            .and_then(|stack| stack.last().map(|f| f.settings.clone()))
            .unwrap_or_else(|| self.base.read().clone())
    }

    /// Returns a copy of the calling thread's innermost trace.
    #[must_use]
    pub fn current_trace(&self) -> ExecutionTrace {
        self.frames
            .get(&thread::current().id())
            .and_then(|stack| stack.last().map(|f| f.trace.clone()))
            .unwrap_or_default()
    }

    /// Returns the innermost trace entries.
    #[must_use]
    pub fn trace_snapshot(&self) -> Vec<TraceEntry> {
        self.current_trace().into_entries()
    }

    /// Clears the calling thread's innermost trace.
    ///
    /// Calls made outside any frame accumulate in the bottom frame until
    /// this is called.
    pub fn reset_trace(&self) {
        if let Some(mut stack) = self.frames.get_mut(&thread::current().id()) {
            if let Some(frame) = stack.last_mut() {
                frame.trace = ExecutionTrace::new();
            }
        }
    }

    /// Returns the calling thread's number of frames, the bottom one included.
    #[must_use]
    pub fn frame_depth(&self) -> usize {
        self.frames
            .get(&thread::current().id())
            .map_or(1, |stack| stack.len())
    }

    /// Runs `f` inside a fresh frame on the calling thread.
    ///
    /// The frame starts with an empty trace and the enclosing settings with
    /// `overrides` applied. It is popped when `f` returns or unwinds, so
    /// nested runs, and runs on other threads, never observe each other's
    /// trace. Stage calls made from threads spawned by `f` are recorded in
    /// those threads' own stacks.
    pub fn run_frame<R>(&self, overrides: &SettingsOverrides, f: impl FnOnce() -> R) -> R {
        let _guard = self.push_frame(overrides);
        f()
    }

    fn push_frame(&self, overrides: &SettingsOverrides) -> FrameGuard<'_> {
        let thread = thread::current().id();
        let depth = self.with_stack(|stack| {
            let settings = stack
                .last()
                .map(|f| f.settings.merged(overrides))
                .unwrap_or_default();
            let depth = stack.len();
            stack.push(RunFrame {
                settings,
                trace: ExecutionTrace::new(),
            });
            depth
        });
        FrameGuard {
            frames: &self.frames,
            thread,
            depth,
        }
    }

    fn with_stack<R>(&self, f: impl FnOnce(&mut Vec<RunFrame>) -> R) -> R {
        let mut stack = self
            .frames
            .entry(thread::current().id())
            .or_insert_with(|| vec![RunFrame::root(self.base.read().clone())]);
        f(stack.value_mut())
    }

    /// Invokes a stage through its current entry point.
    pub fn call(&self, stage: StageId, inputs: Fields) -> Result<Fields, BacktrackError> {
        let slot = self.stages.slot(stage)?;
        let config = self.settings().effective_config(&slot.config);
        let ctx = StageContext {
            runtime: self,
            stage,
            name: slot.name,
            config,
            contract: slot.contract,
        };
        slot.invoke.call(&ctx, inputs)
    }

    /// Invokes the first stage registered under `name`.
    pub fn call_named(&self, name: &str, inputs: Fields) -> Result<Fields, BacktrackError> {
        let stage = self.stages.find(name).ok_or_else(|| {
            BacktrackError::stage(name, "no stage registered under this name")
        })?;
        self.call(stage, inputs)
    }

    fn record(&self, entry: TraceEntry) {
        self.with_stack(|stack| {
            if let Some(frame) = stack.last_mut() {
                frame.trace.record(entry);
            }
        });
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("stages", &self.stages.len())
            .field("frame_depth", &self.frame_depth())
            .finish_non_exhaustive()
    }
}

/// Pops its frame (and anything pushed above it) on drop.
///
/// A stack left with only an empty bottom frame is removed, so threads that
/// are gone leave nothing behind.
struct FrameGuard<'a> {
    frames: &'a DashMap<ThreadId, Vec<RunFrame>>,
    thread: ThreadId,
    depth: usize,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut stack) = self.frames.get_mut(&self.thread) {
            stack.truncate(self.depth);
        }
        self.frames.remove_if(&self.thread, |_, stack| {
            stack.len() <= 1 && stack.iter().all(|f| f.trace.is_empty())
        });
    }
}

/// The context for a single stage invocation.
pub struct StageContext<'a> {
    runtime: &'a Runtime,
    stage: StageId,
    name: String,
    config: StageConfig,
    contract: StageContract,
}

impl<'a> StageContext<'a> {
    /// Returns the runtime, for stages that call other stages.
    #[must_use]
    pub fn runtime(&self) -> &'a Runtime {
        self.runtime
    }

    /// Returns the stage handle.
    #[must_use]
    pub fn stage_id(&self) -> StageId {
        self.stage
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.name
    }

    /// Returns the effective configuration.
    #[must_use]
    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Returns the effective temperature, if any.
    #[must_use]
    pub fn temperature(&self) -> Option<f64> {
        self.config.get(TEMPERATURE_KEY).and_then(serde_json::Value::as_f64)
    }

    /// Returns the contract the stage was invoked under.
    #[must_use]
    pub fn contract(&self) -> &StageContract {
        &self.contract
    }

    /// Runs a module: validates inputs, consults the cache, executes on a
    /// miss, validates outputs and appends the trace entry.
    ///
    /// Cache hits are recorded in the trace like any other execution.
    pub fn run_module(
        &self,
        module: &dyn StageModule,
        inputs: Fields,
    ) -> Result<Fields, BacktrackError> {
        self.contract.validate_inputs(&self.name, &inputs)?;

        let key = cache_key(&self.name, &self.contract, &inputs, &self.config);
        let outputs = if let Some(cached) = self.runtime.cache.get(&key) {
            debug!(stage = %self.name, key = %key, "Stage cache hit");
            cached
        } else {
            let outputs = module.forward(self, &inputs)?;
            self.contract.validate_outputs(&self.name, &outputs)?;
            self.runtime.cache.put(key, outputs.clone());
            outputs
        };

        self.runtime
            .record(TraceEntry::new(self.stage, inputs, outputs.clone()));
        Ok(outputs)
    }
}

impl fmt::Debug for StageContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageContext")
            .field("stage", &self.stage)
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
