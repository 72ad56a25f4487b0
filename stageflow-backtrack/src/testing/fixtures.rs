//! Test fixtures for backtracking tests.

use std::sync::Arc;

use crate::context::Runtime;
use crate::contracts::StageContract;
use crate::events::CollectingEventSink;
use crate::stages::{Invoke, StageArena, StageConfig, StageId, StageModule};

/// The mutable state of one stage, comparable after a run.
#[derive(Debug, Clone, PartialEq)]
pub struct StageState {
    /// Configuration.
    pub config: StageConfig,
    /// Contract.
    pub contract: StageContract,
    /// Invoke entry point, compared by identity.
    pub invoke: Invoke,
}

/// A runtime with a collecting event sink and a list of registered stages.
#[derive(Debug)]
pub struct TestPipeline {
    runtime: Runtime,
    sink: Arc<CollectingEventSink>,
    stages: Vec<StageId>,
}

impl Default for TestPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        let sink = Arc::new(CollectingEventSink::new());
        let runtime = Runtime::new(StageArena::new()).with_event_sink(sink.clone());
        Self {
            runtime,
            sink,
            stages: Vec::new(),
        }
    }

    /// Registers a shared module.
    pub fn add_stage(&mut self, module: Arc<dyn StageModule>, contract: StageContract) -> StageId {
        let id = self.runtime.stages().register_arc(module, contract);
        self.stages.push(id);
        id
    }

    /// Returns the runtime.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Returns the collecting sink.
    #[must_use]
    pub fn sink(&self) -> &CollectingEventSink {
        &self.sink
    }

    /// Returns the registered stages in order.
    #[must_use]
    pub fn stages(&self) -> &[StageId] {
        &self.stages
    }

    /// Captures the state of every registered stage.
    ///
    /// # Panics
    ///
    /// Panics if a registered stage is missing from the arena.
    #[must_use]
    pub fn state(&self) -> Vec<StageState> {
        let arena = self.runtime.stages();
        self.stages
            .iter()
            .map(|id| {
                let slot = arena.slot(*id).expect("registered stage");
                StageState {
                    config: slot.config,
                    contract: slot.contract,
                    invoke: slot.invoke,
                }
            })
            .collect()
    }
}
