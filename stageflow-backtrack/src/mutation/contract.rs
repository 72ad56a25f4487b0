//! Contract extension and invoke wrapping.
//!
//! Every operation swaps whole values in the arena: the contract is replaced
//! by a new versioned snapshot and the invoke by a new composed closure. The
//! values that were swapped out can therefore be put back exactly.

use crate::contracts::{FieldSpec, StageContract};
use crate::errors::BacktrackError;
use crate::stages::{Fields, Invoke, StageArena, StageId};

/// Name of the corrective-instruction input field.
pub const FEEDBACK_FIELD: &str = "feedback";

/// Builds the corrective-instruction input field.
#[must_use]
pub fn feedback_field() -> FieldSpec {
    FieldSpec::input(FEEDBACK_FIELD)
        .with_prefix("Instruction:")
        .with_description("Some instructions you must satisfy")
}

/// The contract and invoke of a stage at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSnapshot {
    /// Contract at capture time.
    pub contract: StageContract,
    /// Invoke entry point at capture time.
    pub invoke: Invoke,
}

/// Reversible edits of a stage's declared shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContractMutator;

impl ContractMutator {
    /// Captures the current contract and invoke.
    pub fn snapshot(arena: &StageArena, stage: StageId) -> Result<StageSnapshot, BacktrackError> {
        let slot = arena.slot(stage)?;
        Ok(StageSnapshot {
            contract: slot.contract,
            invoke: slot.invoke,
        })
    }

    /// Adds fields to the contract and returns the new snapshot.
    ///
    /// Existing inputs keep their order, new inputs follow them and the
    /// outputs stay at the tail.
    pub fn extend(
        arena: &StageArena,
        stage: StageId,
        fields: impl IntoIterator<Item = FieldSpec>,
    ) -> Result<StageContract, BacktrackError> {
        let next = arena.contract(stage)?.with_fields_added(fields);
        arena.replace_contract(stage, next.clone())?;
        Ok(next)
    }

    /// Removes the named fields if present and returns the resulting contract.
    ///
    /// Names that are not declared are ignored; if none is declared the
    /// contract is left untouched.
    pub fn revert(
        arena: &StageArena,
        stage: StageId,
        names: &[&str],
    ) -> Result<StageContract, BacktrackError> {
        let current = arena.contract(stage)?;
        let next = current.with_fields_removed(names);
        if next != current {
            arena.replace_contract(stage, next.clone())?;
        }
        Ok(next)
    }

    /// Replaces the invoke with one that fills `defaults` for missing
    /// arguments before delegating to the current one.
    pub fn wrap_invoke(
        arena: &StageArena,
        stage: StageId,
        defaults: Fields,
    ) -> Result<Invoke, BacktrackError> {
        let wrapped = arena.invoke(stage)?.with_defaults(defaults);
        arena.replace_invoke(stage, wrapped.clone())?;
        Ok(wrapped)
    }

    /// Puts a captured contract and invoke back.
    pub fn restore(
        arena: &StageArena,
        stage: StageId,
        snapshot: &StageSnapshot,
    ) -> Result<(), BacktrackError> {
        arena.replace_contract(stage, snapshot.contract.clone())?;
        arena.replace_invoke(stage, snapshot.invoke.clone())?;
        Ok(())
    }

    /// Derives the feedback shape of a stage from its `original` state.
    ///
    /// The stage is first restored to `original`, so calling this once per
    /// failure leaves exactly one feedback field and one wrapper in place.
    pub fn inject_feedback(
        arena: &StageArena,
        stage: StageId,
        original: &StageSnapshot,
        message: &str,
    ) -> Result<StageContract, BacktrackError> {
        Self::restore(arena, stage, original)?;
        let contract = Self::extend(arena, stage, [feedback_field()])?;
        let mut defaults = Fields::new();
        defaults.insert(FEEDBACK_FIELD.to_string(), serde_json::json!(message));
        Self::wrap_invoke(arena, stage, defaults)?;
        Ok(contract)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Runtime;
    use crate::stages::{fields, FnStage};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn qa_runtime() -> (Runtime, StageId) {
        let arena = StageArena::new();
        let id = arena.register(
            FnStage::new("qa", |_ctx, inputs| {
                Ok(fields([(
                    "answer",
                    inputs.get(FEEDBACK_FIELD).cloned().unwrap_or(json!("plain")),
                )]))
            }),
            StageContract::new("Answer the question.")
                .input("question")
                .output("answer"),
        );
        (Runtime::new(arena), id)
    }

    #[test]
    fn test_feedback_field_shape() {
        let field = feedback_field();
        assert_eq!(field.name, "feedback");
        assert_eq!(field.prefix, "Instruction:");
        assert_eq!(field.description, "Some instructions you must satisfy");
        assert!(field.is_input());
    }

    #[test]
    fn test_extend_keeps_outputs_last() {
        let (runtime, id) = qa_runtime();
        let contract = ContractMutator::extend(runtime.stages(), id, [feedback_field()]).unwrap();

        assert_eq!(contract.field_names(), vec!["question", "feedback", "answer"]);
        assert_eq!(runtime.stages().contract(id).unwrap(), contract);
    }

    #[test]
    fn test_revert_twice_equals_once() {
        let (runtime, id) = qa_runtime();
        let arena = runtime.stages();
        ContractMutator::extend(arena, id, [feedback_field()]).unwrap();

        let once = ContractMutator::revert(arena, id, &[FEEDBACK_FIELD]).unwrap();
        let twice = ContractMutator::revert(arena, id, &[FEEDBACK_FIELD]).unwrap();

        assert_eq!(once, twice);
        assert_eq!(arena.contract(id).unwrap(), once);
        assert_eq!(once.field_names(), vec!["question", "answer"]);
    }

    #[test]
    fn test_wrap_invoke_supplies_default() {
        let (runtime, id) = qa_runtime();
        let before = runtime.stages().invoke(id).unwrap();

        let wrapped = ContractMutator::wrap_invoke(
            runtime.stages(),
            id,
            fields([(FEEDBACK_FIELD, json!("be brief"))]),
        )
        .unwrap();
        assert_ne!(wrapped, before);

        let out = runtime.call(id, fields([("question", json!("?"))])).unwrap();
        assert_eq!(out["answer"], "be brief");
    }

    #[test]
    fn test_restore_returns_exact_originals() {
        let (runtime, id) = qa_runtime();
        let arena = runtime.stages();
        let original = ContractMutator::snapshot(arena, id).unwrap();

        ContractMutator::inject_feedback(arena, id, &original, "first").unwrap();
        ContractMutator::inject_feedback(arena, id, &original, "second").unwrap();
        assert_ne!(ContractMutator::snapshot(arena, id).unwrap(), original);

        ContractMutator::restore(arena, id, &original).unwrap();
        assert_eq!(ContractMutator::snapshot(arena, id).unwrap(), original);
    }

    #[test]
    fn test_inject_feedback_uses_newest_message_without_stacking() {
        let (runtime, id) = qa_runtime();
        let arena = runtime.stages();
        let original = ContractMutator::snapshot(arena, id).unwrap();

        ContractMutator::inject_feedback(arena, id, &original, "first").unwrap();
        let contract = ContractMutator::inject_feedback(arena, id, &original, "second").unwrap();

        assert_eq!(contract.field_names(), vec!["question", "feedback", "answer"]);
        assert_eq!(contract.version(), original.contract.version() + 1);
        assert_eq!(
            arena.invoke(id).unwrap().label(),
            "module:qa+defaults[feedback]"
        );

        let out = runtime.call(id, fields([("question", json!("?"))])).unwrap();
        assert_eq!(out["answer"], "second");
    }
}
