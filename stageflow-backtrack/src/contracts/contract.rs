//! Versioned stage contract snapshots.
//!
//! A contract is never edited in place. `with_field_added` and
//! `with_field_removed` return a new snapshot with a bumped version, so a
//! caller holding the old snapshot can always put it back exactly.

use crate::errors::ContractError;
use crate::stages::Fields;
use serde::{Deserialize, Serialize};

/// Role of a field within a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldRole {
    /// Supplied by the caller.
    Input,
    /// Produced by the stage.
    Output,
}

/// Descriptor for a single named field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,
    /// Input or output.
    pub role: FieldRole,
    /// Label rendered before the value (e.g. `"Question:"`).
    pub prefix: String,
    /// Human readable description.
    #[serde(default)]
    pub description: String,
}

impl FieldSpec {
    /// Creates an input field with a prefix derived from its name.
    #[must_use]
    pub fn input(name: impl Into<String>) -> Self {
        Self::with_role(name, FieldRole::Input)
    }

    /// Creates an output field with a prefix derived from its name.
    #[must_use]
    pub fn output(name: impl Into<String>) -> Self {
        Self::with_role(name, FieldRole::Output)
    }

    fn with_role(name: impl Into<String>, role: FieldRole) -> Self {
        let name = name.into();
        let prefix = default_prefix(&name);
        Self {
            name,
            role,
            prefix,
            description: String::new(),
        }
    }

    /// Sets the prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Returns true for input fields.
    #[must_use]
    pub fn is_input(&self) -> bool {
        self.role == FieldRole::Input
    }

    /// Returns true for output fields.
    #[must_use]
    pub fn is_output(&self) -> bool {
        self.role == FieldRole::Output
    }
}

// "reasoning_steps" -> "Reasoning Steps:"
fn default_prefix(name: &str) -> String {
    let words: Vec<String> = name
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect();
    format!("{}:", words.join(" "))
}

/// Ordered, versioned declaration of a stage's fields.
///
/// Output fields always form the tail of the ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageContract {
    instructions: String,
    fields: Vec<FieldSpec>,
    #[serde(default)]
    version: u32,
}

impl StageContract {
    /// Creates an empty contract with the given instructions.
    #[must_use]
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            fields: Vec::new(),
            version: 0,
        }
    }

    /// Declares an input field while building the contract.
    #[must_use]
    pub fn input(self, name: impl Into<String>) -> Self {
        self.field(FieldSpec::input(name))
    }

    /// Declares an output field while building the contract.
    #[must_use]
    pub fn output(self, name: impl Into<String>) -> Self {
        self.field(FieldSpec::output(name))
    }

    /// Declares a field while building the contract.
    ///
    /// Unlike [`StageContract::with_field_added`] this does not bump the
    /// version.
    #[must_use]
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.insert(spec);
        self
    }

    /// Returns the instructions.
    #[must_use]
    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Returns the snapshot version. Every effective edit bumps it.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns all fields in order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Returns the input fields in order.
    pub fn input_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.is_input())
    }

    /// Returns the output fields in order.
    pub fn output_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.is_output())
    }

    /// Returns the field names in order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns true if a field with this name is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns a new snapshot with `spec` added.
    ///
    /// New inputs go after the existing inputs and before every output. A
    /// field that already exists with the same role is replaced in place.
    #[must_use]
    pub fn with_field_added(&self, spec: FieldSpec) -> Self {
        self.with_fields_added(std::iter::once(spec))
    }

    /// Returns a new snapshot with every field in `specs` added.
    #[must_use]
    pub fn with_fields_added(&self, specs: impl IntoIterator<Item = FieldSpec>) -> Self {
        let mut next = self.clone();
        for spec in specs {
            next.insert(spec);
        }
        next.version = self.version + 1;
        next
    }

    /// Returns a new snapshot without the named field.
    ///
    /// Removing an absent field returns an identical snapshot.
    #[must_use]
    pub fn with_field_removed(&self, name: &str) -> Self {
        self.with_fields_removed(&[name])
    }

    /// Returns a new snapshot without any of the named fields.
    #[must_use]
    pub fn with_fields_removed(&self, names: &[&str]) -> Self {
        let mut next = self.clone();
        next.fields.retain(|f| !names.contains(&f.name.as_str()));
        if next.fields.len() != self.fields.len() {
            next.version = self.version + 1;
        }
        next
    }

    /// Checks that every declared input is present.
    pub fn validate_inputs(&self, stage: &str, inputs: &Fields) -> Result<(), ContractError> {
        match self.input_fields().find(|f| !inputs.contains_key(&f.name)) {
            Some(missing) => Err(ContractError::missing_input(stage, &missing.name)),
            None => Ok(()),
        }
    }

    /// Checks that every declared output was produced.
    pub fn validate_outputs(&self, stage: &str, outputs: &Fields) -> Result<(), ContractError> {
        match self.output_fields().find(|f| !outputs.contains_key(&f.name)) {
            Some(missing) => Err(ContractError::missing_output(stage, &missing.name)),
            None => Ok(()),
        }
    }

    fn insert(&mut self, spec: FieldSpec) {
        if let Some(existing) = self
            .fields
            .iter_mut()
            .find(|f| f.name == spec.name && f.role == spec.role)
        {
            *existing = spec;
            return;
        }
        self.fields.retain(|f| f.name != spec.name);

        match spec.role {
            FieldRole::Output => self.fields.push(spec),
            FieldRole::Input => {
                let at = self
                    .fields
                    .iter()
                    .position(FieldSpec::is_output)
                    .unwrap_or(self.fields.len());
                self.fields.insert(at, spec);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn qa_contract() -> StageContract {
        StageContract::new("Answer questions with short factoid answers.")
            .input("context")
            .input("question")
            .output("answer")
    }

    #[test]
    fn test_default_prefix() {
        assert_eq!(FieldSpec::input("question").prefix, "Question:");
        assert_eq!(FieldSpec::output("reasoning_steps").prefix, "Reasoning Steps:");
    }

    #[test]
    fn test_builder_keeps_outputs_last() {
        let contract = StageContract::new("x")
            .output("answer")
            .input("question");

        assert_eq!(contract.field_names(), vec!["question", "answer"]);
        assert_eq!(contract.version(), 0);
    }

    #[test]
    fn test_with_field_added_inserts_before_outputs() {
        let base = qa_contract();
        let extended = base.with_field_added(
            FieldSpec::input("feedback").with_prefix("Instruction:"),
        );

        assert_eq!(
            extended.field_names(),
            vec!["context", "question", "feedback", "answer"]
        );
        assert_eq!(extended.version(), base.version() + 1);
        assert_eq!(extended.get("feedback").unwrap().prefix, "Instruction:");
        // the original snapshot is untouched
        assert_eq!(base.field_names(), vec!["context", "question", "answer"]);
    }

    #[test]
    fn test_with_field_added_replaces_existing_in_place() {
        let extended = qa_contract()
            .with_field_added(FieldSpec::input("question").with_description("what to answer"));

        assert_eq!(extended.field_names(), vec!["context", "question", "answer"]);
        assert_eq!(extended.get("question").unwrap().description, "what to answer");
    }

    #[test]
    fn test_remove_then_restore_shape() {
        let base = qa_contract();
        let extended = base.with_field_added(FieldSpec::input("feedback"));
        let reverted = extended.with_field_removed("feedback");

        assert_eq!(reverted.fields(), base.fields());
        assert_eq!(reverted.instructions(), base.instructions());
    }

    #[test]
    fn test_remove_absent_field_is_noop() {
        let base = qa_contract();
        let once = base.with_field_removed("feedback");
        let twice = once.with_field_removed("feedback");

        assert_eq!(once, base);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_validate_inputs_and_outputs() {
        let contract = qa_contract();
        let mut inputs = Fields::new();
        inputs.insert("context".into(), json!("..."));

        let err = contract.validate_inputs("qa", &inputs).unwrap_err();
        assert_eq!(err, ContractError::missing_input("qa", "question"));

        inputs.insert("question".into(), json!("?"));
        assert!(contract.validate_inputs("qa", &inputs).is_ok());

        let err = contract.validate_outputs("qa", &Fields::new()).unwrap_err();
        assert_eq!(err, ContractError::missing_output("qa", "answer"));
    }

    #[test]
    fn test_contract_serializes() {
        let value = serde_json::to_value(qa_contract()).unwrap();
        assert_eq!(value["fields"][2]["role"], "output");
        assert_eq!(value["version"], 0);
    }
}
