//! Eagerly evaluated assertions with structured failures.
//!
//! Constructing an [`Assertion`] runs its predicate immediately. A `false`
//! verdict becomes an [`AssertionFailure`] carrying the current trace, which
//! is the only error the retry orchestrator intercepts.

use crate::context::Runtime;
use crate::errors::{AssertionFailure, BacktrackError, InvalidAssertionError};
use crate::stages::Fields;
use std::fmt;
use std::sync::Arc;

/// The result of evaluating a predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The predicate returned `true`.
    Pass,
    /// The predicate returned `false`.
    Fail,
    /// The predicate returned something that is not a boolean.
    Invalid(String),
}

impl From<bool> for Verdict {
    fn from(value: bool) -> Self {
        if value {
            Self::Pass
        } else {
            Self::Fail
        }
    }
}

impl From<Option<bool>> for Verdict {
    fn from(value: Option<bool>) -> Self {
        value.map_or_else(|| Self::Invalid("none".to_string()), Self::from)
    }
}

impl From<&serde_json::Value> for Verdict {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Bool(b) => Self::from(*b),
            Value::Null => Self::Invalid("null".to_string()),
            Value::Number(_) => Self::Invalid("number".to_string()),
            Value::String(_) => Self::Invalid("string".to_string()),
            Value::Array(_) => Self::Invalid("array".to_string()),
            Value::Object(_) => Self::Invalid("object".to_string()),
        }
    }
}

impl From<serde_json::Value> for Verdict {
    fn from(value: serde_json::Value) -> Self {
        Self::from(&value)
    }
}

/// Positional and keyword arguments handed to a predicate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssertionArgs {
    /// Positional arguments.
    pub positional: Vec<serde_json::Value>,
    /// Keyword arguments.
    pub keyword: Fields,
}

impl AssertionArgs {
    /// Creates empty arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn arg(mut self, value: serde_json::Value) -> Self {
        self.positional.push(value);
        self
    }

    /// Sets a keyword argument.
    #[must_use]
    pub fn kwarg(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.keyword.insert(key.into(), value);
        self
    }

    /// Returns a positional argument.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&serde_json::Value> {
        self.positional.get(index)
    }

    /// Returns a keyword argument.
    #[must_use]
    pub fn get_kw(&self, key: &str) -> Option<&serde_json::Value> {
        self.keyword.get(key)
    }
}

type Predicate = dyn Fn(&AssertionArgs) -> Verdict + Send + Sync;

/// A post-condition checked at construction time.
#[derive(Clone)]
pub struct Assertion {
    predicate: Arc<Predicate>,
    args: AssertionArgs,
    message: String,
}

impl Assertion {
    /// Builds the assertion and evaluates it immediately.
    ///
    /// # Errors
    ///
    /// - [`BacktrackError::Assertion`] if the predicate returns `false`; the
    ///   failure carries `runtime`'s current trace.
    /// - [`BacktrackError::InvalidAssertion`] if it returns a non-boolean.
    pub fn new<F, V>(
        runtime: &Runtime,
        predicate: F,
        args: AssertionArgs,
        message: impl Into<String>,
    ) -> Result<Self, BacktrackError>
    where
        F: Fn(&AssertionArgs) -> V + Send + Sync + 'static,
        V: Into<Verdict>,
    {
        let predicate: Arc<Predicate> =
            Arc::new(move |args: &AssertionArgs| -> Verdict { predicate(args).into() });
        let assertion = Self {
            predicate,
            args,
            message: message.into(),
        };
        assertion.re_evaluate(runtime)?;
        Ok(assertion)
    }

    /// Re-evaluates the stored predicate against the stored arguments.
    pub fn re_evaluate(&self, runtime: &Runtime) -> Result<bool, BacktrackError> {
        check(runtime, (self.predicate)(&self.args), &self.message).map(|()| true)
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the arguments.
    #[must_use]
    pub fn args(&self) -> &AssertionArgs {
        &self.args
    }
}

impl fmt::Debug for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assertion")
            .field("args", &self.args)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Checks an already computed verdict.
///
/// Shorthand for an [`Assertion`] whose predicate takes no arguments.
pub fn assert_that(
    runtime: &Runtime,
    verdict: impl Into<Verdict>,
    message: impl Into<String>,
) -> Result<(), BacktrackError> {
    check(runtime, verdict.into(), &message.into())
}

fn check(runtime: &Runtime, verdict: Verdict, message: &str) -> Result<(), BacktrackError> {
    match verdict {
        Verdict::Pass => Ok(()),
        Verdict::Fail => Err(AssertionFailure::new(message, runtime.trace_snapshot()).into()),
        Verdict::Invalid(found) => Err(InvalidAssertionError::new(message, found).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SettingsOverrides;
    use crate::contracts::StageContract;
    use crate::stages::{fields, FnStage, StageArena};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn runtime_with_stage() -> (Runtime, crate::stages::StageId) {
        let arena = StageArena::new();
        let id = arena.register(
            FnStage::new("qa", |_ctx, _inputs| Ok(fields([("answer", json!("Paris"))]))),
            StageContract::new("qa").input("question").output("answer"),
        );
        (Runtime::new(arena), id)
    }

    #[test]
    fn test_true_predicate_constructs() {
        let (runtime, _) = runtime_with_stage();
        let assertion = Assertion::new(
            &runtime,
            |args: &AssertionArgs| args.get(0).and_then(|v| v.as_str()).map(str::len) < Some(10),
            AssertionArgs::new().arg(json!("short")),
            "answer must be short",
        )
        .unwrap();

        assert_eq!(assertion.message(), "answer must be short");
        assert!(assertion.re_evaluate(&runtime).unwrap());
    }

    #[test]
    fn test_false_predicate_carries_message_and_trace() {
        let (runtime, id) = runtime_with_stage();

        runtime.run_frame(&SettingsOverrides::none(), || {
            runtime.call(id, fields([("question", json!("capital?"))])).unwrap();
            let expected_trace = runtime.trace_snapshot();

            let err = Assertion::new(
                &runtime,
                |args: &AssertionArgs| args.get_kw("answer") == Some(&json!("Lyon")),
                AssertionArgs::new().kwarg("answer", json!("Paris")),
                "answer must be Lyon",
            )
            .unwrap_err();

            let failure = err.as_assertion_failure().unwrap();
            assert_eq!(failure.message, "answer must be Lyon");
            assert_eq!(failure.trace_snapshot, expected_trace);
            assert_eq!(failure.last_stage(), Some(id));
        });
    }

    #[test]
    fn test_default_message_is_empty() {
        let (runtime, _) = runtime_with_stage();
        let err = assert_that(&runtime, false, "").unwrap_err();
        assert_eq!(err.as_assertion_failure().unwrap().message, "");
        assert!(err.as_assertion_failure().unwrap().trace_snapshot.is_empty());
    }

    #[test]
    fn test_non_boolean_is_invalid_not_failure() {
        let (runtime, _) = runtime_with_stage();

        let err = Assertion::new(
            &runtime,
            |_args: &AssertionArgs| json!(1),
            AssertionArgs::new(),
            "numeric verdict",
        )
        .unwrap_err();
        match err {
            BacktrackError::InvalidAssertion(e) => assert_eq!(e.found, "number"),
            other => panic!("expected InvalidAssertion, got {other:?}"),
        }

        let err = assert_that(&runtime, None::<bool>, "absent").unwrap_err();
        assert!(matches!(err, BacktrackError::InvalidAssertion(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_json_bool_verdicts() {
        assert_eq!(Verdict::from(json!(true)), Verdict::Pass);
        assert_eq!(Verdict::from(&json!(false)), Verdict::Fail);
        assert_eq!(Verdict::from(json!("true")), Verdict::Invalid("string".into()));
        assert_eq!(Verdict::from(Some(true)), Verdict::Pass);
    }
}
