//! Replaceable stage entry points.

use super::{Fields, StageModule};
use crate::context::StageContext;
use crate::errors::BacktrackError;
use std::fmt;
use std::sync::Arc;

/// Signature shared by every invoke entry point.
pub type InvokeFn =
    dyn Fn(&StageContext<'_>, Fields) -> Result<Fields, BacktrackError> + Send + Sync;

/// The callable through which a stage executes.
///
/// Cloning shares the underlying closure. Equality is identity: two
/// `Invoke`s are equal only when they share the same closure, which is what
/// lets a rollback prove it put back the original entry point.
#[derive(Clone)]
pub struct Invoke {
    func: Arc<InvokeFn>,
    label: Arc<str>,
}

impl Invoke {
    /// Creates an entry point from a closure.
    pub fn new<F>(label: impl Into<String>, func: F) -> Self
    where
        F: Fn(&StageContext<'_>, Fields) -> Result<Fields, BacktrackError> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            label: Arc::from(label.into()),
        }
    }

    /// The base entry point of a module: validate, consult the cache, run, record.
    #[must_use]
    pub fn module(module: Arc<dyn StageModule>) -> Self {
        let label = format!("module:{}", module.name());
        Self::new(label, move |ctx, inputs| ctx.run_module(module.as_ref(), inputs))
    }

    /// Composes a new entry point that fills `defaults` for any missing
    /// named argument and then delegates to `self`.
    ///
    /// Caller-supplied values always win over the defaults.
    #[must_use]
    pub fn with_defaults(&self, defaults: Fields) -> Self {
        let inner = self.clone();
        let keys: Vec<&str> = defaults.keys().map(String::as_str).collect();
        let label = format!("{}+defaults[{}]", self.label, keys.join(","));

        Self::new(label, move |ctx, mut inputs| {
            for (key, value) in &defaults {
                inputs
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
            inner.call(ctx, inputs)
        })
    }

    /// Invokes the entry point.
    pub fn call(&self, ctx: &StageContext<'_>, inputs: Fields) -> Result<Fields, BacktrackError> {
        (self.func)(ctx, inputs)
    }

    /// Returns a human readable description of the composition chain.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns true if both handles share the same closure.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.label, &other.label) && Arc::ptr_eq(&self.func, &other.func)
    }
}

impl PartialEq for Invoke {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Debug for Invoke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoke").field("label", &self.label).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Runtime;
    use crate::contracts::StageContract;
    use crate::stages::{fields, FnStage, StageArena};
    use serde_json::json;

    fn echo_runtime() -> (Runtime, crate::stages::StageId) {
        let arena = StageArena::new();
        let id = arena.register(
            FnStage::new("echo", |_ctx, inputs| Ok(inputs.clone())),
            StageContract::new("Echo."),
        );
        (Runtime::new(arena), id)
    }

    #[test]
    fn test_with_defaults_fills_missing_arguments() {
        let (runtime, id) = echo_runtime();
        let base = runtime.stages().invoke(id).unwrap();
        let wrapped = base.with_defaults(fields([("feedback", json!("be brief"))]));
        runtime.stages().replace_invoke(id, wrapped).unwrap();

        let out = runtime.call(id, fields([("q", json!(1))])).unwrap();
        assert_eq!(out["feedback"], "be brief");
        assert_eq!(out["q"], 1);
    }

    #[test]
    fn test_with_defaults_keeps_caller_override() {
        let (runtime, id) = echo_runtime();
        let base = runtime.stages().invoke(id).unwrap();
        runtime
            .stages()
            .replace_invoke(id, base.with_defaults(fields([("feedback", json!("default"))])))
            .unwrap();

        let out = runtime
            .call(id, fields([("feedback", json!("explicit"))]))
            .unwrap();
        assert_eq!(out["feedback"], "explicit");
    }

    #[test]
    fn test_wrapped_invoke_is_distinguishable() {
        let (runtime, id) = echo_runtime();
        let base = runtime.stages().invoke(id).unwrap();
        let wrapped = base.with_defaults(Fields::new());

        assert_eq!(base, base.clone());
        assert_ne!(base, wrapped);
        assert!(wrapped.label().starts_with("module:echo+defaults"));
    }
}
