//! Test assertions for stage state and events.

use super::fixtures::{StageState, TestPipeline};
use crate::events::CollectingEventSink;

/// Asserts that every stage is back in `before`'s state.
///
/// Configs and contracts compare structurally, invokes by identity.
pub fn assert_state_restored(pipeline: &TestPipeline, before: &[StageState]) {
    let after = pipeline.state();
    assert_eq!(after.len(), before.len(), "stage count changed");
    for (index, (b, a)) in before.iter().zip(after.iter()).enumerate() {
        assert_eq!(a.config, b.config, "config of stage {index} not restored");
        assert_eq!(a.contract, b.contract, "contract of stage {index} not restored");
        assert!(
            a.invoke.same_as(&b.invoke),
            "invoke of stage {index} not restored: {:?} != {:?}",
            a.invoke,
            b.invoke
        );
    }
}

/// Asserts that `expected` appears in the sink, in order, as a subsequence.
pub fn assert_events_in_order(sink: &CollectingEventSink, expected: &[&str]) {
    let types = sink.event_types();
    let mut remaining = types.iter();
    for name in expected {
        assert!(
            remaining.any(|t| t == name),
            "Expected event '{name}' in order, got {types:?}"
        );
    }
}

/// Asserts the number of events of one type.
pub fn assert_event_count(sink: &CollectingEventSink, event_type: &str, expected: usize) {
    let found = sink.events_of_type(event_type).len();
    assert_eq!(
        found, expected,
        "Expected {expected} '{event_type}' event(s), found {found}"
    );
}
