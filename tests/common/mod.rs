//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use flowhook::run::FlowNode;
use std::time::Duration;

/// How long a test waits for the pipeline thread to block
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// `/Flow` with children `x`, `y` and a `Branch` holding `z`
pub fn test_flow() -> FlowNode {
    FlowNode::with_children(
        "Flow",
        vec![
            FlowNode::leaf("x"),
            FlowNode::leaf("y"),
            FlowNode::with_children("Branch", vec![FlowNode::leaf("z")]),
        ],
    )
}

/// Assert that `duration` is at least `millis` milliseconds
pub fn assert_at_least_millis(duration: Duration, millis: u64) {
    assert!(
        duration >= Duration::from_millis(millis),
        "Expected at least {}ms, got {:?}",
        millis,
        duration
    );
}
