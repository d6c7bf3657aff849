use std::sync::Once;

use metrics::{Unit, describe_gauge};

static REGISTER_METRICS: Once = Once::new();

pub const CONTAINER_QUEUE_DEPTH: &str = "conflux_container_queue_depth";
pub const BLOCK_QUEUE_DEPTH: &str = "conflux_block_queue_depth";

/// Label key for the container display name.
pub const CONTAINER_LABEL: &str = "container";
/// Label key for the sub-unit display name.
pub const UNIT_LABEL: &str = "unit";

/// Register metrics emitted by the library. Called on container
/// construction. It is safe to call this method multiple times. It is
/// guaranteed to register the metrics only once.
pub(crate) fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_gauge!(
            CONTAINER_QUEUE_DEPTH,
            Unit::Count,
            "Number of items queued across all blocks of a container"
        );

        describe_gauge!(
            BLOCK_QUEUE_DEPTH,
            Unit::Count,
            "Number of items queued in a single block's input"
        );
    });
}
