//! Periodic queue-depth reporting for a running container.

use std::sync::Arc;

use metrics::gauge;
use tokio::time::sleep;
use tracing::debug;

use crate::concurrency::completion::Completion;
use crate::container::ContainerCore;
use crate::container::options::{DEFAULT_MONITOR_INTERVAL, MonitorMode};
use crate::metrics::{BLOCK_QUEUE_DEPTH, CONTAINER_LABEL, CONTAINER_QUEUE_DEPTH, UNIT_LABEL};

/// Cooperative monitor loop, bound to the container's aggregated completion
/// so it exits as soon as the container is terminal.
pub(crate) async fn run_monitor(container: Arc<ContainerCore>, completion: Completion) {
    let interval = container
        .options()
        .monitor_interval
        .unwrap_or(DEFAULT_MONITOR_INTERVAL);
    debug!(container = %container.name(), ?interval, "performance monitor started");

    loop {
        tokio::select! {
            _ = completion.wait() => break,
            _ = sleep(interval) => report(&container),
        }
    }

    debug!(container = %container.name(), "performance monitor stopped");
}

fn report(container: &Arc<ContainerCore>) {
    let options = container.options();
    let verbose = options.monitor_mode == MonitorMode::Verbose;

    if options.container_monitor_enabled {
        let buffered = container.buffered();
        if buffered > 0 || verbose {
            debug!(container = %container.name(), buffered, "container queue depth");
        }
        gauge!(CONTAINER_QUEUE_DEPTH, CONTAINER_LABEL => container.name().to_string())
            .set(buffered as f64);
    }

    if options.block_monitor_enabled {
        for block in container.blocks() {
            let buffered = block.buffered();
            if buffered > 0 || verbose {
                debug!(
                    container = %container.name(),
                    unit = %block.name(),
                    buffered,
                    "block queue depth"
                );
            }
            gauge!(
                BLOCK_QUEUE_DEPTH,
                CONTAINER_LABEL => container.name().to_string(),
                UNIT_LABEL => block.name().to_string()
            )
            .set(buffered as f64);
        }
    }
}
