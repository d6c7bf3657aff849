//! The inter-container link protocol.
//!
//! Linking a source block living in container `A` to container `B` must not
//! close `B`'s input when the source block alone finishes: `A` may have other
//! reasons to keep `B` alive. The edge therefore never propagates
//! completion; instead, two watcher tasks translate terminal states across
//! the boundary. Both translations use propagated error kinds, so a fault
//! crossing the link does not start another fault round on the far side.

use std::sync::Arc;

use tracing::info;

use crate::block::{InputPort, OutputPort, RoutePredicate};
use crate::concurrency::completion::Outcome;
use crate::container::ContainerCore;
use crate::error::Error;

/// Couples `source` (a block inside `from`) to the input of another
/// container.
///
/// - The downstream input is completed exactly when both the source block
///   and `from` finished successfully, and only if the downstream container
///   is not already terminal.
/// - A failure or cancellation on the upstream side faults the downstream
///   container with an other-container marker, and vice versa.
pub(crate) fn bridge<T: Send + 'static>(
    source: OutputPort<T>,
    predicate: Option<RoutePredicate<T>>,
    from: &Arc<ContainerCore>,
    to_core: &Arc<ContainerCore>,
    to_input: InputPort<T>,
) {
    info!(
        from = %from.name(),
        to = %to_core.name(),
        source = %source.name(),
        "linked containers"
    );
    source.add_edge(predicate, to_input.clone(), false);

    let source_done = source.completion();
    let from_done = from.completion();
    let to_done = to_core.completion();

    // Upstream side: close or fault the downstream container when the
    // source block and its whole container are done.
    {
        let from_name = from.name().to_string();
        let to_core = to_core.clone();
        let to_done = to_done.clone();
        let from_done = from_done.clone();
        tokio::spawn(async move {
            let (source_outcome, from_outcome) =
                futures::join!(source_done.wait(), from_done.wait());
            if to_done.is_terminal() {
                return;
            }
            match combine(source_outcome, from_outcome) {
                Outcome::Success => {
                    to_input.complete();
                }
                Outcome::Failed(_) => {
                    info!(
                        container = %to_core.name(),
                        upstream = %from_name,
                        "upstream container failed, faulting"
                    );
                    to_core.fault(&Arc::new(Error::other_container_failed()));
                }
                Outcome::Canceled => {
                    info!(
                        container = %to_core.name(),
                        upstream = %from_name,
                        "upstream container canceled, faulting"
                    );
                    to_core.fault(&Arc::new(Error::other_container_canceled()));
                }
            }
        });
    }

    // Downstream side: a downstream terminal failure while the upstream
    // container is still running must take the upstream down too.
    {
        let from_core = from.clone();
        let to_name = to_core.name().to_string();
        tokio::spawn(async move {
            let outcome = to_done.wait().await;
            if from_done.is_terminal() {
                return;
            }
            match outcome {
                Outcome::Failed(_) => {
                    info!(
                        container = %from_core.name(),
                        downstream = %to_name,
                        "downstream container failed, faulting"
                    );
                    from_core.fault(&Arc::new(Error::other_container_failed()));
                }
                Outcome::Canceled => {
                    info!(
                        container = %from_core.name(),
                        downstream = %to_name,
                        "downstream container canceled, faulting"
                    );
                    from_core.fault(&Arc::new(Error::other_container_canceled()));
                }
                Outcome::Success => {}
            }
        });
    }
}

/// Worst outcome of two: failures beat cancellations beat success.
fn combine(first: Outcome, second: Outcome) -> Outcome {
    match (first, second) {
        (Outcome::Failed(cause), _) | (_, Outcome::Failed(cause)) => Outcome::Failed(cause),
        (Outcome::Canceled, _) | (_, Outcome::Canceled) => Outcome::Canceled,
        (Outcome::Success, Outcome::Success) => Outcome::Success,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn combine_prefers_failure_over_cancellation() {
        let failed = Outcome::Failed(Arc::new(Error::other("boom")));
        let combined = combine(Outcome::Canceled, failed);
        assert!(combined.is_failed());

        let combined = combine(Outcome::Canceled, Outcome::Success);
        assert!(combined.is_canceled());

        let combined = combine(Outcome::Success, Outcome::Success);
        assert!(combined.is_success());
    }

    #[test]
    fn bridge_markers_are_propagated_kinds() {
        assert!(Error::other_container_failed().kind().is_propagated());
        assert!(Error::other_container_canceled().kind().is_propagated());
        assert!(matches!(
            Error::other_container_failed().kind(),
            ErrorKind::OtherContainerFailed
        ));
    }
}
