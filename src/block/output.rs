use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::debug;

use crate::block::{BlockInner, BlockUnit, InputPort};
use crate::concurrency::completion::Completion;
use crate::concurrency::lock;

/// Routing predicate installed on an output edge.
pub type RoutePredicate<O> = Box<dyn Fn(&O) -> bool + Send + Sync>;

struct Edge<O> {
    predicate: Option<RoutePredicate<O>>,
    target: InputPort<O>,
    propagate_completion: bool,
}

impl<O> Edge<O> {
    fn matches(&self, item: &O) -> bool {
        self.predicate.as_ref().is_none_or(|predicate| predicate(item))
    }
}

struct OutputShared<O> {
    edges: Mutex<Vec<Arc<Edge<O>>>>,
    revision: watch::Sender<u64>,
    inner: Arc<BlockInner>,
}

/// Typed egress handle of a block, owning the ordered edge registry.
///
/// Edges are evaluated in registration order and the first matching
/// predicate wins. Delivery awaits the target's queue, so fan-out never
/// drops an item; an item matching no edge stays with the worker until a
/// matching edge is installed, which is what eventually backpressures the
/// block's own input.
pub struct OutputPort<O> {
    shared: Arc<OutputShared<O>>,
}

impl<O> Clone for OutputPort<O> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<O: Send + 'static> OutputPort<O> {
    pub(crate) fn new(inner: Arc<BlockInner>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            shared: Arc::new(OutputShared {
                edges: Mutex::new(Vec::new()),
                revision,
                inner,
            }),
        }
    }

    /// Display name of the source block.
    pub fn name(&self) -> &str {
        self.shared.inner.name()
    }

    /// Completion observer of the source block.
    pub fn completion(&self) -> Completion {
        self.shared.inner.completion()
    }

    /// Installs a new edge at the end of the routing order.
    pub fn add_edge(
        &self,
        predicate: Option<RoutePredicate<O>>,
        target: InputPort<O>,
        propagate_completion: bool,
    ) {
        lock(&self.shared.edges).push(Arc::new(Edge {
            predicate,
            target,
            propagate_completion,
        }));
        self.shared.revision.send_modify(|revision| *revision += 1);
    }

    /// Delivers an item along the first matching edge.
    ///
    /// Waits for an edge to be installed when none matches, and drops dead
    /// edges whose target input has closed underneath us. The surrounding
    /// worker remains preemptable by fault/cancel signals while this waits.
    pub(crate) async fn dispatch(&self, item: O) {
        let mut item = item;
        let mut revision_rx = self.shared.revision.subscribe();
        loop {
            // Mark the current revision as seen before scanning, so an edge
            // installed after the scan wakes the wait below.
            revision_rx.borrow_and_update();

            let edge = lock(&self.shared.edges)
                .iter()
                .find(|edge| edge.matches(&item))
                .cloned();

            match edge {
                Some(edge) => match edge.target.send_item(item).await {
                    Ok(()) => return,
                    Err(rejected) => {
                        item = rejected;
                        debug!(
                            unit = %self.name(),
                            target = %edge.target.name(),
                            "target input closed, removing edge"
                        );
                        lock(&self.shared.edges).retain(|other| !Arc::ptr_eq(other, &edge));
                    }
                },
                None => {
                    if revision_rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
            }
        }
    }

    /// Forwards completion to every edge that asked for it.
    pub(crate) fn propagate_complete(&self) {
        let edges: Vec<_> = lock(&self.shared.edges).iter().cloned().collect();
        for edge in edges {
            if edge.propagate_completion {
                edge.target.complete();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ActionBlock, BlockOptions, TransformBlock};
    use crate::concurrency::completion::Outcome;
    use std::sync::Mutex as StdMutex;
    use tokio::time::{Duration, sleep, timeout};

    fn collecting_action(name: &str) -> (ActionBlock<u32>, Arc<StdMutex<Vec<u32>>>) {
        let items: Arc<StdMutex<Vec<u32>>> = Arc::default();
        let sink_items = items.clone();
        let action = ActionBlock::new(name, BlockOptions::default(), move |item: u32| {
            let sink_items = sink_items.clone();
            async move {
                sink_items.lock().unwrap().push(item);
                Ok(())
            }
        });
        (action, items)
    }

    #[tokio::test]
    async fn first_matching_edge_wins_in_registration_order() {
        let source: TransformBlock<u32, u32> =
            TransformBlock::new("routing-source", BlockOptions::default(), |item| async move {
                Ok(item)
            });
        let (low, low_items) = collecting_action("low");
        let (even, even_items) = collecting_action("even");

        source
            .output()
            .add_edge(Some(Box::new(|item: &u32| *item < 10)), low.input(), true);
        source
            .output()
            .add_edge(Some(Box::new(|item: &u32| item % 2 == 0)), even.input(), true);

        let input = source.input();
        // 4 matches both predicates and must take the first edge.
        for item in [4, 12, 7] {
            input.send(item).await.unwrap();
        }
        input.complete();

        assert!(source.completion().wait().await.is_success());
        assert!(low.completion().wait().await.is_success());
        assert!(even.completion().wait().await.is_success());

        assert_eq!(*low_items.lock().unwrap(), vec![4, 7]);
        assert_eq!(*even_items.lock().unwrap(), vec![12]);
    }

    #[tokio::test]
    async fn dispatch_waits_until_an_edge_is_installed() {
        let source: TransformBlock<u32, u32> =
            TransformBlock::new("parked-source", BlockOptions::default(), |item| async move {
                Ok(item)
            });
        let (sink, items) = collecting_action("late-sink");

        let input = source.input();
        input.send(41).await.unwrap();

        // With no edge installed the source cannot finish even after its
        // input completes.
        input.complete();
        sleep(Duration::from_millis(50)).await;
        assert!(!source.completion().is_terminal());

        source.output().add_edge(None, sink.input(), true);

        let outcome = timeout(Duration::from_secs(5), source.completion().wait())
            .await
            .expect("source never completed after the edge was installed");
        assert!(matches!(outcome, Outcome::Success));
        assert!(sink.completion().wait().await.is_success());
        assert_eq!(*items.lock().unwrap(), vec![41]);
    }
}
