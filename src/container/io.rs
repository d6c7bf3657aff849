//! Typed container surfaces: input/output ports, link operations, and
//! conditional output routing.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::block::{
    ActionBlock, BlockOptions, InputPort, OutputPort, PostError, RoutePredicate, TransformBlock,
};
use crate::concurrency::lock;
use crate::container::Container;
use crate::error::Error;
use crate::link::bridge;
use crate::naming;

/// A container with a single public ingress of items of type `I`.
pub trait HasInput<I: Send + 'static>: Container {
    /// The public input of this container.
    fn input(&self) -> InputPort<I>;
}

/// A container with a single public egress of items of type `O`.
pub trait HasOutput<O: Send + 'static>: Container {
    /// The public output of this container.
    fn output(&self) -> OutputPort<O>;
}

/// Ingress operations available on every [`HasInput`] container.
#[allow(async_fn_in_trait)]
pub trait InputOps<I: Send + 'static>: HasInput<I> {
    /// Offers an item to the input without waiting.
    fn post(&self, item: I) -> Result<(), PostError<I>> {
        self.input().post(item)
    }

    /// Sends an item to the input, waiting for queue space.
    async fn send(&self, item: I) -> crate::error::Result<()> {
        self.input().send(item).await
    }

    /// Completes the input; queued items still drain.
    fn complete_input(&self) {
        self.input().complete()
    }

    /// Consumes a finite sequence, posting every item to the input.
    ///
    /// Items rejected for lack of queue space are retried until accepted,
    /// so every item of the sequence is delivered. The input is not
    /// completed afterwards; the caller decides when the stream ends.
    async fn pull_from(&self, items: impl IntoIterator<Item = I>) -> crate::error::Result<u64> {
        let input = self.input();
        let mut count = 0u64;
        for item in items {
            input.safe_post(item).await?;
            count += 1;
        }
        info!(container = %self.name(), count, "pulled items into input");
        Ok(count)
    }

    /// Links an external source block into this container's input with
    /// completion propagation, so upstream completion closes the input.
    fn link_from(&self, source: &OutputPort<I>) {
        info!(
            container = %self.name(),
            source = %source.name(),
            "linked source block into input"
        );
        source.add_edge(None, self.input(), true);
    }
}

impl<C, I: Send + 'static> InputOps<I> for C where C: HasInput<I> + ?Sized {}

/// Egress link operations available on every [`HasOutput`] container.
///
/// Conditional edges are evaluated in registration order and the first
/// matching predicate wins, so a remainder edge must be installed last.
pub trait OutputOps<O: Send + 'static>: HasOutput<O> {
    /// Installs an unconditional edge to another container.
    fn link_to<C>(&self, other: &C)
    where
        C: HasInput<O> + ?Sized,
    {
        self.link_when(other, None);
    }

    /// Installs a conditionally-routed edge to another container.
    fn link_when<C>(&self, other: &C, predicate: Option<RoutePredicate<O>>)
    where
        C: HasInput<O> + ?Sized,
    {
        bridge(
            self.output(),
            predicate,
            self.core(),
            other.core(),
            other.input(),
        );
    }

    /// Installs an unconditional edge that maps every output through
    /// `transform` before it reaches `other`.
    fn link_transformed<T, C, F>(&self, other: &C, transform: F) -> crate::error::Result<()>
    where
        T: Send + 'static,
        C: HasInput<T> + ?Sized,
        F: Fn(O) -> T + Send + Sync + 'static,
    {
        self.link_transformed_when(other, transform, None)
    }

    /// Installs a predicate-guarded edge that maps matching outputs through
    /// `transform` before they reach `other`.
    ///
    /// The intermediate transform block becomes a child of this container,
    /// so the downstream container stays open until this one is fully done.
    fn link_transformed_when<T, C, F>(
        &self,
        other: &C,
        transform: F,
        predicate: Option<RoutePredicate<O>>,
    ) -> crate::error::Result<()>
    where
        T: Send + 'static,
        C: HasInput<T> + ?Sized,
        F: Fn(O) -> T + Send + Sync + 'static,
    {
        let name = naming::next_instance_name(&format!("{}.converter", self.name()));
        let converter: TransformBlock<O, T> =
            TransformBlock::new(name, BlockOptions::default(), move |item| {
                std::future::ready(Ok(transform(item)))
            });
        self.core().register_block(converter.unit(), None)?;
        self.output().add_edge(predicate, converter.input(), true);
        bridge(
            converter.output(),
            None,
            self.core(),
            other.core(),
            other.input(),
        );
        Ok(())
    }

    /// Installs the final edge: outputs that matched no earlier predicate
    /// are discarded, and each discarded item's label is recorded.
    fn link_remainder_to_null<F>(&self, label: F) -> crate::error::Result<DiscardRecorder>
    where
        F: Fn(&O) -> String + Send + Sync + 'static,
    {
        let recorder = DiscardRecorder::default();
        let sink_recorder = recorder.clone();
        let sink = ActionBlock::new(
            format!("{}.null", self.name()),
            BlockOptions::default(),
            move |item: O| {
                sink_recorder.record(label(&item));
                std::future::ready(Ok(()))
            },
        );
        self.core().register_block(sink.unit(), None)?;
        self.output().add_edge(None, sink.input(), true);
        self.core().set_discards(recorder.clone());
        info!(container = %self.name(), "routing leftover outputs to null sink");
        Ok(recorder)
    }

    /// Remainder edge that labels discarded items with their static type
    /// name. Prefer [`OutputOps::link_remainder_to_null`] with an explicit
    /// labeling function when the output type is an enum or trait object.
    fn link_remainder_to_null_typed(&self) -> crate::error::Result<DiscardRecorder> {
        self.link_remainder_to_null(|_item| std::any::type_name::<O>().to_string())
    }
}

impl<C, O: Send + 'static> OutputOps<O> for C where C: HasOutput<O> + ?Sized {}

/// Boxed dynamically-typed output item, used by downcast links.
pub type AnyItem = Box<dyn Any + Send>;

/// Downcast linking for containers whose output is dynamically typed.
pub trait LinkDowncast: HasOutput<AnyItem> {
    /// Routes outputs that are a `T` to `other`, unboxing them on the way.
    fn link_downcast_to<T, C>(&self, other: &C) -> crate::error::Result<()>
    where
        T: Any + Send + 'static,
        C: HasInput<T> + ?Sized,
    {
        let name = naming::next_instance_name(&format!("{}.downcast", self.name()));
        let converter: TransformBlock<AnyItem, T> =
            TransformBlock::new(name, BlockOptions::default(), move |item: AnyItem| {
                std::future::ready(match item.downcast::<T>() {
                    Ok(value) => Ok(*value),
                    Err(_) => Err(Error::other("downcast-linked item changed type mid-route")),
                })
            });
        self.core().register_block(converter.unit(), None)?;
        self.output().add_edge(
            Some(Box::new(|item: &AnyItem| item.is::<T>())),
            converter.input(),
            true,
        );
        bridge(
            converter.output(),
            None,
            self.core(),
            other.core(),
            other.input(),
        );
        Ok(())
    }
}

impl<C> LinkDowncast for C where C: HasOutput<AnyItem> + ?Sized {}

/// Statistics over outputs that matched no routing predicate.
///
/// A multiset of labels, shared between the null sink that records into it
/// and whoever inspects the counts afterwards.
#[derive(Debug, Clone, Default)]
pub struct DiscardRecorder {
    counts: Arc<Mutex<HashMap<String, u64>>>,
}

impl DiscardRecorder {
    /// Records one discarded output under the given label.
    pub fn record(&self, label: impl Into<String>) {
        *lock(&self.counts).entry(label.into()).or_insert(0) += 1;
    }

    /// Number of discarded outputs recorded under the given label.
    pub fn count(&self, label: &str) -> u64 {
        lock(&self.counts).get(label).copied().unwrap_or(0)
    }

    /// Total number of discarded outputs.
    pub fn total(&self) -> u64 {
        lock(&self.counts).values().sum()
    }

    /// Copy of the per-label counts.
    pub fn snapshot(&self) -> HashMap<String, u64> {
        lock(&self.counts).clone()
    }
}
