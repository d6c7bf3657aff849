//! Exact-copy fan-out with cooperative backpressure.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::bail;
use crate::block::{BlockOptions, BufferBlock, InputPort, RoutePredicate, TransformBlock};
use crate::concurrency::lock;
use crate::container::{Container, ContainerCore, ContainerOptions, HasInput};
use crate::error::ErrorKind;
use crate::link::bridge;

/// Per-target copy constructor. When absent, items are duplicated with
/// [`Clone`].
pub type CopyFn<T> = Arc<dyn Fn(&T) -> T + Send + Sync>;

/// A container that delivers an exact copy of every input item to each of
/// its attached targets, in input order, without ever dropping one.
///
/// Broadcast-by-latest primitives shed data when a consumer is slow; here
/// the internal transform instead awaits a send into every per-target
/// buffer, converting fan-out into backpressure on the broadcaster's own
/// input.
pub struct Broadcaster<T> {
    core: Arc<ContainerCore>,
    transform: TransformBlock<T, T>,
    targets: Arc<Mutex<Vec<InputPort<T>>>>,
    primary_linked: AtomicBool,
    buffer_sequence: AtomicUsize,
}

impl<T> Broadcaster<T>
where
    T: Clone + Send + 'static,
{
    /// Creates a broadcaster that duplicates items with [`Clone`].
    pub fn new(options: ContainerOptions) -> crate::error::Result<Self> {
        Self::with_copy(options, None)
    }

    /// Creates a broadcaster with an explicit per-target copy constructor.
    pub fn with_copy(
        options: ContainerOptions,
        copy_fn: Option<CopyFn<T>>,
    ) -> crate::error::Result<Self> {
        let core = ContainerCore::new("Broadcaster", options);
        let targets: Arc<Mutex<Vec<InputPort<T>>>> = Arc::default();

        let body_targets = targets.clone();
        let transform = TransformBlock::new(
            format!("{}.transform", core.name()),
            BlockOptions::default(),
            move |item: T| {
                // Snapshot outside the await so the lock never spans one.
                let attached: Vec<InputPort<T>> = lock(&body_targets).clone();
                let copy_fn = copy_fn.clone();
                async move {
                    for target in &attached {
                        let duplicate = match &copy_fn {
                            Some(copy) => copy(&item),
                            None => item.clone(),
                        };
                        target.send(duplicate).await?;
                    }
                    Ok(item)
                }
            },
        );
        core.register_block(transform.unit(), None)?;

        Ok(Self {
            core,
            transform,
            targets,
            primary_linked: AtomicBool::new(false),
            buffer_sequence: AtomicUsize::new(0),
        })
    }

    /// Attaches a downstream container as a broadcast target.
    ///
    /// The first attachment becomes the primary output edge of the internal
    /// transform. Every further attachment gets its own buffer child whose
    /// completion is tied to the transform's, so the aggregated completion
    /// cannot resolve before the buffer drained everything that was copied
    /// into it.
    pub fn broadcast_to<C>(&self, other: &C) -> crate::error::Result<()>
    where
        C: HasInput<T> + ?Sized,
    {
        if !self.primary_linked.swap(true, Ordering::SeqCst) {
            bridge(
                self.transform.output(),
                None,
                &self.core,
                other.core(),
                other.input(),
            );
            return Ok(());
        }

        let sequence = self.buffer_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let buffer: BufferBlock<T> =
            BufferBlock::new(format!("Buffer{sequence}"), BlockOptions::default());
        self.core.register_block(buffer.unit(), None)?;
        lock(&self.targets).push(buffer.input());

        // Dependency on the transform: the buffer's input closes only once
        // the transform finished copying everything into it.
        let transform_done = self.transform.completion();
        let buffer_input = buffer.input();
        tokio::spawn(async move {
            if transform_done.wait().await.is_success() {
                buffer_input.complete();
            }
        });

        bridge(
            buffer.output(),
            None,
            &self.core,
            other.core(),
            other.input(),
        );
        info!(
            container = %self.core.name(),
            target = %other.name(),
            buffer = sequence,
            "attached broadcast target"
        );
        Ok(())
    }

    /// Conditional attachment surface, kept for parity with the other link
    /// operations. Broadcast targets receive every item by contract, so any
    /// predicate is rejected.
    pub fn broadcast_to_when<C>(
        &self,
        other: &C,
        predicate: Option<RoutePredicate<T>>,
    ) -> crate::error::Result<()>
    where
        C: HasInput<T> + ?Sized,
    {
        if predicate.is_some() {
            bail!(ErrorKind::PredicateLinkUnsupported);
        }
        self.broadcast_to(other)
    }
}

impl<T: Clone + Send + 'static> Container for Broadcaster<T> {
    fn core(&self) -> &Arc<ContainerCore> {
        &self.core
    }
}

impl<T: Clone + Send + 'static> HasInput<T> for Broadcaster<T> {
    fn input(&self) -> InputPort<T> {
        self.transform.input()
    }
}
