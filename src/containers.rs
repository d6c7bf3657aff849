//! Ready-made single-block containers.
//!
//! Most pipelines are assembled from a handful of transform and action
//! stages; these containers wrap one block each so callers get the full
//! container surface (aggregated completion, fault protocol, link
//! operations) without writing a container type of their own.

use std::future::Future;
use std::sync::Arc;

use crate::block::{ActionBlock, BlockOptions, InputPort, OutputPort, TransformBlock};
use crate::container::{Container, ContainerCore, ContainerOptions, HasInput, HasOutput};

/// A container around a single transform block.
pub struct TransformContainer<I, O> {
    core: Arc<ContainerCore>,
    block: TransformBlock<I, O>,
}

impl<I, O> TransformContainer<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Creates the container with default block options.
    pub fn new<F, Fut>(options: ContainerOptions, body: F) -> crate::error::Result<Self>
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::error::Result<O>> + Send + 'static,
    {
        Self::with_block_options(options, BlockOptions::default(), body)
    }

    /// Creates the container with explicit block options, e.g. a small
    /// input capacity or a degree of parallelism above 1.
    pub fn with_block_options<F, Fut>(
        options: ContainerOptions,
        block_options: BlockOptions,
        body: F,
    ) -> crate::error::Result<Self>
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::error::Result<O>> + Send + 'static,
    {
        let core = ContainerCore::new("TransformContainer", options);
        let block = TransformBlock::new(format!("{}.transform", core.name()), block_options, body);
        core.register_block(block.unit(), None)?;
        Ok(Self { core, block })
    }
}

impl<I: Send + 'static, O: Send + 'static> Container for TransformContainer<I, O> {
    fn core(&self) -> &Arc<ContainerCore> {
        &self.core
    }
}

impl<I: Send + 'static, O: Send + 'static> HasInput<I> for TransformContainer<I, O> {
    fn input(&self) -> InputPort<I> {
        self.block.input()
    }
}

impl<I: Send + 'static, O: Send + 'static> HasOutput<O> for TransformContainer<I, O> {
    fn output(&self) -> OutputPort<O> {
        self.block.output()
    }
}

/// A container around a single terminal action block.
pub struct ActionContainer<T> {
    core: Arc<ContainerCore>,
    block: ActionBlock<T>,
}

impl<T: Send + 'static> ActionContainer<T> {
    /// Creates the container with default block options.
    pub fn new<F, Fut>(options: ContainerOptions, body: F) -> crate::error::Result<Self>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::error::Result<()>> + Send + 'static,
    {
        Self::with_block_options(options, BlockOptions::default(), body)
    }

    /// Creates the container with explicit block options.
    pub fn with_block_options<F, Fut>(
        options: ContainerOptions,
        block_options: BlockOptions,
        body: F,
    ) -> crate::error::Result<Self>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::error::Result<()>> + Send + 'static,
    {
        let core = ContainerCore::new("ActionContainer", options);
        let block = ActionBlock::new(format!("{}.action", core.name()), block_options, body);
        core.register_block(block.unit(), None)?;
        Ok(Self { core, block })
    }
}

impl<T: Send + 'static> Container for ActionContainer<T> {
    fn core(&self) -> &Arc<ContainerCore> {
        &self.core
    }
}

impl<T: Send + 'static> HasInput<T> for ActionContainer<T> {
    fn input(&self) -> InputPort<T> {
        self.block.input()
    }
}
