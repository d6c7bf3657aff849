use std::sync::Arc;

use crate::block::{BlockOptions, BlockUnit, InputPort, OutputPort, TransformBlock};
use crate::concurrency::completion::Completion;

/// A pass-through block that decouples a producer from its consumers with
/// its own bounded queue.
///
/// Used by the broadcaster as the per-target staging area; semantically an
/// identity transform.
pub struct BufferBlock<T> {
    block: TransformBlock<T, T>,
}

impl<T: Send + 'static> BufferBlock<T> {
    /// Creates the buffer and spawns its worker task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(name: impl Into<String>, options: BlockOptions) -> Self {
        Self {
            block: TransformBlock::new(name, options, |item| std::future::ready(Ok(item))),
        }
    }

    pub fn name(&self) -> &str {
        self.block.name()
    }

    pub fn input(&self) -> InputPort<T> {
        self.block.input()
    }

    pub fn output(&self) -> OutputPort<T> {
        self.block.output()
    }

    pub fn completion(&self) -> Completion {
        self.block.completion()
    }

    /// Type-erased view for registration and the fault protocol.
    pub fn unit(&self) -> Arc<dyn BlockUnit> {
        self.block.unit()
    }
}
