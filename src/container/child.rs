use std::sync::Arc;

use crate::block::BlockUnit;
use crate::concurrency::completion::Completion;
use crate::container::ContainerCore;

/// What a registered child is: a raw block or a nested container.
#[derive(Clone)]
pub enum ChildKind {
    Block(Arc<dyn BlockUnit>),
    Container(Arc<ContainerCore>),
}

/// A uniformly-addressable handle over one registered child.
///
/// Carries the child's completion already wrapped with fault semantics, so
/// the aggregation loop can await children of either kind without caring
/// which they are.
#[derive(Clone)]
pub struct ChildNode {
    pub(crate) kind: ChildKind,
    pub(crate) wrapped: Completion,
}

impl ChildNode {
    /// Display name of the child.
    pub fn name(&self) -> &str {
        match &self.kind {
            ChildKind::Block(unit) => unit.name(),
            ChildKind::Container(container) => container.name(),
        }
    }

    /// Number of items queued in the child, summed over nested containers.
    pub fn buffered(&self) -> usize {
        match &self.kind {
            ChildKind::Block(unit) => unit.buffered(),
            ChildKind::Container(container) => container.buffered(),
        }
    }

    /// Flat enumeration of the child's underlying blocks.
    pub fn blocks(&self) -> Vec<Arc<dyn BlockUnit>> {
        match &self.kind {
            ChildKind::Block(unit) => vec![unit.clone()],
            ChildKind::Container(container) => container.blocks(),
        }
    }

    /// The child's completion, wrapped with fault classification.
    pub fn wrapped_completion(&self) -> &Completion {
        &self.wrapped
    }
}
