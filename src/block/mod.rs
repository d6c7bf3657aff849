//! Asynchronous processing blocks.
//!
//! A block is a bounded message channel plus a worker task that drains it.
//! Blocks are typed on their item types, complete exactly once, and can be
//! preempted by a fault or cancellation signal. Containers never touch the
//! typed sides directly; they manage blocks through the type-erased
//! [`BlockUnit`] view.

pub mod action;
pub mod buffer;
pub mod input;
pub mod output;
pub mod transform;

pub use action::ActionBlock;
pub use buffer::BufferBlock;
pub use input::{InputPort, PostError};
pub use output::{OutputPort, RoutePredicate};
pub use transform::TransformBlock;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::watch;

use crate::concurrency::completion::{Completion, CompletionTx, completion_pair};
use crate::error::Error;

/// Delay between retries when a non-blocking post is rejected with a full
/// queue. Chosen small enough that `safe_post` adds no visible latency to a
/// draining pipeline.
pub(crate) const SAFE_POST_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Default capacity of a block's input queue.
pub const DEFAULT_BLOCK_CAPACITY: usize = 256;

/// Process-unique identity of an underlying block.
///
/// Used for duplicate detection at registration time; two handles to the
/// same block always report the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

fn next_block_id() -> BlockId {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    BlockId(NEXT.fetch_add(1, Ordering::Relaxed))
}

/// Tuning knobs for a single block.
#[derive(Debug, Clone)]
pub struct BlockOptions {
    /// Capacity of the input queue. Posting beyond it backpressures senders.
    pub capacity: usize,
    /// Number of item bodies executed concurrently. Values above 1 forfeit
    /// output ordering.
    pub parallelism: usize,
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BLOCK_CAPACITY,
            parallelism: 1,
        }
    }
}

/// Type-erased view over a block, used by containers for registration,
/// queue accounting, and the fault protocol.
pub trait BlockUnit: Send + Sync {
    /// Display name of the block for logging.
    fn name(&self) -> &str;

    /// Process-unique identity of the block.
    fn id(&self) -> BlockId;

    /// Number of items currently queued in the block's input.
    fn buffered(&self) -> usize;

    /// Completion observer for this block.
    fn completion(&self) -> Completion;

    /// Transitions the block to a faulted terminal state.
    ///
    /// The first fault or cancellation signal wins; the worker abandons
    /// processing, discards queued items, and resolves the completion.
    fn fault(&self, error: Arc<Error>);

    /// Transitions the block to a canceled terminal state.
    fn cancel(&self);

    /// Returns true once the block reached a terminal state.
    fn is_terminal(&self) -> bool {
        self.completion().is_terminal()
    }
}

/// Preemption signal delivered to a block's worker task.
#[derive(Debug, Clone)]
pub(crate) enum Interrupt {
    Fault(Arc<Error>),
    Cancel,
}

/// State shared between a block's handles and its worker task.
pub(crate) struct BlockInner {
    name: String,
    id: BlockId,
    depth: AtomicUsize,
    interrupt: watch::Sender<Option<Interrupt>>,
    completion: Completion,
}

/// Worker-side endpoints of a block: the completion transmitter and the
/// interrupt receiver. Handed to the worker task at spawn time.
pub(crate) struct BlockRuntime {
    pub(crate) completion_tx: CompletionTx,
    pub(crate) interrupt_rx: watch::Receiver<Option<Interrupt>>,
}

impl BlockInner {
    pub(crate) fn new(name: impl Into<String>) -> (Arc<Self>, BlockRuntime) {
        let (interrupt_tx, interrupt_rx) = watch::channel(None);
        let (completion_tx, completion) = completion_pair();
        let inner = Arc::new(Self {
            name: name.into(),
            id: next_block_id(),
            depth: AtomicUsize::new(0),
            interrupt: interrupt_tx,
            completion,
        });
        (
            inner,
            BlockRuntime {
                completion_tx,
                interrupt_rx,
            },
        )
    }

    pub(crate) fn depth_inc(&self) {
        self.depth.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn depth_dec(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn depth_reset(&self) {
        self.depth.store(0, Ordering::Relaxed);
    }

    fn signal(&self, interrupt: Interrupt) {
        let mut interrupt = Some(interrupt);
        self.interrupt.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = interrupt.take();
                true
            } else {
                false
            }
        });
    }
}

impl BlockUnit for BlockInner {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> BlockId {
        self.id
    }

    fn buffered(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    fn completion(&self) -> Completion {
        self.completion.clone()
    }

    fn fault(&self, error: Arc<Error>) {
        self.signal(Interrupt::Fault(error));
    }

    fn cancel(&self) {
        self.signal(Interrupt::Cancel);
    }
}

/// Waits for the first interrupt signaled to a block.
///
/// Never resolves if the block is never interrupted; always raced against
/// the worker's processing future.
pub(crate) async fn wait_interrupt(rx: &mut watch::Receiver<Option<Interrupt>>) -> Interrupt {
    loop {
        if let Some(interrupt) = rx.borrow_and_update().clone() {
            return interrupt;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// How a worker task left its processing loop.
pub(crate) enum WorkerExit {
    Interrupted(Interrupt),
    Finished(crate::error::Result<()>),
}
