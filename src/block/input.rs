use std::fmt;
use std::sync::{Arc, Mutex};

use thiserror::Error as ThisError;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::sleep;

use crate::block::{BlockInner, BlockUnit, SAFE_POST_RETRY_DELAY};
use crate::concurrency::completion::Completion;
use crate::concurrency::lock;
use crate::error::Error;

/// Rejection of a non-blocking post, returning the item to the caller.
#[derive(ThisError)]
pub enum PostError<T> {
    /// The input queue is full. Retrying after a delay may succeed.
    #[error("the input queue is full")]
    Full(T),
    /// The input is completed or faulted. Retrying can never succeed.
    #[error("the input is completed or faulted")]
    Closed(T),
}

impl<T> PostError<T> {
    /// Recovers the rejected item.
    pub fn into_item(self) -> T {
        match self {
            PostError::Full(item) | PostError::Closed(item) => item,
        }
    }
}

impl<T> fmt::Debug for PostError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostError::Full(_) => write!(f, "PostError::Full(..)"),
            PostError::Closed(_) => write!(f, "PostError::Closed(..)"),
        }
    }
}

/// Typed ingress handle of a block.
///
/// Clones share the same underlying input: completing any clone completes
/// the block's input for all of them. Queued items still drain after
/// completion; only new offers are rejected.
pub struct InputPort<T> {
    sender: Arc<Mutex<Option<mpsc::Sender<T>>>>,
    inner: Arc<BlockInner>,
}

impl<T> Clone for InputPort<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> InputPort<T> {
    pub(crate) fn new(sender: mpsc::Sender<T>, inner: Arc<BlockInner>) -> Self {
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            inner,
        }
    }

    /// Display name of the underlying block.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Completion observer of the underlying block.
    pub fn completion(&self) -> Completion {
        self.inner.completion()
    }

    /// Number of items currently queued.
    pub fn buffered(&self) -> usize {
        self.inner.buffered()
    }

    /// Offers an item without waiting.
    pub fn post(&self, item: T) -> Result<(), PostError<T>> {
        let guard = lock(&self.sender);
        let Some(sender) = guard.as_ref() else {
            return Err(PostError::Closed(item));
        };
        match sender.try_send(item) {
            Ok(()) => {
                self.inner.depth_inc();
                Ok(())
            }
            Err(TrySendError::Full(item)) => Err(PostError::Full(item)),
            Err(TrySendError::Closed(item)) => Err(PostError::Closed(item)),
        }
    }

    /// Sends an item, waiting for queue space.
    pub async fn send(&self, item: T) -> crate::error::Result<()> {
        self.send_item(item)
            .await
            .map_err(|_| Error::input_closed(self.name()))
    }

    /// Sends an item, returning it to the caller when the input is closed.
    pub(crate) async fn send_item(&self, item: T) -> Result<(), T> {
        let sender = lock(&self.sender).clone();
        let Some(sender) = sender else {
            return Err(item);
        };
        match sender.send(item).await {
            Ok(()) => {
                self.inner.depth_inc();
                Ok(())
            }
            Err(rejected) => Err(rejected.0),
        }
    }

    /// Posts an item, retrying on a full queue until it is accepted.
    ///
    /// Eventually delivers every item for any finite, non-faulted pipeline;
    /// fails only when the input is completed or faulted.
    pub async fn safe_post(&self, item: T) -> crate::error::Result<()> {
        let mut item = item;
        loop {
            match self.post(item) {
                Ok(()) => return Ok(()),
                Err(PostError::Full(rejected)) => {
                    item = rejected;
                    sleep(SAFE_POST_RETRY_DELAY).await;
                }
                Err(PostError::Closed(_)) => return Err(Error::input_closed(self.name())),
            }
        }
    }

    /// Completes the input: no further items are accepted, queued items
    /// still drain. Idempotent.
    pub fn complete(&self) {
        lock(&self.sender).take();
    }
}
