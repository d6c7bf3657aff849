use std::future::Future;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tracing::error;

use crate::block::{
    BlockInner, BlockOptions, BlockRuntime, BlockUnit, InputPort, Interrupt, WorkerExit,
    wait_interrupt,
};
use crate::concurrency::completion::Completion;

/// A terminal block that consumes every input item with an asynchronous
/// body and produces no output.
///
/// Also serves as the null sink: a body that merely drops (and optionally
/// records) its item discards the leftovers of a routing fan-out.
pub struct ActionBlock<T> {
    inner: Arc<BlockInner>,
    input: InputPort<T>,
}

impl<T: Send + 'static> ActionBlock<T> {
    /// Creates the block and spawns its worker task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new<F, Fut>(name: impl Into<String>, options: BlockOptions, body: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::error::Result<()>> + Send + 'static,
    {
        let (inner, runtime) = BlockInner::new(name);
        let (sender, receiver) = mpsc::channel(options.capacity.max(1));
        let input = InputPort::new(sender, inner.clone());

        tokio::spawn(run_action(
            receiver,
            body,
            inner.clone(),
            runtime,
            options.parallelism.max(1),
        ));

        Self { inner, input }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn input(&self) -> InputPort<T> {
        self.input.clone()
    }

    pub fn completion(&self) -> Completion {
        self.inner.completion()
    }

    /// Type-erased view for registration and the fault protocol.
    pub fn unit(&self) -> Arc<dyn BlockUnit> {
        self.inner.clone()
    }
}

async fn run_action<T, F, Fut>(
    mut receiver: mpsc::Receiver<T>,
    body: F,
    inner: Arc<BlockInner>,
    runtime: BlockRuntime,
    parallelism: usize,
) where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::error::Result<()>> + Send + 'static,
{
    let BlockRuntime {
        completion_tx,
        mut interrupt_rx,
    } = runtime;

    let work = async {
        if parallelism <= 1 {
            while let Some(item) = receiver.recv().await {
                inner.depth_dec();
                body(item).await?;
            }
        } else {
            let mut in_flight = FuturesUnordered::new();
            loop {
                tokio::select! {
                    Some(result) = in_flight.next(), if !in_flight.is_empty() => {
                        result?;
                    }
                    received = receiver.recv(), if in_flight.len() < parallelism => {
                        match received {
                            Some(item) => {
                                inner.depth_dec();
                                in_flight.push(body(item));
                            }
                            None => break,
                        }
                    }
                }
            }
            while let Some(result) = in_flight.next().await {
                result?;
            }
        }
        Ok(())
    };

    let exit = tokio::select! {
        biased;

        interrupt = wait_interrupt(&mut interrupt_rx) => WorkerExit::Interrupted(interrupt),
        result = work => WorkerExit::Finished(result),
    };

    match exit {
        WorkerExit::Interrupted(Interrupt::Fault(cause)) => {
            inner.depth_reset();
            completion_tx.fail(cause);
        }
        WorkerExit::Interrupted(Interrupt::Cancel) => {
            inner.depth_reset();
            completion_tx.cancel();
        }
        WorkerExit::Finished(Ok(())) => {
            completion_tx.succeed();
        }
        WorkerExit::Finished(Err(cause)) => {
            inner.depth_reset();
            match interrupt_rx.borrow().clone() {
                Some(Interrupt::Fault(interrupt_cause)) => {
                    completion_tx.fail(interrupt_cause);
                }
                Some(Interrupt::Cancel) => {
                    completion_tx.cancel();
                }
                None => {
                    let cause = Arc::new(cause);
                    error!(unit = %inner.name(), error = %cause, "block body failed");
                    completion_tx.fail(cause);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::completion::Outcome;
    use crate::error::{Error, ErrorKind};
    use std::sync::Mutex;

    #[tokio::test]
    async fn consumes_all_items_then_completes() {
        let items: Arc<Mutex<Vec<u32>>> = Arc::default();
        let sink_items = items.clone();
        let action = ActionBlock::new("consumer", BlockOptions::default(), move |item: u32| {
            let sink_items = sink_items.clone();
            async move {
                sink_items.lock().unwrap().push(item);
                Ok(())
            }
        });

        let input = action.input();
        for item in [10, 20, 30] {
            input.send(item).await.unwrap();
        }
        input.complete();

        assert!(matches!(action.completion().wait().await, Outcome::Success));
        assert_eq!(*items.lock().unwrap(), vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn cancel_resolves_as_canceled() {
        let action = ActionBlock::new("cancelable", BlockOptions::default(), |_item: u32| async move {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Ok(())
        });
        action.input().send(1).await.unwrap();

        action.unit().cancel();

        assert!(matches!(action.completion().wait().await, Outcome::Canceled));
    }

    #[tokio::test]
    async fn body_error_surfaces_as_failure() {
        let action = ActionBlock::new("rejecting", BlockOptions::default(), |item: u32| async move {
            if item == 7 {
                Err(Error::other("rejected"))
            } else {
                Ok(())
            }
        });
        let input = action.input();
        input.send(7).await.unwrap();

        let outcome = action.completion().wait().await;
        assert!(matches!(
            outcome.error().expect("expected failure").kind(),
            ErrorKind::Other { .. }
        ));
    }
}
