use std::future::Future;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tracing::error;

use crate::block::{
    BlockInner, BlockOptions, BlockRuntime, BlockUnit, InputPort, Interrupt, OutputPort,
    WorkerExit, wait_interrupt,
};
use crate::concurrency::completion::Completion;

/// A block that applies an asynchronous body to every input item and routes
/// the produced outputs through its edge registry.
///
/// With `parallelism` of 1 the block is FIFO end to end; higher values run
/// multiple bodies concurrently and deliver outputs as they finish.
pub struct TransformBlock<I, O> {
    inner: Arc<BlockInner>,
    input: InputPort<I>,
    output: OutputPort<O>,
}

impl<I, O> TransformBlock<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Creates the block and spawns its worker task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new<F, Fut>(name: impl Into<String>, options: BlockOptions, body: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::error::Result<O>> + Send + 'static,
    {
        let (inner, runtime) = BlockInner::new(name);
        let (sender, receiver) = mpsc::channel(options.capacity.max(1));
        let input = InputPort::new(sender, inner.clone());
        let output = OutputPort::new(inner.clone());

        tokio::spawn(run_transform(
            receiver,
            body,
            inner.clone(),
            output.clone(),
            runtime,
            options.parallelism.max(1),
        ));

        Self {
            inner,
            input,
            output,
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn input(&self) -> InputPort<I> {
        self.input.clone()
    }

    pub fn output(&self) -> OutputPort<O> {
        self.output.clone()
    }

    pub fn completion(&self) -> Completion {
        self.inner.completion()
    }

    /// Type-erased view for registration and the fault protocol.
    pub fn unit(&self) -> Arc<dyn BlockUnit> {
        self.inner.clone()
    }
}

async fn run_transform<I, O, F, Fut>(
    mut receiver: mpsc::Receiver<I>,
    body: F,
    inner: Arc<BlockInner>,
    output: OutputPort<O>,
    runtime: BlockRuntime,
    parallelism: usize,
) where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::error::Result<O>> + Send + 'static,
{
    let BlockRuntime {
        completion_tx,
        mut interrupt_rx,
    } = runtime;

    let work = async {
        if parallelism <= 1 {
            while let Some(item) = receiver.recv().await {
                inner.depth_dec();
                let produced = body(item).await?;
                output.dispatch(produced).await;
            }
        } else {
            let mut in_flight = FuturesUnordered::new();
            loop {
                tokio::select! {
                    Some(produced) = in_flight.next(), if !in_flight.is_empty() => {
                        output.dispatch(produced?).await;
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
            while let Some(produced) = in_flight.next().await {
                output.dispatch(produced?).await;
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
            output.propagate_complete();
            completion_tx.succeed();
        }
        WorkerExit::Finished(Err(cause)) => {
            inner.depth_reset();
            // An interrupt that raced the failure wins, so a block tripped
            // up by its container being faulted surfaces the propagated
            // cause instead of a local symptom.
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
