//! The container model: child registration, aggregated completion, and the
//! fault protocol.
//!
//! A container is a long-lived logical unit owning one or more blocks and
//! possibly nested containers. Its aggregated completion resolves only after
//! every registered child resolved, children registered mid-flight included,
//! and a failure on any child tears the rest down with propagated markers so
//! the originating diagnosis is the one observers see.

pub mod child;
pub(crate) mod completion;
pub mod io;
pub(crate) mod monitor;
pub mod options;

pub use child::{ChildKind, ChildNode};
pub use completion::SuccessCallback;
pub use io::{AnyItem, DiscardRecorder, HasInput, HasOutput, InputOps, LinkDowncast, OutputOps};
pub use options::{ContainerOptions, DEFAULT_MONITOR_INTERVAL, MonitorMode};

use std::sync::{Arc, Mutex, OnceLock, Weak};

use futures::future::join_all;
use tracing::{debug, error, info};

use crate::bail;
use crate::block::BlockUnit;
use crate::concurrency::completion::{Completion, CompletionTx, Outcome, completion_pair};
use crate::concurrency::lock;
use crate::container::completion::wrap_child_completion;
use crate::error::{Error, ErrorKind, most_significant};
use crate::naming;

/// Common behavior shared by every container.
///
/// Implementors only provide access to their [`ContainerCore`]; lifecycle
/// operations are defined once here.
pub trait Container: Send + Sync {
    /// The lifecycle state of this container.
    fn core(&self) -> &Arc<ContainerCore>;

    /// Display name, unique per container type within the process.
    fn name(&self) -> &str {
        self.core().name()
    }

    /// The aggregated completion of this container.
    fn completion(&self) -> Completion {
        self.core().completion()
    }

    /// Tears down every not-yet-terminal block of this container.
    fn fault(&self, error: Error) {
        self.core().fault(&Arc::new(error));
    }

    /// Total number of items queued across all underlying blocks.
    fn buffered(&self) -> usize {
        self.core().buffered()
    }

    /// Flat enumeration of all underlying blocks, in registration order.
    fn blocks(&self) -> Vec<Arc<dyn BlockUnit>> {
        self.core().blocks()
    }
}

/// Lifecycle state of a container: naming, the children list, the memoized
/// aggregated completion, and the fault protocol.
pub struct ContainerCore {
    name: String,
    options: ContainerOptions,
    children: Mutex<Arc<Vec<ChildNode>>>,
    completion: OnceLock<Completion>,
    cleanup: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    discards: Mutex<Option<DiscardRecorder>>,
    self_ref: Weak<ContainerCore>,
}

impl ContainerCore {
    /// Creates a new core with an auto-numbered display name derived from
    /// the friendly type name.
    pub fn new(friendly_name: &str, options: ContainerOptions) -> Arc<Self> {
        crate::metrics::register_metrics();
        let name = naming::next_instance_name(friendly_name);
        Arc::new_cyclic(|self_ref| Self {
            name,
            options,
            children: Mutex::new(Arc::new(Vec::new())),
            completion: OnceLock::new(),
            cleanup: Mutex::new(None),
            discards: Mutex::new(None),
            self_ref: self_ref.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    /// Registers a raw block as a child.
    ///
    /// The block's completion is wrapped with the fault semantics of this
    /// container; `on_success` runs when the block completes cleanly.
    pub fn register_block(
        &self,
        unit: Arc<dyn BlockUnit>,
        on_success: Option<SuccessCallback>,
    ) -> crate::error::Result<()> {
        let mut children = lock(&self.children);
        let duplicate = children
            .iter()
            .flat_map(|child| child.blocks())
            .any(|existing| existing.id() == unit.id());
        if duplicate {
            bail!(ErrorKind::DuplicateChild {
                unit: unit.name().to_string(),
            });
        }

        let wrapped = wrap_child_completion(
            unit.completion(),
            unit.name().to_string(),
            self.self_ref.clone(),
            on_success,
        );
        debug!(container = %self.name, unit = %unit.name(), "registered block child");
        push_child(
            &mut children,
            ChildNode {
                kind: ChildKind::Block(unit),
                wrapped,
            },
        );
        Ok(())
    }

    /// Registers a nested container as a child.
    ///
    /// The child must already have at least one child of its own, since its
    /// aggregated completion is observed here.
    pub fn register_container(
        &self,
        container: &Arc<ContainerCore>,
        on_success: Option<SuccessCallback>,
    ) -> crate::error::Result<()> {
        if let Some(this) = self.self_ref.upgrade()
            && Arc::ptr_eq(&this, container)
        {
            bail!(ErrorKind::SelfRegistration);
        }

        let wrapped = wrap_child_completion(
            container.completion(),
            container.name().to_string(),
            self.self_ref.clone(),
            on_success,
        );
        debug!(container = %self.name, child = %container.name(), "registered container child");
        push_child(
            &mut lock(&self.children),
            ChildNode {
                kind: ChildKind::Container(container.clone()),
                wrapped,
            },
        );
        Ok(())
    }

    /// Snapshot of the current children list. Snapshots are referentially
    /// comparable, which is how the aggregation loop detects growth.
    pub fn children_snapshot(&self) -> Arc<Vec<ChildNode>> {
        lock(&self.children).clone()
    }

    /// Flat enumeration of all underlying blocks, nested containers
    /// included, in registration order.
    pub fn blocks(&self) -> Vec<Arc<dyn BlockUnit>> {
        self.children_snapshot()
            .iter()
            .flat_map(|child| child.blocks())
            .collect()
    }

    /// Total number of items queued across all children.
    pub fn buffered(&self) -> usize {
        self.children_snapshot()
            .iter()
            .map(|child| child.buffered())
            .sum()
    }

    /// Installs a hook that runs exactly once, after every child resolved
    /// and before the aggregated completion does.
    pub fn set_cleanup(&self, cleanup: impl FnOnce() + Send + 'static) {
        *lock(&self.cleanup) = Some(Box::new(cleanup));
    }

    pub(crate) fn set_discards(&self, recorder: DiscardRecorder) {
        lock(&self.discards).get_or_insert(recorder);
    }

    /// Statistics of outputs that matched no routing predicate, present
    /// once a remainder edge was installed.
    pub fn discards(&self) -> Option<DiscardRecorder> {
        lock(&self.discards).clone()
    }

    /// The aggregated completion of this container.
    ///
    /// Created and memoized on first observation; the monitor (when
    /// enabled) starts together with it and stops when it resolves.
    pub fn completion(&self) -> Completion {
        self.completion
            .get_or_init(|| {
                let (tx, completion) = completion_pair();
                if let Some(this) = self.self_ref.upgrade() {
                    if this.options.monitor_enabled() {
                        tokio::spawn(monitor::run_monitor(this.clone(), completion.clone()));
                    }
                    tokio::spawn(run_aggregation(this, tx));
                }
                completion
            })
            .clone()
    }

    /// Transitions every not-yet-terminal underlying block to a faulted
    /// state.
    ///
    /// Propagated errors pass through unchanged; a cancellation becomes a
    /// sibling-canceled marker and anything else a sibling-failed marker,
    /// so only the originator keeps the original cause.
    pub fn fault(&self, error: &Arc<Error>) {
        error!(container = %self.name, error = %error, "faulting container");
        for block in self.blocks() {
            if block.is_terminal() {
                continue;
            }
            let translated = if error.kind().is_propagated() {
                error.clone()
            } else if matches!(error.kind(), ErrorKind::Canceled) {
                Arc::new(Error::sibling_unit_canceled())
            } else {
                Arc::new(Error::sibling_unit_failed())
            };
            block.fault(translated);
        }
    }
}

fn push_child(children: &mut Arc<Vec<ChildNode>>, node: ChildNode) {
    let mut next = children.as_ref().clone();
    next.push(node);
    *children = Arc::new(next);
}

/// Awaits every child on a stable snapshot, re-snapshotting whenever the
/// children list grew during the wait, then runs cleanup and resolves the
/// aggregated completion.
async fn run_aggregation(this: Arc<ContainerCore>, tx: CompletionTx) {
    let mut snapshot = this.children_snapshot();
    if snapshot.is_empty() {
        tx.fail(Arc::new(Error::new(ErrorKind::NoChildRegistered)));
        return;
    }

    let outcomes = loop {
        let completions: Vec<Completion> = snapshot
            .iter()
            .map(|child| child.wrapped_completion().clone())
            .collect();
        let outcomes = join_all(completions.iter().map(|completion| completion.wait())).await;

        let current = this.children_snapshot();
        if Arc::ptr_eq(&current, &snapshot) {
            break outcomes;
        }
        debug!(
            container = %this.name,
            children = current.len(),
            "children registered during completion, re-awaiting"
        );
        snapshot = current;
    };

    if let Some(cleanup) = lock(&this.cleanup).take() {
        cleanup();
    }

    let mut failures: Vec<Arc<Error>> = Vec::new();
    let mut canceled = false;
    for outcome in outcomes {
        match outcome {
            Outcome::Failed(cause) => failures.push(cause),
            Outcome::Canceled => canceled = true,
            Outcome::Success => {}
        }
    }

    // A cancellation outranks a failure list made only of propagated
    // markers: those markers are the echo of the cancellation itself, and
    // observers must see the originating diagnosis.
    let originating = failures
        .iter()
        .find(|cause| !cause.kind().is_propagated())
        .cloned();
    if let Some(primary) = originating {
        fail_with(&this, &tx, primary, &failures);
    } else if canceled {
        info!(container = %this.name, "container canceled");
        tx.cancel();
    } else if let Some(first) = failures.first().cloned() {
        fail_with(&this, &tx, first, &failures);
    } else {
        info!(container = %this.name, "container completed");
        tx.succeed();
    }
}

fn fail_with(
    this: &Arc<ContainerCore>,
    tx: &CompletionTx,
    primary: Arc<Error>,
    failures: &[Arc<Error>],
) {
    let primary = most_significant(&primary);
    if failures.len() > 1 {
        error!(
            container = %this.name,
            error = %Error::from_many(failures.to_vec()),
            "container failed with multiple causes"
        );
    }
    error!(container = %this.name, error = %primary, "container failed");
    tx.fail(primary);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ActionBlock, BlockOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn idle_action(name: &str) -> ActionBlock<u32> {
        ActionBlock::new(name, BlockOptions::default(), |_item: u32| async move { Ok(()) })
    }

    #[tokio::test]
    async fn duplicate_block_registration_fails() {
        let core = ContainerCore::new("RegistryTest", ContainerOptions::default());
        let block = idle_action("dup");

        core.register_block(block.unit(), None).unwrap();
        let error = core.register_block(block.unit(), None).unwrap_err();
        assert!(matches!(error.kind(), ErrorKind::DuplicateChild { .. }));

        // Distinct blocks register fine.
        let other = idle_action("dup-other");
        core.register_block(other.unit(), None).unwrap();
    }

    #[tokio::test]
    async fn observing_completion_without_children_fails() {
        let core = ContainerCore::new("EmptyTest", ContainerOptions::default());
        let outcome = core.completion().wait().await;
        assert!(matches!(
            outcome.error().expect("expected failure").kind(),
            ErrorKind::NoChildRegistered
        ));
    }

    #[tokio::test]
    async fn self_registration_is_rejected() {
        let core = ContainerCore::new("SelfTest", ContainerOptions::default());
        let error = core.register_container(&core, None).unwrap_err();
        assert!(matches!(error.kind(), ErrorKind::SelfRegistration));
    }

    #[tokio::test]
    async fn cleanup_runs_exactly_once_on_success() {
        let core = ContainerCore::new("CleanupTest", ContainerOptions::default());
        let first = idle_action("cleanup-a");
        let second = idle_action("cleanup-b");
        core.register_block(first.unit(), None).unwrap();
        core.register_block(second.unit(), None).unwrap();

        let runs = Arc::new(AtomicUsize::new(0));
        let counted = runs.clone();
        core.set_cleanup(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        first.input().complete();
        second.input().complete();

        assert!(core.completion().wait().await.is_success());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_callback_failure_faults_the_container() {
        let core = ContainerCore::new("CallbackTest", ContainerOptions::default());
        let failing = idle_action("callback-a");
        let sibling = ActionBlock::new("callback-b", BlockOptions::default(), |_item: u32| async move {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Ok(())
        });

        core.register_block(
            failing.unit(),
            Some(Box::new(|| Err(Error::other("callback exploded")))),
        )
        .unwrap();
        core.register_block(sibling.unit(), None).unwrap();

        sibling.input().send(1).await.unwrap();
        failing.input().complete();

        let outcome = core.completion().wait().await;
        let cause = outcome.error().expect("expected failure");
        assert!(matches!(cause.kind(), ErrorKind::CallbackFailed { .. }));

        let sibling_outcome = sibling.completion().wait().await;
        assert!(matches!(
            sibling_outcome.error().expect("expected failure").kind(),
            ErrorKind::SiblingUnitFailed
        ));
    }

    #[tokio::test]
    async fn nested_container_children_flatten() {
        let inner = ContainerCore::new("NestedInner", ContainerOptions::default());
        let inner_block = idle_action("nested-inner-block");
        inner.register_block(inner_block.unit(), None).unwrap();

        let outer = ContainerCore::new("NestedOuter", ContainerOptions::default());
        let outer_block = idle_action("nested-outer-block");
        outer.register_block(outer_block.unit(), None).unwrap();
        outer.register_container(&inner, None).unwrap();

        assert_eq!(outer.blocks().len(), 2);

        inner_block.input().complete();
        outer_block.input().complete();

        assert!(outer.completion().wait().await.is_success());
        assert!(inner.completion().wait().await.is_success());
    }
}
