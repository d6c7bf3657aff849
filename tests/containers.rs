mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use conflux::block::{ActionBlock, BlockOptions};
use conflux::prelude::*;

use crate::common::{collecting_sink, init_test_tracing, wait_terminal};

#[tokio::test]
async fn transform_container_doubles_and_completes() {
    init_test_tracing();

    let doubler = TransformContainer::new(ContainerOptions::default(), |item: i64| async move {
        Ok(item * 2)
    })
    .unwrap();
    let (sink, items) = collecting_sink::<i64>();
    doubler.link_to(&sink);

    for item in [1, 2, 3] {
        doubler.send(item).await.unwrap();
    }
    doubler.complete_input();

    assert!(wait_terminal(&doubler.completion()).await.is_success());
    assert!(wait_terminal(&sink.completion()).await.is_success());
    assert_eq!(*items.lock().unwrap(), vec![2, 4, 6]);
}

#[tokio::test]
async fn cleanup_runs_once_and_completion_is_memoized() {
    init_test_tracing();

    let stage = TransformContainer::new(ContainerOptions::default(), |item: i64| async move {
        Ok(item)
    })
    .unwrap();
    let (sink, _items) = collecting_sink::<i64>();
    stage.link_to(&sink);

    let cleanups = Arc::new(AtomicUsize::new(0));
    let counted = cleanups.clone();
    stage.core().set_cleanup(move || {
        counted.fetch_add(1, Ordering::SeqCst);
    });

    stage.send(1).await.unwrap();
    stage.complete_input();

    // Observing the completion from several angles resolves the same future.
    let first = stage.completion();
    let second = stage.completion();
    assert!(wait_terminal(&first).await.is_success());
    assert!(wait_terminal(&second).await.is_success());
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn one_failing_child_faults_its_siblings() {
    init_test_tracing();

    let core = ContainerCore::new("SiblingFaultTest", ContainerOptions::default());

    let failing = ActionBlock::new("sibling-originator", BlockOptions::default(), |item: u32| async move {
        if item == 9 {
            Err(Error::other("disk offline"))
        } else {
            Ok(())
        }
    });
    let bystander = ActionBlock::new("sibling-bystander", BlockOptions::default(), |_item: u32| async move {
        Ok(())
    });

    core.register_block(failing.unit(), None).unwrap();
    core.register_block(bystander.unit(), None).unwrap();

    failing.input().send(9).await.unwrap();

    // The container surfaces the originating error, not a propagated marker.
    let outcome = wait_terminal(&core.completion()).await;
    let cause = outcome.error().expect("container must fail");
    assert!(matches!(cause.kind(), ErrorKind::Other { .. }));

    // The bystander was torn down with a sibling marker carrying no cause.
    let bystander_outcome = wait_terminal(&bystander.completion()).await;
    assert!(matches!(
        bystander_outcome.error().expect("bystander must fail").kind(),
        ErrorKind::SiblingUnitFailed
    ));

    // The originator kept its own diagnosis: no marker was wrapped around it.
    let failing_outcome = wait_terminal(&failing.completion()).await;
    assert!(matches!(
        failing_outcome.error().expect("originator must fail").kind(),
        ErrorKind::Other { .. }
    ));
}

#[tokio::test]
async fn canceled_child_faults_siblings_with_cancel_marker() {
    init_test_tracing();

    let core = ContainerCore::new("SiblingCancelTest", ContainerOptions::default());

    let canceled = ActionBlock::new("cancel-victim", BlockOptions::default(), |_item: u32| async move {
        Ok(())
    });
    let bystander = ActionBlock::new("cancel-bystander", BlockOptions::default(), |_item: u32| async move {
        Ok(())
    });

    core.register_block(canceled.unit(), None).unwrap();
    core.register_block(bystander.unit(), None).unwrap();

    canceled.unit().cancel();

    let bystander_outcome = wait_terminal(&bystander.completion()).await;
    assert!(matches!(
        bystander_outcome.error().expect("bystander must fail").kind(),
        ErrorKind::SiblingUnitCanceled
    ));

    // The sibling markers are only the echo of the cancellation, so the
    // container itself resolves as canceled.
    assert!(wait_terminal(&core.completion()).await.is_canceled());
}

#[tokio::test]
async fn pull_from_delivers_everything_through_a_bounded_input() {
    init_test_tracing();

    let stage = TransformContainer::with_block_options(
        ContainerOptions::default(),
        BlockOptions {
            capacity: 16,
            parallelism: 1,
        },
        |item: u64| async move { Ok(item) },
    )
    .unwrap();
    let (sink, items) = collecting_sink::<u64>();
    stage.link_to(&sink);

    let delivered = stage.pull_from(0..10_000u64).await.unwrap();
    assert_eq!(delivered, 10_000);
    stage.complete_input();

    assert!(wait_terminal(&stage.completion()).await.is_success());
    assert!(wait_terminal(&sink.completion()).await.is_success());

    let received = items.lock().unwrap();
    assert_eq!(received.len(), 10_000);
    assert!(received.iter().copied().eq(0..10_000));
}

#[tokio::test]
async fn link_from_closes_input_on_upstream_completion() {
    init_test_tracing();

    let upstream: conflux::block::TransformBlock<i64, i64> = conflux::block::TransformBlock::new(
        "external-source",
        BlockOptions::default(),
        |item| async move { Ok(item) },
    );

    let (sink, items) = collecting_sink::<i64>();
    sink.link_from(&upstream.output());

    let input = upstream.input();
    for item in [5, 6] {
        input.send(item).await.unwrap();
    }
    input.complete();

    // Upstream completion propagates over the edge, so the sink finishes
    // without anyone touching its input directly.
    assert!(wait_terminal(&sink.completion()).await.is_success());
    assert_eq!(*items.lock().unwrap(), vec![5, 6]);
}
