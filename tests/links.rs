mod common;

use conflux::prelude::*;

use crate::common::{collecting_sink, init_test_tracing, wait_terminal};

#[tokio::test]
async fn downstream_failure_faults_the_upstream_container() {
    init_test_tracing();

    let upstream = TransformContainer::new(ContainerOptions::default(), |item: i64| async move {
        Ok(item)
    })
    .unwrap();
    let downstream = ActionContainer::new(ContainerOptions::default(), |item: i64| async move {
        if item == 42 {
            Err(Error::other("forbidden value"))
        } else {
            Ok(())
        }
    })
    .unwrap();
    upstream.link_to(&downstream);

    upstream.send(1).await.unwrap();
    upstream.send(42).await.unwrap();
    // The upstream input stays open: it has no reason of its own to finish,
    // so its failure can only come from the downstream side of the link.

    let downstream_outcome = wait_terminal(&downstream.completion()).await;
    assert!(matches!(
        downstream_outcome.error().expect("downstream must fail").kind(),
        ErrorKind::Other { .. }
    ));

    let upstream_outcome = wait_terminal(&upstream.completion()).await;
    assert!(matches!(
        upstream_outcome.error().expect("upstream must fail").kind(),
        ErrorKind::OtherContainerFailed
    ));
}

#[tokio::test]
async fn upstream_failure_faults_the_downstream_container() {
    init_test_tracing();

    let upstream = TransformContainer::new(ContainerOptions::default(), |item: i64| async move {
        if item == 13 {
            Err(Error::other("unlucky"))
        } else {
            Ok(item)
        }
    })
    .unwrap();
    let (downstream, _items) = collecting_sink::<i64>();
    upstream.link_to(&downstream);

    upstream.send(13).await.unwrap();

    let upstream_outcome = wait_terminal(&upstream.completion()).await;
    assert!(matches!(
        upstream_outcome.error().expect("upstream must fail").kind(),
        ErrorKind::Other { .. }
    ));

    let downstream_outcome = wait_terminal(&downstream.completion()).await;
    assert!(matches!(
        downstream_outcome.error().expect("downstream must fail").kind(),
        ErrorKind::OtherContainerFailed
    ));
}

#[tokio::test]
async fn upstream_cancellation_faults_the_downstream_container() {
    init_test_tracing();

    let upstream = TransformContainer::new(ContainerOptions::default(), |item: i64| async move {
        Ok(item)
    })
    .unwrap();
    let (downstream, _items) = collecting_sink::<i64>();
    upstream.link_to(&downstream);

    upstream.blocks()[0].cancel();

    assert!(wait_terminal(&upstream.completion()).await.is_canceled());

    let downstream_outcome = wait_terminal(&downstream.completion()).await;
    assert!(matches!(
        downstream_outcome.error().expect("downstream must fail").kind(),
        ErrorKind::OtherContainerCanceled
    ));
}

#[tokio::test]
async fn downstream_input_closes_exactly_when_the_upstream_is_done() {
    init_test_tracing();

    let first = TransformContainer::new(ContainerOptions::default(), |item: i64| async move {
        Ok(item + 1)
    })
    .unwrap();
    let second = TransformContainer::new(ContainerOptions::default(), |item: i64| async move {
        Ok(item * 10)
    })
    .unwrap();
    let (sink, items) = collecting_sink::<i64>();

    first.link_to(&second);
    second.link_to(&sink);

    for item in [1, 2, 3] {
        first.send(item).await.unwrap();
    }
    first.complete_input();

    assert!(wait_terminal(&first.completion()).await.is_success());
    assert!(wait_terminal(&second.completion()).await.is_success());
    assert!(wait_terminal(&sink.completion()).await.is_success());
    assert_eq!(*items.lock().unwrap(), vec![20, 30, 40]);
}
