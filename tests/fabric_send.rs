//! Single-send behavior and the per-channel FIFO discipline

mod support;

use futures::future::join_all;
use std::time::Duration;
use support::{APOLLO_OFFSET, Behavior, MockSpecialist, fabric, pick_ai_base};
use tokio::time::Instant;

#[tokio::test]
async fn send_returns_the_specialist_reply() {
    let ai_base = pick_ai_base().await;
    let _apollo =
        MockSpecialist::start(ai_base + APOLLO_OFFSET, Behavior::Echo { delay_ms: 0 }).await;
    let dir = tempfile::tempdir().unwrap();
    let fabric = fabric(ai_base, &dir);

    let reply = fabric.send("apollo-ci", "hello").await.unwrap();
    assert_eq!(reply.content, "hello");

    fabric.close().await;
}

#[tokio::test]
async fn bare_names_and_raw_endpoints_reach_the_same_specialist() {
    let ai_base = pick_ai_base().await;
    let apollo =
        MockSpecialist::start(ai_base + APOLLO_OFFSET, Behavior::Echo { delay_ms: 0 }).await;
    let dir = tempfile::tempdir().unwrap();
    let fabric = fabric(ai_base, &dir);

    fabric.send("apollo", "one").await.unwrap();
    fabric
        .send(&format!("localhost:{}", apollo.port()), "two")
        .await
        .unwrap();

    assert_eq!(apollo.received(), vec!["one", "two"]);
    fabric.close().await;
}

#[tokio::test]
async fn concurrent_sends_serialize_in_submission_order() {
    let ai_base = pick_ai_base().await;
    let apollo =
        MockSpecialist::start(ai_base + APOLLO_OFFSET, Behavior::Echo { delay_ms: 20 }).await;
    let dir = tempfile::tempdir().unwrap();
    let fabric = fabric(ai_base, &dir);

    let bodies: Vec<String> = (1..=10).map(|i| i.to_string()).collect();
    let started = Instant::now();
    let results = join_all(bodies.iter().map(|body| fabric.send("apollo-ci", body))).await;
    let elapsed = started.elapsed();

    // Every reply correlates with its own request, in order.
    for (body, result) in bodies.iter().zip(&results) {
        assert_eq!(&result.as_ref().unwrap().content, body);
    }
    // The wire trace is a serialization of the submissions: no interleaving,
    // no pipelining.
    assert_eq!(apollo.received(), bodies);
    assert!(
        elapsed >= Duration::from_millis(150),
        "ten 20ms exchanges finished in {elapsed:?}; pipelining suspected"
    );

    fabric.close().await;
}

#[tokio::test]
async fn successive_sends_complete_in_submission_order() {
    let ai_base = pick_ai_base().await;
    let apollo =
        MockSpecialist::start(ai_base + APOLLO_OFFSET, Behavior::Echo { delay_ms: 5 }).await;
    let dir = tempfile::tempdir().unwrap();
    let fabric = fabric(ai_base, &dir);

    for body in ["a", "b", "c"] {
        let reply = fabric.send("apollo-ci", body).await.unwrap();
        assert_eq!(reply.content, body);
    }
    assert_eq!(apollo.received(), vec!["a", "b", "c"]);

    fabric.close().await;
}

#[tokio::test]
async fn unknown_specialist_is_a_hard_error() {
    let ai_base = pick_ai_base().await;
    let dir = tempfile::tempdir().unwrap();
    let fabric = fabric(ai_base, &dir);

    let err = fabric.send("zeus-ci", "hello").await.unwrap_err();
    assert!(matches!(
        err,
        tekton_fabric::FabricError::UnknownSpecialist { .. }
    ));

    fabric.close().await;
}
