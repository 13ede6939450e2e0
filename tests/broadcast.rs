//! Broadcast fan-out, streaming collection, and queue backpressure

mod support;

use futures::StreamExt;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use support::{
    APOLLO_OFFSET, ATHENA_OFFSET, Behavior, COMPONENT_BASE, MockSpecialist, fabric, pick_ai_base,
};
use tekton_fabric::domain_types::{
    ConnectTimeoutMs, DefaultDeadlineMs, ProbeCacheTtlMs, QueueCapacity,
};
use tekton_fabric::{Fabric, FabricConfig, FabricError, PortMapper};

#[tokio::test]
async fn broadcast_aggregates_one_entry_per_target() {
    let ai_base = pick_ai_base().await;
    // Apollo is up; athena has no listener at all.
    let _apollo =
        MockSpecialist::start(ai_base + APOLLO_OFFSET, Behavior::Echo { delay_ms: 0 }).await;
    let dir = tempfile::tempdir().unwrap();
    let fabric = fabric(ai_base, &dir);

    let targets = vec!["apollo-ci".to_string(), "athena-ci".to_string()];
    let results = fabric
        .broadcast(&targets, "ping", Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results["apollo-ci"].as_ref().unwrap().content, "ping");
    assert!(matches!(
        results["athena-ci"],
        Err(FabricError::Unreachable { .. })
    ));

    fabric.close().await;
}

#[tokio::test]
async fn empty_target_set_is_invalid_argument() {
    let ai_base = pick_ai_base().await;
    let dir = tempfile::tempdir().unwrap();
    let fabric = fabric(ai_base, &dir);

    let err = fabric
        .broadcast(&[], "ping", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, FabricError::InvalidArgument { .. }));
    assert_eq!(fabric.channel_count(), 0);

    fabric.close().await;
}

#[tokio::test]
async fn collect_yields_completions_as_they_arrive() {
    let ai_base = pick_ai_base().await;
    let _apollo =
        MockSpecialist::start(ai_base + APOLLO_OFFSET, Behavior::Echo { delay_ms: 200 }).await;
    let _athena =
        MockSpecialist::start(ai_base + ATHENA_OFFSET, Behavior::Echo { delay_ms: 10 }).await;
    let dir = tempfile::tempdir().unwrap();
    let fabric = fabric(ai_base, &dir);

    let targets = vec!["apollo-ci".to_string(), "athena-ci".to_string()];
    let mut stream = fabric
        .collect(&targets, "ping", Duration::from_secs(2))
        .unwrap();

    let (first, result) = stream.next().await.unwrap();
    assert_eq!(first, "athena-ci");
    assert!(result.is_ok());

    let (second, result) = stream.next().await.unwrap();
    assert_eq!(second, "apollo-ci");
    assert!(result.is_ok());

    assert!(stream.next().await.is_none());
    fabric.close().await;
}

#[tokio::test]
async fn collect_emits_timeout_entries_for_unresolved_targets() {
    let ai_base = pick_ai_base().await;
    let _apollo = MockSpecialist::start(ai_base + APOLLO_OFFSET, Behavior::Silent).await;
    let dir = tempfile::tempdir().unwrap();
    let fabric = fabric(ai_base, &dir);

    let targets = vec!["apollo-ci".to_string()];
    let results = fabric
        .broadcast(&targets, "ping", Duration::from_millis(200))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(matches!(
        results["apollo-ci"],
        Err(FabricError::Timeout { .. })
    ));

    fabric.close().await;
}

#[tokio::test]
async fn queue_overflow_fails_fast_without_deadlock() {
    let ai_base = pick_ai_base().await;
    let apollo =
        MockSpecialist::start(ai_base + APOLLO_OFFSET, Behavior::Echo { delay_ms: 300 }).await;
    let dir = tempfile::tempdir().unwrap();

    let config = FabricConfig::builder()
        .queue_capacity(QueueCapacity::try_new(4).unwrap())
        .connect_timeout_ms(ConnectTimeoutMs::try_new(500).unwrap())
        .default_deadline_ms(DefaultDeadlineMs::try_new(5000).unwrap())
        .probe_cache_ttl_ms(ProbeCacheTtlMs::try_new(0).unwrap())
        .forward_store_path(dir.path().join("forwarding.json"))
        .build()
        .unwrap();
    let fabric = Arc::new(Fabric::new(config, PortMapper::new(COMPONENT_BASE, ai_base)));

    // Occupy the wire first so the queue can actually fill.
    let head = {
        let fabric = Arc::clone(&fabric);
        tokio::spawn(async move { fabric.send("apollo-ci", "0").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let bodies: Vec<String> = (1..=7).map(|i| i.to_string()).collect();
    let results = join_all(bodies.iter().map(|body| fabric.send("apollo-ci", body))).await;

    let queue_full = results
        .iter()
        .filter(|result| matches!(result, Err(FabricError::QueueFull { .. })))
        .count();
    let completed = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(queue_full, 3, "cap 4 + 7 submissions must refuse exactly 3");
    assert_eq!(completed, 4);
    assert!(head.await.unwrap().is_ok());

    // Exactly the accepted requests reached the wire.
    assert_eq!(apollo.received().len(), 5);
    fabric.close().await;
}
