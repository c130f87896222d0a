//! Fan-out engine behavior: per-target isolation, sequencing, validation.

use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

use chat_hub::application::Hub;
use chat_hub::config::HubSettings;
use chat_hub::domain::{ChannelId, ChannelRetention, DeliveryOutcome, PresenceState, UserId};
use chat_hub::shared::HubError;

use crate::common::{hub_settings, Behavior, RecordingStore, TestTransport};

fn general() -> ChannelId {
    ChannelId::from("general")
}

/// One failing target does not stop delivery to the others.
#[tokio::test]
async fn test_partial_failure_is_isolated() {
    // Arrange
    let hub = Hub::new(hub_settings());
    let sender = hub
        .accept_connection(UserId::from("sender"), TestTransport::accepting())
        .unwrap();
    let a_transport = TestTransport::accepting();
    let b_transport = TestTransport::failing();
    let c_transport = TestTransport::accepting();
    let a = hub.accept_connection(UserId::from("a"), a_transport.clone()).unwrap();
    let b = hub.accept_connection(UserId::from("b"), b_transport.clone()).unwrap();
    let c = hub.accept_connection(UserId::from("c"), c_transport.clone()).unwrap();
    for id in [&sender, &a, &b, &c] {
        hub.subscribe(id, &general()).unwrap();
    }

    // Act
    let report = hub.publish(&sender, &general(), b"hello".to_vec()).await.unwrap();

    // Assert
    assert_eq!(report.sequence, 1);
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.outcome_for(&a), Some(DeliveryOutcome::Delivered));
    assert_eq!(report.outcome_for(&b), Some(DeliveryOutcome::FailedTransport));
    assert_eq!(report.outcome_for(&c), Some(DeliveryOutcome::Delivered));
    assert_eq!(report.outcome_for(&sender), None);

    assert_eq!(a_transport.sequences(&general()), vec![1]);
    assert_eq!(c_transport.sequences(&general()), vec![1]);
    assert!(b_transport.received().is_empty());

    // The failing session stays registered; failure is not eviction.
    assert!(hub.lookup(&b).is_ok());
    let stats = hub.stats();
    assert_eq!(stats.deliveries_delivered, 2);
    assert_eq!(stats.deliveries_failed, 1);
}

/// Concurrent publishers on one channel get gap-free, unique sequences.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishes_are_gap_free() {
    const PUBLISHERS: usize = 4;
    const PER_PUBLISHER: usize = 25;

    // Arrange
    let hub = Arc::new(Hub::new(hub_settings()));
    let listener_transport = TestTransport::accepting();
    let listener = hub
        .accept_connection(UserId::from("listener"), listener_transport.clone())
        .unwrap();
    hub.subscribe(&listener, &general()).unwrap();

    let mut publishers = Vec::new();
    for i in 0..PUBLISHERS {
        let id = hub
            .accept_connection(UserId::from(format!("publisher-{}", i)), TestTransport::accepting())
            .unwrap();
        hub.subscribe(&id, &general()).unwrap();
        publishers.push(id);
    }

    // Act
    let tasks: Vec<_> = publishers
        .into_iter()
        .map(|id| {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                let mut sequences = Vec::new();
                for n in 0..PER_PUBLISHER {
                    let report = hub
                        .publish(&id, &general(), format!("msg {}", n).into_bytes())
                        .await
                        .unwrap();
                    sequences.push(report.sequence);
                }
                sequences
            })
        })
        .collect();

    let mut assigned = BTreeSet::new();
    for task in tasks {
        for sequence in task.await.unwrap() {
            assert!(assigned.insert(sequence), "sequence {} assigned twice", sequence);
        }
    }

    // Assert
    let total = (PUBLISHERS * PER_PUBLISHER) as u64;
    let expected: BTreeSet<u64> = (1..=total).collect();
    assert_eq!(assigned, expected);

    let delivered: BTreeSet<u64> = listener_transport.sequences(&general()).into_iter().collect();
    assert_eq!(delivered, expected);
}

/// Oversized payloads are rejected before any state changes.
#[tokio::test]
async fn test_payload_too_large_leaves_no_trace() {
    // Arrange
    let settings = HubSettings {
        max_payload_bytes: 8,
        ..hub_settings()
    };
    let store = RecordingStore::new();
    let hub = Hub::with_store(settings, store.clone());
    let alice = hub
        .accept_connection(UserId::from("alice"), TestTransport::accepting())
        .unwrap();
    let bob_transport = TestTransport::accepting();
    let bob = hub.accept_connection(UserId::from("bob"), bob_transport.clone()).unwrap();
    hub.subscribe(&alice, &general()).unwrap();
    hub.subscribe(&bob, &general()).unwrap();

    // Act
    let err = hub
        .publish(&alice, &general(), vec![0u8; 9])
        .await
        .unwrap_err();

    // Assert
    assert_eq!(err, HubError::PayloadTooLarge { size: 9, max: 8 });
    assert!(bob_transport.received().is_empty());
    assert!(store.messages().is_empty());
    assert_eq!(hub.stats().messages_published, 0);

    // The next valid publish still starts at 1.
    let report = assert_ok!(hub.publish(&alice, &general(), b"ok".to_vec()).await);
    assert_eq!(report.sequence, 1);
}

/// A payload of exactly the maximum size is accepted.
#[tokio::test]
async fn test_payload_at_limit_is_accepted() {
    let settings = HubSettings {
        max_payload_bytes: 8,
        ..hub_settings()
    };
    let hub = Hub::new(settings);
    let alice = hub
        .accept_connection(UserId::from("alice"), TestTransport::accepting())
        .unwrap();
    hub.subscribe(&alice, &general()).unwrap();

    let report = assert_ok!(hub.publish(&alice, &general(), vec![1u8; 8]).await);
    assert!(report.results.is_empty());
}

/// Publishing to channels that do not exist is rejected and leaves no
/// channel or sequence counter behind.
#[tokio::test]
async fn test_publish_to_unknown_channels_allocates_nothing() {
    let store = RecordingStore::new();
    let hub = Hub::with_store(hub_settings(), store.clone());
    let alice = hub
        .accept_connection(UserId::from("alice"), TestTransport::accepting())
        .unwrap();

    for i in 0..100 {
        let channel = ChannelId::from(format!("junk-{}", i));
        let err = hub
            .publish(&alice, &channel, b"echo?".to_vec())
            .await
            .unwrap_err();
        assert_eq!(err, HubError::ChannelNotFound(channel.clone()));
        assert_eq!(hub.registry().rooms().last_sequence(&channel), 0);
    }

    let stats = hub.stats();
    assert_eq!(stats.channels, 0);
    assert_eq!(stats.messages_published, 0);
    assert!(store.messages().is_empty());
}

/// A retained channel with no subscribers still accepts publishes and keeps
/// counting.
#[tokio::test]
async fn test_publish_to_retained_empty_channel() {
    let settings = HubSettings {
        channel_retention: ChannelRetention::Retain,
        ..hub_settings()
    };
    let hub = Hub::new(settings);
    let alice = hub
        .accept_connection(UserId::from("alice"), TestTransport::accepting())
        .unwrap();
    hub.subscribe(&alice, &general()).unwrap();
    hub.publish(&alice, &general(), b"one".to_vec()).await.unwrap();
    hub.unsubscribe(&alice, &general()).unwrap();

    let report = hub.publish(&alice, &general(), b"two".to_vec()).await.unwrap();

    assert_eq!(report.sequence, 2);
    assert!(report.results.is_empty());
}

/// Once validation passes, dropping the publisher's future does not cut
/// the fan-out short.
#[tokio::test(start_paused = true)]
async fn test_fanout_completes_after_publisher_cancelled() {
    // Deliveries run one at a time, 50ms each.
    let settings = HubSettings {
        fanout_concurrency: 1,
        ..hub_settings()
    };
    let hub = Arc::new(Hub::new(settings));
    let sender = hub
        .accept_connection(UserId::from("sender"), TestTransport::accepting())
        .unwrap();
    hub.subscribe(&sender, &general()).unwrap();
    let transports: Vec<_> = (0..5)
        .map(|i| {
            let transport = TestTransport::stalling(Duration::from_millis(50));
            let id = hub
                .accept_connection(UserId::from(format!("slow-{}", i)), transport.clone())
                .unwrap();
            hub.subscribe(&id, &general()).unwrap();
            transport
        })
        .collect();

    let publisher = {
        let hub = Arc::clone(&hub);
        let sender = sender.clone();
        tokio::spawn(async move { hub.publish(&sender, &general(), b"bye".to_vec()).await })
    };
    tokio::time::sleep(Duration::from_millis(60)).await;
    let delivered_so_far = transports.iter().filter(|t| !t.received().is_empty()).count();
    assert!(delivered_so_far < transports.len());

    publisher.abort();
    assert!(publisher.await.unwrap_err().is_cancelled());
    assert!(hub.unregister(&sender));

    tokio::time::sleep(Duration::from_secs(1)).await;

    for transport in &transports {
        assert_eq!(transport.sequences(&general()), vec![1]);
    }
    assert_eq!(hub.stats().messages_published, 1);
    assert_eq!(hub.stats().deliveries_delivered, 5);
}

/// The store sees every accepted message, in sequence order per channel;
/// a store outage does not fail the publish.
#[tokio::test]
async fn test_store_receives_messages_best_effort() {
    let store = RecordingStore::new();
    let hub = Hub::with_store(hub_settings(), store.clone());
    let alice = hub
        .accept_connection(UserId::from("alice"), TestTransport::accepting())
        .unwrap();
    let bob_transport = TestTransport::accepting();
    let bob = hub.accept_connection(UserId::from("bob"), bob_transport.clone()).unwrap();
    hub.subscribe(&bob, &general()).unwrap();

    hub.publish(&alice, &general(), b"one".to_vec()).await.unwrap();
    store.set_failing(true);
    let report = hub.publish(&alice, &general(), b"two".to_vec()).await.unwrap();

    assert_eq!(report.outcome_for(&bob), Some(DeliveryOutcome::Delivered));
    let stored: Vec<u64> = store.messages().iter().map(|m| m.sequence).collect();
    assert_eq!(stored, vec![1]);
    assert_eq!(bob_transport.sequences(&general()), vec![1, 2]);
}

/// A target that leaves between the snapshot and its delivery is skipped.
#[tokio::test]
async fn test_target_leaving_mid_fanout_is_skipped() {
    // Deliveries run one at a time in session id order.
    let settings = HubSettings {
        fanout_concurrency: 1,
        ..hub_settings()
    };
    let hub = Arc::new(Hub::new(settings));
    let sender = hub
        .accept_connection(UserId::from("sender"), TestTransport::accepting())
        .unwrap();
    let x_transport = TestTransport::accepting();
    let y_transport = TestTransport::accepting();
    let x = hub.accept_connection(UserId::from("x"), x_transport.clone()).unwrap();
    let y = hub.accept_connection(UserId::from("y"), y_transport.clone()).unwrap();
    for id in [&sender, &x, &y] {
        hub.subscribe(id, &general()).unwrap();
    }

    let (first_transport, second) = if x < y {
        (x_transport.clone(), y.clone())
    } else {
        (y_transport.clone(), x.clone())
    };
    let first = if x < y { x.clone() } else { y.clone() };
    let hub_for_hook = Arc::clone(&hub);
    let leaving = second.clone();
    first_transport.on_deliver(move || {
        hub_for_hook.unregister(&leaving);
    });

    let report = hub.publish(&sender, &general(), b"hi".to_vec()).await.unwrap();

    assert_eq!(report.outcome_for(&first), Some(DeliveryOutcome::Delivered));
    assert_eq!(
        report.outcome_for(&second),
        Some(DeliveryOutcome::SkippedNotSubscribed)
    );
    assert_eq!(hub.stats().deliveries_skipped, 1);
}

/// A delivery that exceeds the timeout fails only that target and moves
/// its session into the eviction grace period.
#[tokio::test(start_paused = true)]
async fn test_slow_target_times_out() {
    let settings = HubSettings {
        delivery_timeout_ms: 50,
        ..hub_settings()
    };
    let hub = Hub::new(settings);
    let sender = hub
        .accept_connection(UserId::from("sender"), TestTransport::accepting())
        .unwrap();
    let fast = hub
        .accept_connection(UserId::from("fast"), TestTransport::accepting())
        .unwrap();
    let slow_transport = TestTransport::stalling(Duration::from_secs(5));
    let slow = hub
        .accept_connection(UserId::from("slow"), slow_transport.clone())
        .unwrap();
    for id in [&sender, &fast, &slow] {
        hub.subscribe(id, &general()).unwrap();
    }

    let report = hub.publish(&sender, &general(), b"hi".to_vec()).await.unwrap();

    assert_eq!(report.outcome_for(&fast), Some(DeliveryOutcome::Delivered));
    assert_eq!(report.outcome_for(&slow), Some(DeliveryOutcome::FailedTransport));
    assert_eq!(
        hub.lookup(&slow).unwrap().presence,
        PresenceState::PendingEviction
    );

    // Recovering transport plus any frame brings the session back.
    slow_transport.set_behavior(Behavior::Accept);
    hub.touch(&slow).unwrap();
    assert_eq!(hub.lookup(&slow).unwrap().presence, PresenceState::Active);
}

/// With echo enabled the sender receives its own message.
#[tokio::test]
async fn test_echo_to_sender() {
    let settings = HubSettings {
        echo_to_sender: true,
        ..hub_settings()
    };
    let hub = Hub::new(settings);
    let alice_transport = TestTransport::accepting();
    let alice = hub
        .accept_connection(UserId::from("alice"), alice_transport.clone())
        .unwrap();
    hub.subscribe(&alice, &general()).unwrap();

    let report = hub.publish(&alice, &general(), b"me".to_vec()).await.unwrap();

    assert_eq!(report.outcome_for(&alice), Some(DeliveryOutcome::Delivered));
    assert_eq!(alice_transport.received()[0].payload, b"me".to_vec());
}
