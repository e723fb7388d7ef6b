use fluxmq_relay::{
    HistoryBuffer, MemoryBroker, Message, Observer, Publisher, Relay, RelayConfig,
    RelayConfigBuilder, RelayMetrics, RelayState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};

fn test_config(topic: &str) -> RelayConfig {
    RelayConfigBuilder::new()
        .brokers(vec!["in-process"])
        .topic(topic)
        .poll_timeout(Duration::from_millis(50))
        .build()
}

async fn start_relay(relay: &Arc<Relay>) -> JoinHandle<fluxmq_relay::Result<()>> {
    let runner = tokio::spawn({
        let relay = Arc::clone(relay);
        async move { relay.run().await }
    });
    assert!(
        relay
            .wait_for_state(RelayState::Polling, Duration::from_secs(2))
            .await,
        "relay did not reach polling"
    );
    runner
}

async fn wait_until(mut predicate: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    predicate()
}

async fn recv_with_timeout(observer: &mut Observer) -> Message {
    tokio::time::timeout(Duration::from_secs(1), observer.recv())
        .await
        .expect("timed out waiting for message")
        .expect("observer channel closed")
}

#[tokio::test]
async fn test_concurrent_appends_and_snapshots() {
    let buffer = Arc::new(HistoryBuffer::new(100));
    let total = 1000u32;

    let writer = tokio::spawn({
        let buffer = Arc::clone(&buffer);
        async move {
            for i in 0..total {
                buffer.append(Message::new(format!("{:04}", i), "x"));
                if i % 64 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }
    });

    let mut readers = JoinSet::new();
    for _ in 0..4 {
        let buffer = Arc::clone(&buffer);
        readers.spawn(async move {
            for _ in 0..200 {
                let snapshot = buffer.snapshot();
                // Bounded at all times, and always oldest to newest
                assert!(snapshot.len() <= 100);
                for pair in snapshot.windows(2) {
                    assert!(pair[0].key < pair[1].key);
                }
                tokio::task::yield_now().await;
            }
        });
    }

    writer.await.expect("writer task panicked");
    while let Some(result) = readers.join_next().await {
        result.expect("reader task panicked");
    }

    let final_keys: Vec<String> = buffer.snapshot().iter().map(|m| m.key.clone()).collect();
    let expected: Vec<String> = (total - 100..total).map(|i| format!("{:04}", i)).collect();
    assert_eq!(final_keys, expected);
}

#[tokio::test]
async fn test_concurrent_publishers_all_arrive() {
    let metrics = Arc::new(RelayMetrics::default());
    let config = RelayConfigBuilder::new()
        .brokers(vec!["in-process"])
        .topic("burst")
        .history_capacity(200)
        .poll_timeout(Duration::from_millis(50))
        .build();
    let broker = Arc::new(MemoryBroker::new());
    let relay = Arc::new(Relay::with_metrics(
        config.clone(),
        broker.clone(),
        Arc::clone(&metrics),
    ));
    let runner = start_relay(&relay).await;

    let publisher = Arc::new(Publisher::with_metrics(
        broker,
        &config,
        Arc::clone(&metrics),
    ));
    let mut tasks = JoinSet::new();
    for producer_id in 0..4 {
        let publisher = Arc::clone(&publisher);
        tasks.spawn(async move {
            for i in 0..25 {
                publisher
                    .publish(
                        "burst",
                        Message::new(format!("p{}-{:02}", producer_id, i), "payload"),
                    )
                    .await
                    .expect("Failed to publish message");
            }
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.expect("producer task panicked");
    }

    assert!(
        wait_until(
            || metrics.snapshot().records_consumed == 100,
            Duration::from_secs(3)
        )
        .await,
        "not all published records were consumed"
    );

    let history = relay.history();
    assert_eq!(history.len(), 100);

    // Every key arrived exactly once, and each producer's keys kept their order
    for producer_id in 0..4 {
        let prefix = format!("p{}-", producer_id);
        let keys: Vec<&str> = history
            .iter()
            .filter(|m| m.key.starts_with(&prefix))
            .map(|m| m.key.as_str())
            .collect();
        let expected: Vec<String> = (0..25).map(|i| format!("p{}-{:02}", producer_id, i)).collect();
        assert_eq!(keys, expected);
    }

    relay.shutdown();
    runner.await.expect("relay task panicked").unwrap();
}

#[tokio::test]
async fn test_observer_churn_does_not_disturb_survivors() {
    let config = test_config("churn");
    let broker = Arc::new(MemoryBroker::new());
    let relay = Arc::new(Relay::new(config.clone(), broker.clone()));
    let runner = start_relay(&relay).await;

    let (_, mut observer_a) = relay.attach_observer();
    let (_, mut observer_b) = relay.attach_observer();
    assert_eq!(relay.observer_count(), 2);

    let publisher = Publisher::new(broker, &config);
    publisher
        .publish("churn", Message::new("m1", "x"))
        .await
        .expect("Failed to publish message");
    assert_eq!(recv_with_timeout(&mut observer_a).await.key, "m1");
    assert_eq!(recv_with_timeout(&mut observer_b).await.key, "m1");

    drop(observer_b);
    assert_eq!(relay.observer_count(), 1);

    publisher
        .publish("churn", Message::new("m2", "y"))
        .await
        .expect("Failed to publish message");
    assert_eq!(recv_with_timeout(&mut observer_a).await.key, "m2");

    relay.shutdown();
    runner.await.expect("relay task panicked").unwrap();
}

#[tokio::test]
async fn test_each_observer_sees_the_feed_in_order() {
    let config = test_config("ordered");
    let broker = Arc::new(MemoryBroker::new());
    let relay = Arc::new(Relay::new(config.clone(), broker.clone()));
    let runner = start_relay(&relay).await;

    let (_, observer_a) = relay.attach_observer();
    let (_, observer_b) = relay.attach_observer();

    let mut receivers = JoinSet::new();
    for mut observer in [observer_a, observer_b] {
        receivers.spawn(async move {
            for i in 0..10 {
                let message = recv_with_timeout(&mut observer).await;
                assert_eq!(message.key, format!("seq-{}", i));
            }
        });
    }

    let publisher = Publisher::new(broker, &config);
    for i in 0..10 {
        publisher
            .publish("ordered", Message::new(format!("seq-{}", i), "x"))
            .await
            .expect("Failed to publish message");
    }

    while let Some(result) = receivers.join_next().await {
        result.expect("receiver task panicked");
    }

    relay.shutdown();
    runner.await.expect("relay task panicked").unwrap();
}

#[tokio::test]
async fn test_slow_observer_loses_only_its_own_messages() {
    let metrics = Arc::new(RelayMetrics::default());
    let config = RelayConfigBuilder::new()
        .brokers(vec!["in-process"])
        .topic("lagged")
        .poll_timeout(Duration::from_millis(50))
        .observer_capacity(2)
        .build();
    let broker = Arc::new(MemoryBroker::new());
    let relay = Arc::new(Relay::with_metrics(
        config.clone(),
        broker.clone(),
        Arc::clone(&metrics),
    ));
    let runner = start_relay(&relay).await;

    let (_, mut active) = relay.attach_observer();
    let (_, mut slow) = relay.attach_observer();

    // The slow observer never reads while five messages go through
    let publisher = Publisher::new(broker, &config);
    for i in 0..5 {
        publisher
            .publish("lagged", Message::new(format!("k{}", i), "x"))
            .await
            .expect("Failed to publish message");
        assert_eq!(recv_with_timeout(&mut active).await.key, format!("k{}", i));
    }

    // Its queue held two, the other three were dropped for it alone
    assert!(
        wait_until(
            || metrics.snapshot().broadcasts_delivered == 7,
            Duration::from_secs(1)
        )
        .await
    );
    assert_eq!(metrics.snapshot().observers_lagged, 3);

    assert_eq!(recv_with_timeout(&mut slow).await.key, "k0");
    assert_eq!(recv_with_timeout(&mut slow).await.key, "k1");
    let nothing_more = tokio::time::timeout(Duration::from_millis(100), slow.recv()).await;
    assert!(nothing_more.is_err(), "slow observer had unexpected backlog");

    relay.shutdown();
    runner.await.expect("relay task panicked").unwrap();
}

#[tokio::test]
async fn test_shutdown_under_publish_traffic() {
    let config = test_config("busy");
    let broker = Arc::new(MemoryBroker::new());
    let relay = Arc::new(Relay::new(config.clone(), broker.clone()));
    let runner = start_relay(&relay).await;

    let publisher_task = tokio::spawn({
        let broker = Arc::clone(&broker);
        let config = config.clone();
        async move {
            let publisher = Publisher::new(broker, &config);
            for i in 0..50 {
                publisher
                    .publish("busy", Message::new(format!("k{}", i), "x"))
                    .await
                    .expect("Failed to publish message");
            }
        }
    });

    // Stop the relay while records are still flowing
    assert!(wait_until(|| !relay.history().is_empty(), Duration::from_secs(2)).await);
    relay.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(1), runner)
        .await
        .expect("relay did not stop under traffic")
        .expect("relay task panicked");
    result.unwrap();
    assert_eq!(relay.state(), RelayState::Closed);

    publisher_task.await.expect("publisher task panicked");
}
