//! Demo: publish through the in-process broker and watch the relay fan out
//!
//! Usage: simple_relay [message_count]

use anyhow::Result;
use fluxmq_relay::{MemoryBroker, Message, Publisher, Relay, RelayConfigBuilder, RelayState};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let message_count: usize = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(5);

    info!("=== FluxMQ Relay Demo ===");
    info!(
        "Relaying {} messages through the in-process broker",
        message_count
    );

    let config = RelayConfigBuilder::new()
        .brokers(vec!["in-process"])
        .topic("demo-topic")
        .history_capacity(10)
        .poll_timeout(Duration::from_millis(100))
        .build();

    let broker = Arc::new(MemoryBroker::new());
    let relay = Arc::new(Relay::new(config.clone(), broker.clone()));

    let runner = tokio::spawn({
        let relay = Arc::clone(&relay);
        async move { relay.run().await }
    });
    if !relay
        .wait_for_state(RelayState::Polling, Duration::from_secs(1))
        .await
    {
        anyhow::bail!("relay did not start polling");
    }

    let (backfill, mut observer) = relay.attach_observer();
    info!(
        "Observer attached with {} backfilled messages",
        backfill.len()
    );

    let publisher = Publisher::new(broker, &config);
    for i in 0..message_count {
        let value = serde_json::json!({
            "seq": i,
            "body": format!("demo message {}", i),
        })
        .to_string();
        let ack = publisher
            .publish("demo-topic", Message::new(format!("demo-{}", i), value))
            .await?;
        if let (Some(partition), Some(offset)) = (ack.partition, ack.offset) {
            info!("Acknowledged at partition {} offset {}", partition, offset);
        }
    }

    let mut received = 0;
    while received < message_count {
        match tokio::time::timeout(Duration::from_secs(1), observer.recv()).await {
            Ok(Some(message)) => {
                received += 1;
                info!("Observed: {}", serde_json::to_string(&message)?);
            }
            Ok(None) => break,
            Err(_) => {
                info!("No message within 1s, stopping early");
                break;
            }
        }
    }

    info!("History now holds {} messages", relay.history().len());

    relay.shutdown();
    runner.await??;
    info!("Relay finished in state '{}'", relay.state());

    Ok(())
}
