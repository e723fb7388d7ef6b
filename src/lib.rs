//! # FluxMQ Relay
//!
//! A pub/sub relay that forwards records from a broker subscription to
//! in-process observers, keeping a bounded history of recent messages.
//!
//! ## Features
//!
//! - **Publisher**: validated, acknowledged sends with a bounded flush
//! - **Consumption loop**: resilient polling with explicit lifecycle states
//! - **History buffer**: bounded retention of the most recent messages
//! - **Fan-out**: per-observer channels where a slow observer only loses
//!   its own messages
//! - **Broker adapters**: in-process [`MemoryBroker`] for tests and demos,
//!   Kafka via the `kafka` feature
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fluxmq_relay::{MemoryBroker, Message, Publisher, Relay, RelayConfigBuilder, RelayState};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> fluxmq_relay::Result<()> {
//!     let config = RelayConfigBuilder::new()
//!         .brokers(vec!["in-process"])
//!         .topic("events")
//!         .build();
//!
//!     let broker = Arc::new(MemoryBroker::new());
//!     let relay = Arc::new(Relay::new(config.clone(), broker.clone()));
//!
//!     let runner = tokio::spawn({
//!         let relay = Arc::clone(&relay);
//!         async move { relay.run().await }
//!     });
//!     relay
//!         .wait_for_state(RelayState::Polling, Duration::from_secs(1))
//!         .await;
//!
//!     let (backfill, mut observer) = relay.attach_observer();
//!     println!("backfill: {} messages", backfill.len());
//!
//!     let publisher = Publisher::new(broker, &config);
//!     publisher
//!         .publish("events", Message::new("greeting", "hello"))
//!         .await?;
//!
//!     if let Some(message) = observer.recv().await {
//!         println!("live: {} = {}", message.key, message.value);
//!     }
//!
//!     relay.shutdown();
//!     runner.await.expect("relay task panicked")?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod broker;
pub mod config;
pub mod error;
pub mod history;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod message;
pub mod metrics;
pub mod publisher;
pub mod relay;

pub use broadcast::*;
pub use broker::*;
pub use config::*;
pub use error::*;
pub use history::*;
#[cfg(feature = "kafka")]
pub use kafka::*;
pub use memory::*;
pub use message::*;
pub use metrics::*;
pub use publisher::*;
pub use relay::*;

/// Result type used throughout the relay
pub type Result<T> = std::result::Result<T, RelayError>;

/// Current version of the FluxMQ relay library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
