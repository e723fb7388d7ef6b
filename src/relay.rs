//! Consumption loop driving records from the broker to history and observers

use crate::broadcast::{Broadcaster, Observer};
use crate::broker::{BrokerConnector, BrokerConsumer, ConsumedRecord};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::history::HistoryBuffer;
use crate::message::Message;
use crate::metrics::{global_metrics, MetricsSnapshot, RelayMetrics};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Empty polls between idle heartbeat log lines
const HEARTBEAT_POLLS: u64 = 120;

/// Lifecycle of the consumption loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Created = 0,
    Subscribed = 1,
    Polling = 2,
    Handling = 3,
    Closing = 4,
    Closed = 5,
}

impl RelayState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RelayState::Created,
            1 => RelayState::Subscribed,
            2 => RelayState::Polling,
            3 => RelayState::Handling,
            4 => RelayState::Closing,
            _ => RelayState::Closed,
        }
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayState::Created => "created",
            RelayState::Subscribed => "subscribed",
            RelayState::Polling => "polling",
            RelayState::Handling => "handling",
            RelayState::Closing => "closing",
            RelayState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Relays records from a broker subscription to the history buffer and all
/// attached observers.
///
/// [`Relay::run`] drives the loop to completion and can be called once per
/// relay. Broker-side consume errors are logged and the loop keeps polling;
/// only startup problems (bad configuration, failure to connect or subscribe)
/// end the run with an error. The consumer is closed exactly once on every
/// exit path, and [`Relay::shutdown`] is observed within one poll timeout.
pub struct Relay {
    config: RelayConfig,
    connector: Arc<dyn BrokerConnector>,
    history: Arc<HistoryBuffer>,
    broadcaster: Arc<Broadcaster>,
    metrics: Arc<RelayMetrics>,
    state: AtomicU8,
    started: AtomicBool,
    shutdown_requested: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl Relay {
    /// Create a relay for the configured topic
    pub fn new(config: RelayConfig, connector: Arc<dyn BrokerConnector>) -> Self {
        Self::with_metrics(config, connector, global_metrics())
    }

    /// Create a relay recording into the given metrics
    pub fn with_metrics(
        config: RelayConfig,
        connector: Arc<dyn BrokerConnector>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        let history = Arc::new(HistoryBuffer::new(config.history_capacity));
        let broadcaster = Arc::new(Broadcaster::with_metrics(
            config.observer_capacity,
            Arc::clone(&metrics),
        ));
        Self {
            config,
            connector,
            history,
            broadcaster,
            metrics,
            state: AtomicU8::new(RelayState::Created as u8),
            started: AtomicBool::new(false),
            shutdown_requested: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Run the consumption loop until shutdown.
    ///
    /// Returns an error for invalid configuration, connect or subscribe
    /// failure, or when the relay was already started. Each relay runs at
    /// most once; a finished relay stays [`RelayState::Closed`].
    pub async fn run(&self) -> Result<(), RelayError> {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RelayError::AlreadyRunning);
        }

        let result = self.run_inner().await;
        self.set_state(RelayState::Closed);
        match &result {
            Ok(()) => info!("Relay stopped"),
            Err(e) => error!("Relay stopped with error: {}", e),
        }
        result
    }

    async fn run_inner(&self) -> Result<(), RelayError> {
        self.config.validate()?;

        let mut consumer = self.connector.connect(&self.config).await?;
        let result = self.drive(consumer.as_mut()).await;

        // Single close site covering shutdown and subscribe failure alike
        self.set_state(RelayState::Closing);
        if let Err(e) = consumer.close().await {
            warn!("Error closing consumer: {}", e);
        }
        result
    }

    async fn drive(&self, consumer: &mut dyn BrokerConsumer) -> Result<(), RelayError> {
        consumer.subscribe(&self.config.topic).await?;
        self.set_state(RelayState::Subscribed);
        info!("Subscribed to topic '{}'", self.config.topic);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut empty_polls: u64 = 0;

        loop {
            if self.shutdown_requested.load(Ordering::SeqCst) {
                info!("Shutdown requested, stopping consumption");
                return Ok(());
            }
            self.set_state(RelayState::Polling);

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutdown requested, stopping consumption");
                    return Ok(());
                }
                polled = consumer.poll(self.config.poll_timeout) => match polled {
                    Ok(Some(record)) => {
                        self.set_state(RelayState::Handling);
                        empty_polls = 0;
                        self.handle_record(record);
                    }
                    Ok(None) => {
                        empty_polls += 1;
                        self.metrics.record_empty_poll();
                        if empty_polls % HEARTBEAT_POLLS == 0 {
                            debug!("No records for {} consecutive polls", empty_polls);
                        }
                    }
                    Err(e) => {
                        self.metrics.record_consume_error();
                        warn!("Consume error (continuing): {}", e);
                    }
                }
            }
        }
    }

    fn handle_record(&self, record: ConsumedRecord) {
        debug!(
            "Consumed {}[{}]@{}",
            record.topic, record.partition, record.offset
        );
        let message = Message::new(record.key.unwrap_or_default(), record.value);
        self.history.append(message.clone());
        self.broadcaster.broadcast(message);
        self.metrics.record_consumed();
    }

    /// Request the loop to stop.
    ///
    /// Safe to call from any task, multiple times, and before [`Relay::run`];
    /// the loop observes the request within one poll timeout.
    pub fn shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
        info!("Relay shutdown requested");
    }

    /// Attach a live observer, returning the history backfill alongside it.
    ///
    /// The observer is registered before the history snapshot is taken, so no
    /// record can fall between the two. A record handled during attachment may
    /// appear in both the backfill and the live feed.
    pub fn attach_observer(&self) -> (Vec<Message>, Observer) {
        let observer = self.broadcaster.register();
        let backfill = self.history.snapshot();
        (backfill, observer)
    }

    /// Current lifecycle state
    pub fn state(&self) -> RelayState {
        RelayState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Snapshot of the retained message history, oldest first
    pub fn history(&self) -> Vec<Message> {
        self.history.snapshot()
    }

    /// Number of currently attached observers
    pub fn observer_count(&self) -> usize {
        self.broadcaster.observer_count()
    }

    /// Snapshot of the relay's counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Wait until the relay reaches the given state, with a deadline.
    ///
    /// Returns false if the deadline passes first. Intermediate states may be
    /// skipped over between polls, so wait on the state of interest rather
    /// than on every transition.
    pub async fn wait_for_state(&self, state: RelayState, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.state() == state {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn set_state(&self, state: RelayState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}
