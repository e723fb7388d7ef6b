//! Error types for the relay library

/// Main error type for relay operations
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Invalid input to a publish call
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// The broker rejected or failed to acknowledge a published message
    #[error("Failed to deliver message: {reason}")]
    Delivery { reason: String },

    /// Pending sends were not confirmed within the flush bound
    #[error("Flush timed out after {timeout_ms}ms")]
    FlushTimeout { timeout_ms: u64 },

    /// Transient broker/consume failure, recovered by continuing the poll loop
    #[error("Consume error: {message}")]
    Consume { message: String },

    /// Missing or invalid broker address, credentials, or group identity
    #[error("Startup configuration error: {message}")]
    StartupConfig { message: String },

    /// A single observer failed to receive a push
    #[error("Observer delivery error: {message}")]
    ObserverDelivery { message: String },

    /// The consumption loop was started a second time
    #[error("Relay is already running")]
    AlreadyRunning,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new delivery error
    pub fn delivery<S: Into<String>>(reason: S) -> Self {
        Self::Delivery {
            reason: reason.into(),
        }
    }

    /// Create a flush timeout error
    pub fn flush_timeout(timeout_ms: u64) -> Self {
        Self::FlushTimeout { timeout_ms }
    }

    /// Create a new consume error
    pub fn consume<S: Into<String>>(message: S) -> Self {
        Self::Consume {
            message: message.into(),
        }
    }

    /// Create a new startup configuration error
    pub fn startup_config<S: Into<String>>(message: S) -> Self {
        Self::StartupConfig {
            message: message.into(),
        }
    }

    /// Create a new observer delivery error
    pub fn observer_delivery<S: Into<String>>(message: S) -> Self {
        Self::ObserverDelivery {
            message: message.into(),
        }
    }

    /// Check if this error is a publish input validation failure
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Check if this error is recoverable by continuing to poll
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Consume { .. } | Self::ObserverDelivery { .. } | Self::Io(_)
        )
    }

    /// Check if this error prevents the consumption loop from running
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StartupConfig { .. } | Self::AlreadyRunning)
    }

    /// Check if this error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::FlushTimeout { .. })
    }
}
