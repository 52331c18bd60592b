use thiserror::Error;

/// Errors produced by the transport layer.
#[derive(Error, Debug)]
pub enum TransportError {
    /// A publish was attempted while the session was not connected.
    /// Reported to the caller synchronously, never queued.
    #[error("Not connected to the broker")]
    NotConnected,

    /// Failed to encode an outbound payload.
    #[error("Payload encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Broker-level connection or protocol failure.
    #[error("Broker error: {0}")]
    Broker(String),

    /// The session has been closed and accepts no further commands.
    #[error("Session closed")]
    Closed,
}
