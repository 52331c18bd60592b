//! Abstract pub/sub broker seam.
//!
//! The engine treats the realtime transport as a reliable, ordered
//! pub/sub primitive: connect with credentials, subscribe to channels,
//! publish payloads, receive events. Wire framing and authentication
//! token acquisition live behind this trait.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TransportError;

/// Credentials presented during the connection handshake.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Bearer token obtained by the auth collaborator.
    pub token: String,
}

/// Event surfaced by an established broker connection.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// A frame delivered on a subscribed channel.
    Frame { channel: String, payload: Vec<u8> },
    /// A keepalive from the broker. Carries no data; refreshes liveness.
    Heartbeat,
    /// The connection dropped unexpectedly.
    Closed { reason: String },
}

/// Factory for broker connections.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn BrokerConnection>, TransportError>;
}

/// One established, ordered connection to the broker.
#[async_trait]
pub trait BrokerConnection: Send {
    async fn subscribe(&mut self, channel: &str) -> Result<(), TransportError>;

    async fn publish(&mut self, channel: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Next inbound event; `None` once the connection is finished.
    async fn recv(&mut self) -> Option<BrokerEvent>;

    async fn close(&mut self);
}

// ---------------------------------------------------------------------------
// In-process loopback broker
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Hub {
    next_id: u64,
    connections: HashMap<u64, ConnectionEntry>,
    published: Vec<(String, Vec<u8>)>,
    connect_attempts: usize,
    failing_connects: usize,
}

struct ConnectionEntry {
    subscriptions: HashSet<String>,
    tx: mpsc::UnboundedSender<BrokerEvent>,
}

/// In-process broker backed by tokio channels.
///
/// Frames injected through the handle are fanned out to every connection
/// subscribed to the channel, and publishes are recorded for inspection,
/// which is what the session and room tests drive their scenarios with.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a frame to every connection subscribed to `channel`.
    pub fn inject(&self, channel: &str, payload: Vec<u8>) {
        let hub = match self.hub.lock() {
            Ok(hub) => hub,
            Err(_) => return,
        };
        for entry in hub.connections.values() {
            if entry.subscriptions.contains(channel) {
                let _ = entry.tx.send(BrokerEvent::Frame {
                    channel: channel.to_string(),
                    payload: payload.clone(),
                });
            }
        }
    }

    /// Simulate an unexpected server-side drop of every connection.
    pub fn drop_connections(&self) {
        let mut hub = match self.hub.lock() {
            Ok(hub) => hub,
            Err(_) => return,
        };
        for entry in hub.connections.values() {
            let _ = entry.tx.send(BrokerEvent::Closed {
                reason: "simulated drop".to_string(),
            });
        }
        hub.connections.clear();
    }

    /// Make the next `n` connection attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        if let Ok(mut hub) = self.hub.lock() {
            hub.failing_connects = n;
        }
    }

    /// Every payload published so far, in order, with its channel.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.hub
            .lock()
            .map(|hub| hub.published.clone())
            .unwrap_or_default()
    }

    /// Total connection attempts, including failed ones.
    pub fn connect_attempts(&self) -> usize {
        self.hub
            .lock()
            .map(|hub| hub.connect_attempts)
            .unwrap_or_default()
    }

    /// Channels currently subscribed across live connections.
    pub fn subscriptions(&self) -> Vec<String> {
        let hub = match self.hub.lock() {
            Ok(hub) => hub,
            Err(_) => return Vec::new(),
        };
        let mut channels: Vec<String> = hub
            .connections
            .values()
            .flat_map(|entry| entry.subscriptions.iter().cloned())
            .collect();
        channels.sort();
        channels
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(
        &self,
        _credentials: &Credentials,
    ) -> Result<Box<dyn BrokerConnection>, TransportError> {
        let mut hub = self
            .hub
            .lock()
            .map_err(|_| TransportError::Broker("hub lock poisoned".to_string()))?;
        hub.connect_attempts += 1;

        if hub.failing_connects > 0 {
            hub.failing_connects -= 1;
            return Err(TransportError::Broker("connection refused".to_string()));
        }

        let id = hub.next_id;
        hub.next_id += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        hub.connections.insert(
            id,
            ConnectionEntry {
                subscriptions: HashSet::new(),
                tx,
            },
        );
        debug!(id, "Memory broker connection established");

        Ok(Box::new(MemoryConnection {
            id,
            hub: self.hub.clone(),
            rx,
        }))
    }
}

struct MemoryConnection {
    id: u64,
    hub: Arc<Mutex<Hub>>,
    rx: mpsc::UnboundedReceiver<BrokerEvent>,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn subscribe(&mut self, channel: &str) -> Result<(), TransportError> {
        let mut hub = self
            .hub
            .lock()
            .map_err(|_| TransportError::Broker("hub lock poisoned".to_string()))?;
        match hub.connections.get_mut(&self.id) {
            Some(entry) => {
                entry.subscriptions.insert(channel.to_string());
                Ok(())
            }
            None => Err(TransportError::Broker("connection dropped".to_string())),
        }
    }

    async fn publish(&mut self, channel: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut hub = self
            .hub
            .lock()
            .map_err(|_| TransportError::Broker("hub lock poisoned".to_string()))?;
        if !hub.connections.contains_key(&self.id) {
            return Err(TransportError::Broker("connection dropped".to_string()));
        }
        hub.published.push((channel.to_string(), payload));
        Ok(())
    }

    async fn recv(&mut self) -> Option<BrokerEvent> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        if let Ok(mut hub) = self.hub.lock() {
            hub.connections.remove(&self.id);
        }
        self.rx.close();
    }
}
