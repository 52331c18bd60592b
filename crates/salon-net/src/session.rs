//! Transport session state machine with the tokio mpsc command /
//! notification pattern.
//!
//! The session event loop runs in a dedicated tokio task. External code
//! talks to it through a [`SessionHandle`] and receives inbound traffic
//! on a typed notification channel. Unexpected drops cycle the session
//! back through CONNECTING under a backoff policy; only an explicit
//! close is terminal.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use salon_shared::constants::{
    BACKOFF_BASE, BACKOFF_CAP, CHANNEL_CAPACITY, HEARTBEAT_INTERVAL, LIVENESS_GRACE,
};
use salon_shared::protocol::{Message, OutboundMessage, ReadAck, ReadReceiptEvent};
use salon_shared::types::{ConnectionState, MessageType, RoomId};

use crate::backoff::Backoff;
use crate::broker::{Broker, BrokerConnection, BrokerEvent, Credentials};
use crate::error::TransportError;

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the session task.
#[derive(Debug)]
enum SessionCommand {
    /// Publish a pre-encoded payload on a broker channel.
    Publish { channel: String, payload: Vec<u8> },
    /// Tear the session down for good.
    Close,
}

/// Notifications sent *from* the session task to the application.
#[derive(Debug, Clone)]
pub enum SessionNotification {
    /// The connection state changed.
    StateChanged(ConnectionState),
    /// A chat message arrived on the room's message topic.
    MessageReceived(Message),
    /// A read-receipt event arrived on the room's read topic.
    ReadEventReceived(ReadReceiptEvent),
    /// A system notice arrived. Schema is not contractual; passed through.
    SystemNotice(serde_json::Value),
}

/// Configuration for spawning a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub room_id: RoomId,
    pub credentials: Credentials,
    /// Expected keepalive interval on the connection.
    pub heartbeat: Duration,
    /// Multiples of `heartbeat` without traffic before the connection is
    /// declared silently dead.
    pub liveness_grace: u32,
    /// Automatically acknowledge every inbound chat message as read
    /// (continuous-presence policy for the active viewer).
    pub auto_ack: bool,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl SessionConfig {
    pub fn new(room_id: RoomId, credentials: Credentials) -> Self {
        Self {
            room_id,
            credentials,
            heartbeat: HEARTBEAT_INTERVAL,
            liveness_grace: LIVENESS_GRACE,
            auto_ack: true,
            backoff_base: BACKOFF_BASE,
            backoff_cap: BACKOFF_CAP,
        }
    }
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    room_id: RoomId,
    cmd_tx: mpsc::Sender<SessionCommand>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl SessionHandle {
    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch receiver for connection-state indicators.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Publish an outbound message. Fire-and-forget: the authoritative
    /// copy comes back as an inbound echo with the server-assigned id.
    ///
    /// Rejected synchronously with [`TransportError::NotConnected`] while
    /// the session is not connected; nothing is queued for later.
    pub fn send(&self, content: &str, message_type: MessageType) -> Result<(), TransportError> {
        if self.connection_state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }

        let payload = OutboundMessage {
            room_id: self.room_id,
            content: content.to_string(),
            message_type,
        }
        .to_bytes()?;

        self.cmd_tx
            .try_send(SessionCommand::Publish {
                channel: self.room_id.publish_destination(),
                payload,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    TransportError::Broker("command queue full".to_string())
                }
                mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
            })
    }

    /// Tear the session down. Safe to call any number of times.
    pub async fn close(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Close).await;
    }
}

/// Spawn the session event loop in a background tokio task.
///
/// Returns the control handle and the notification receiver.
pub fn spawn_session<B: Broker + 'static>(
    broker: B,
    config: SessionConfig,
) -> (SessionHandle, mpsc::Receiver<SessionNotification>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (notif_tx, notif_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

    let handle = SessionHandle {
        room_id: config.room_id,
        cmd_tx,
        state_rx,
    };

    tokio::spawn(run_session(broker, config, cmd_rx, notif_tx, state_tx));

    (handle, notif_rx)
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

struct RoomTopics {
    messages: String,
    system: String,
    reads: String,
    read_destination: String,
}

impl RoomTopics {
    fn new(room_id: RoomId) -> Self {
        Self {
            messages: room_id.messages_topic(),
            system: room_id.system_topic(),
            reads: room_id.reads_topic(),
            read_destination: room_id.read_destination(),
        }
    }
}

async fn run_session<B: Broker>(
    broker: B,
    config: SessionConfig,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    notif_tx: mpsc::Sender<SessionNotification>,
    state_tx: watch::Sender<ConnectionState>,
) {
    let topics = RoomTopics::new(config.room_id);
    let mut backoff = Backoff::new(config.backoff_base, config.backoff_cap);
    let liveness = config.heartbeat * config.liveness_grace;

    'connect: loop {
        set_state(&state_tx, &notif_tx, ConnectionState::Connecting).await;

        let mut conn = match broker.connect(&config.credentials).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(room = %config.room_id, error = %e, "Broker connect failed");
                set_state(&state_tx, &notif_tx, ConnectionState::Disconnected).await;
                if wait_before_reconnect(&mut cmd_rx, backoff.next_delay()).await {
                    continue 'connect;
                }
                break 'connect;
            }
        };

        // Subscribe the room's three channels; only then is the session
        // ready to publish.
        let mut subscribed = true;
        for channel in [&topics.messages, &topics.system, &topics.reads] {
            if let Err(e) = conn.subscribe(channel).await {
                warn!(channel = %channel, error = %e, "Subscribe failed");
                subscribed = false;
                break;
            }
        }
        if !subscribed {
            conn.close().await;
            set_state(&state_tx, &notif_tx, ConnectionState::Disconnected).await;
            if wait_before_reconnect(&mut cmd_rx, backoff.next_delay()).await {
                continue 'connect;
            }
            break 'connect;
        }

        backoff.reset();
        set_state(&state_tx, &notif_tx, ConnectionState::Connected).await;
        info!(room = %config.room_id, "Session connected");

        // Connected loop. Any broker-side failure falls through to the
        // reconnect path below; only Close (or all handles dropped) exits.
        loop {
            let deadline = tokio::time::sleep(liveness);
            tokio::pin!(deadline);

            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(SessionCommand::Publish { channel, payload }) => {
                        if let Err(e) = conn.publish(&channel, payload).await {
                            warn!(channel = %channel, error = %e, "Publish failed, reconnecting");
                            break;
                        }
                    }
                    Some(SessionCommand::Close) | None => {
                        info!(room = %config.room_id, "Session close requested");
                        conn.close().await;
                        set_state(&state_tx, &notif_tx, ConnectionState::Disconnected).await;
                        break 'connect;
                    }
                },

                event = conn.recv() => match event {
                    Some(BrokerEvent::Frame { channel, payload }) => {
                        handle_frame(&config, &topics, conn.as_mut(), &notif_tx, &channel, &payload)
                            .await;
                    }
                    Some(BrokerEvent::Heartbeat) => {
                        debug!(room = %config.room_id, "Heartbeat");
                    }
                    Some(BrokerEvent::Closed { reason }) => {
                        warn!(room = %config.room_id, reason = %reason, "Connection dropped");
                        break;
                    }
                    None => {
                        warn!(room = %config.room_id, "Connection ended");
                        break;
                    }
                },

                _ = &mut deadline => {
                    warn!(
                        room = %config.room_id,
                        grace = ?liveness,
                        "No traffic within liveness window, reconnecting"
                    );
                    conn.close().await;
                    break;
                }
            }
        }

        // Unexpected drop: back off, then cycle to CONNECTING.
        set_state(&state_tx, &notif_tx, ConnectionState::Disconnected).await;
        if !wait_before_reconnect(&mut cmd_rx, backoff.next_delay()).await {
            break 'connect;
        }
    }

    info!(room = %config.room_id, "Session event loop terminated");
}

/// Route one inbound frame. A malformed payload is logged and dropped;
/// it never tears down the session.
async fn handle_frame(
    config: &SessionConfig,
    topics: &RoomTopics,
    conn: &mut dyn BrokerConnection,
    notif_tx: &mpsc::Sender<SessionNotification>,
    channel: &str,
    payload: &[u8],
) {
    if channel == topics.messages {
        let msg = match Message::from_bytes(payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Malformed chat message frame, dropping");
                return;
            }
        };

        debug!(id = %msg.id, sender = %msg.sender_id, "Chat message received");
        let message_id = msg.id;
        let _ = notif_tx
            .send(SessionNotification::MessageReceived(msg))
            .await;

        // Active-viewer auto-read: acknowledge each inbound message.
        if config.auto_ack {
            match (ReadAck { message_id }).to_bytes() {
                Ok(bytes) => {
                    if let Err(e) = conn.publish(&topics.read_destination, bytes).await {
                        warn!(id = %message_id, error = %e, "Read ack publish failed");
                    }
                }
                Err(e) => warn!(error = %e, "Read ack encoding failed"),
            }
        }
    } else if channel == topics.reads {
        match ReadReceiptEvent::from_bytes(payload) {
            Ok(event) => {
                let _ = notif_tx
                    .send(SessionNotification::ReadEventReceived(event))
                    .await;
            }
            Err(e) => warn!(error = %e, "Malformed read event frame, dropping"),
        }
    } else if channel == topics.system {
        match serde_json::from_slice::<serde_json::Value>(payload) {
            Ok(notice) => {
                let _ = notif_tx.send(SessionNotification::SystemNotice(notice)).await;
            }
            Err(e) => warn!(error = %e, "Malformed system notice, dropping"),
        }
    } else {
        debug!(channel = %channel, "Frame on unexpected channel, ignoring");
    }
}

/// Sleep out a backoff delay while still honoring close requests.
/// Returns `false` if the session should terminate instead of retrying.
async fn wait_before_reconnect(
    cmd_rx: &mut mpsc::Receiver<SessionCommand>,
    delay: Duration,
) -> bool {
    debug!(delay = ?delay, "Waiting before reconnect");
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = cmd_rx.recv() => match cmd {
                Some(SessionCommand::Close) | None => return false,
                Some(SessionCommand::Publish { channel, .. }) => {
                    warn!(channel = %channel, "Dropping publish while disconnected");
                }
            },
        }
    }
}

async fn set_state(
    state_tx: &watch::Sender<ConnectionState>,
    notif_tx: &mpsc::Sender<SessionNotification>,
    state: ConnectionState,
) {
    let previous = state_tx.send_replace(state);
    if previous != state {
        let _ = notif_tx
            .send(SessionNotification::StateChanged(state))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use salon_shared::types::{MessageId, UserId};

    use crate::broker::MemoryBroker;

    fn config(room: i64) -> SessionConfig {
        SessionConfig::new(
            RoomId(room),
            Credentials {
                token: "test-token".to_string(),
            },
        )
    }

    fn inbound_message(id: i64) -> Vec<u8> {
        serde_json::to_vec(&Message {
            id: MessageId(id),
            sender_id: UserId(2),
            sender_name: "benoit".into(),
            content: format!("message {id}"),
            message_type: MessageType::Text,
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            read_count: 0,
        })
        .unwrap()
    }

    async fn wait_for_state(
        notif_rx: &mut mpsc::Receiver<SessionNotification>,
        wanted: ConnectionState,
    ) {
        while let Some(notification) = notif_rx.recv().await {
            if let SessionNotification::StateChanged(state) = notification {
                if state == wanted {
                    return;
                }
            }
        }
        panic!("notification channel closed before reaching {wanted:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_and_subscribes_room_channels() {
        let broker = MemoryBroker::new();
        let (handle, mut notif_rx) = spawn_session(broker.clone(), config(42));

        wait_for_state(&mut notif_rx, ConnectionState::Connected).await;
        assert_eq!(handle.connection_state(), ConnectionState::Connected);
        assert_eq!(
            broker.subscriptions(),
            vec![
                "/topic/chats/rooms/42".to_string(),
                "/topic/chats/rooms/42/read".to_string(),
                "/topic/chats/rooms/42/system".to_string(),
            ]
        );

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_publishes_outbound_envelope() {
        let broker = MemoryBroker::new();
        let (handle, mut notif_rx) = spawn_session(broker.clone(), config(7));
        wait_for_state(&mut notif_rx, ConnectionState::Connected).await;

        handle.send("bonjour", MessageType::Text).unwrap();

        // paused clock: sleeping runs every ready task before advancing
        tokio::time::sleep(Duration::from_millis(1)).await;

        let published = broker.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "/app/chats/rooms/7");
        let value: serde_json::Value = serde_json::from_slice(&published[0].1).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "roomId": 7, "content": "bonjour", "type": "TEXT" })
        );

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_disconnected_is_rejected() {
        let broker = MemoryBroker::new();
        broker.fail_next_connects(100);
        let (handle, _notif_rx) = spawn_session(broker, config(7));

        let err = handle.send("hello", MessageType::Text).unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_message_notifies_and_auto_acks() {
        let broker = MemoryBroker::new();
        let (handle, mut notif_rx) = spawn_session(broker.clone(), config(42));
        wait_for_state(&mut notif_rx, ConnectionState::Connected).await;

        broker.inject("/topic/chats/rooms/42", inbound_message(11));

        match notif_rx.recv().await {
            Some(SessionNotification::MessageReceived(msg)) => {
                assert_eq!(msg.id, MessageId(11));
            }
            other => panic!("unexpected notification: {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(1)).await;
        let published = broker.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "/app/chats/rooms/42/read");
        let ack: serde_json::Value = serde_json::from_slice(&published[0].1).unwrap();
        assert_eq!(ack, serde_json::json!({ "messageId": 11 }));

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_ack_can_be_disabled() {
        let broker = MemoryBroker::new();
        let mut cfg = config(42);
        cfg.auto_ack = false;
        let (handle, mut notif_rx) = spawn_session(broker.clone(), cfg);
        wait_for_state(&mut notif_rx, ConnectionState::Connected).await;

        broker.inject("/topic/chats/rooms/42", inbound_message(11));
        assert!(matches!(
            notif_rx.recv().await,
            Some(SessionNotification::MessageReceived(_))
        ));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(broker.published().is_empty());

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_does_not_tear_down_session() {
        let broker = MemoryBroker::new();
        let (handle, mut notif_rx) = spawn_session(broker.clone(), config(42));
        wait_for_state(&mut notif_rx, ConnectionState::Connected).await;

        broker.inject("/topic/chats/rooms/42", b"not json".to_vec());
        broker.inject("/topic/chats/rooms/42/read", b"{\"type\":\"BOGUS\"}".to_vec());
        broker.inject("/topic/chats/rooms/42", inbound_message(3));

        // the only notification is for the well-formed message
        match notif_rx.recv().await {
            Some(SessionNotification::MessageReceived(msg)) => {
                assert_eq!(msg.id, MessageId(3));
            }
            other => panic!("unexpected notification: {other:?}"),
        }
        assert_eq!(handle.connection_state(), ConnectionState::Connected);

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_event_and_system_notice_routing() {
        let broker = MemoryBroker::new();
        let (handle, mut notif_rx) = spawn_session(broker.clone(), config(42));
        wait_for_state(&mut notif_rx, ConnectionState::Connected).await;

        broker.inject(
            "/topic/chats/rooms/42/read",
            br#"{"type":"MESSAGE_READ","messageId":5}"#.to_vec(),
        );
        broker.inject(
            "/topic/chats/rooms/42/system",
            br#"{"notice":"user joined"}"#.to_vec(),
        );

        assert!(matches!(
            notif_rx.recv().await,
            Some(SessionNotification::ReadEventReceived(
                ReadReceiptEvent::Individual {
                    message_id: MessageId(5)
                }
            ))
        ));
        assert!(matches!(
            notif_rx.recv().await,
            Some(SessionNotification::SystemNotice(_))
        ));

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_unexpected_drop() {
        let broker = MemoryBroker::new();
        let (handle, mut notif_rx) = spawn_session(broker.clone(), config(42));
        wait_for_state(&mut notif_rx, ConnectionState::Connected).await;
        assert_eq!(broker.connect_attempts(), 1);

        broker.drop_connections();

        // cycles through Disconnected and Connecting back to Connected
        wait_for_state(&mut notif_rx, ConnectionState::Disconnected).await;
        wait_for_state(&mut notif_rx, ConnectionState::Connected).await;
        assert!(broker.connect_attempts() >= 2);

        // the new connection carries the room subscriptions again
        broker.inject("/topic/chats/rooms/42", inbound_message(1));
        assert!(matches!(
            notif_rx.recv().await,
            Some(SessionNotification::MessageReceived(_))
        ));

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failures_back_off_then_recover() {
        let broker = MemoryBroker::new();
        broker.fail_next_connects(3);
        let (handle, mut notif_rx) = spawn_session(broker.clone(), config(42));

        wait_for_state(&mut notif_rx, ConnectionState::Connected).await;
        assert_eq!(broker.connect_attempts(), 4);

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let broker = MemoryBroker::new();
        let (handle, mut notif_rx) = spawn_session(broker.clone(), config(42));
        wait_for_state(&mut notif_rx, ConnectionState::Connected).await;

        handle.close().await;
        wait_for_state(&mut notif_rx, ConnectionState::Disconnected).await;
        handle.close().await;
        handle.close().await;

        assert_eq!(handle.connection_state(), ConnectionState::Disconnected);
        assert!(matches!(
            handle.send("late", MessageType::Text),
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_connection_is_recycled() {
        let broker = MemoryBroker::new();
        let (handle, mut notif_rx) = spawn_session(broker.clone(), config(42));
        wait_for_state(&mut notif_rx, ConnectionState::Connected).await;

        // no traffic at all: the liveness deadline forces a reconnect
        wait_for_state(&mut notif_rx, ConnectionState::Disconnected).await;
        wait_for_state(&mut notif_rx, ConnectionState::Connected).await;
        assert!(broker.connect_attempts() >= 2);

        handle.close().await;
    }
}
