//! Room view lifecycle: seed, one-time mark-all-read, live bridge.
//!
//! A [`RoomSession`] owns everything for one open room: the message
//! store, the transport session, and the bridge task that feeds live
//! traffic into the store and re-derives the grouped view on every
//! mutation. Changing rooms means closing this session and opening a
//! new one; nothing is mutated in place.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use salon_net::broker::{Broker, Credentials};
use salon_net::session::{spawn_session, SessionConfig, SessionHandle, SessionNotification};
use salon_shared::constants::{CHANNEL_CAPACITY, DEFAULT_PAGE_SIZE};
use salon_shared::types::{ConnectionState, CurrentUser, MessageType, RoomId, UserId};
use salon_store::{group, read_receipts, DateGroup, MessageStore};

use crate::api::ChatApi;
use crate::error::ClientError;

/// Everything owned by one open room view.
pub struct RoomSession {
    room_id: RoomId,
    user: Option<CurrentUser>,
    api: Arc<dyn ChatApi>,
    store: Arc<Mutex<MessageStore>>,
    groups_rx: watch::Receiver<Vec<DateGroup>>,
    notices_rx: Option<mpsc::Receiver<serde_json::Value>>,
    session: SessionHandle,
    bridge: JoinHandle<()>,
    /// Set once the on-entry mark-all-read has been handled for this
    /// room visit. Live traffic never re-fires it.
    initial_read_all_done: bool,
}

impl RoomSession {
    /// Open a room view with default page size and session settings.
    pub async fn open<B>(
        room_id: RoomId,
        user: Option<CurrentUser>,
        api: Arc<dyn ChatApi>,
        broker: B,
        credentials: Credentials,
    ) -> Result<Self, ClientError>
    where
        B: Broker + 'static,
    {
        let config = SessionConfig::new(room_id, credentials);
        Self::open_with(room_id, user, api, broker, config, DEFAULT_PAGE_SIZE).await
    }

    /// Open a room view.
    ///
    /// Seeds the store from one historical page, issues the one-time
    /// mark-all-read, then brings up the transport session and the
    /// notification bridge. A fetch or seed failure propagates and
    /// leaves nothing running (no partial seed).
    pub async fn open_with<B>(
        room_id: RoomId,
        user: Option<CurrentUser>,
        api: Arc<dyn ChatApi>,
        broker: B,
        session_config: SessionConfig,
        page_size: u32,
    ) -> Result<Self, ClientError>
    where
        B: Broker + 'static,
    {
        let page = api.fetch_history(room_id, 0, page_size).await?;
        let mut store = MessageStore::new();
        store.seed(page.messages)?;
        info!(room = %room_id, count = store.len(), "Room seeded from history");

        // Mark the whole page read, once per room visit. With no
        // identity or an empty page there is nothing to mark; the flag
        // is set either way so live traffic can never re-fire it.
        match (&user, store.last_id()) {
            (Some(_), Some(last_id)) => {
                if let Err(e) = api.mark_all_read(room_id, last_id).await {
                    warn!(room = %room_id, error = %e, "Mark-all-read failed");
                }
            }
            _ => {
                debug!(room = %room_id, "Nothing to mark read on entry");
            }
        }
        let initial_read_all_done = true;

        let my_id = effective_user_id(&user);
        let (groups_tx, groups_rx) = watch::channel(group(store.snapshot(), my_id));
        let store = Arc::new(Mutex::new(store));

        let (session, notif_rx) = spawn_session(broker, session_config);
        let (notice_tx, notices_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let bridge = tokio::spawn(bridge_loop(
            store.clone(),
            my_id,
            notif_rx,
            groups_tx,
            notice_tx,
        ));

        Ok(Self {
            room_id,
            user,
            api,
            store,
            groups_rx,
            notices_rx: Some(notices_rx),
            session,
            bridge,
            initial_read_all_done,
        })
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn user(&self) -> Option<&CurrentUser> {
        self.user.as_ref()
    }

    /// Whether the on-entry mark-all-read has been handled.
    pub fn initial_read_all_done(&self) -> bool {
        self.initial_read_all_done
    }

    /// Watch receiver for the current grouped view. Updated after every
    /// store mutation.
    pub fn groups(&self) -> watch::Receiver<Vec<DateGroup>> {
        self.groups_rx.clone()
    }

    /// Current grouped view.
    pub fn current_groups(&self) -> Vec<DateGroup> {
        self.groups_rx.borrow().clone()
    }

    /// Watch receiver for the connection state, for user-facing
    /// degraded-state indicators.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.session.state()
    }

    /// Take the system notice receiver. Notices never touch the store.
    pub fn take_notices(&mut self) -> Option<mpsc::Receiver<serde_json::Value>> {
        self.notices_rx.take()
    }

    /// The underlying store, shared with the bridge task.
    pub fn store(&self) -> Arc<Mutex<MessageStore>> {
        self.store.clone()
    }

    /// Send a text message. Empty content is ignored; sending while
    /// disconnected is rejected immediately, never queued.
    pub fn send(&self, content: &str) -> Result<(), ClientError> {
        if content.is_empty() {
            return Ok(());
        }
        self.session.send(content, MessageType::Text)?;
        Ok(())
    }

    /// Upload attachment bytes, then publish the resulting URL as an
    /// IMAGE or FILE message depending on the MIME type.
    pub async fn send_attachment(&self, bytes: Vec<u8>, mime: &str) -> Result<(), ClientError> {
        // reject before uploading; there is no offline outbox
        if *self.session.state().borrow() != ConnectionState::Connected {
            return Err(salon_net::TransportError::NotConnected.into());
        }

        let kind = MessageType::for_mime(mime);
        let upload = self.api.upload_attachment(bytes, mime).await?;
        self.session.send(&upload.url, kind)?;
        Ok(())
    }

    /// Tear the room view down: close the transport session and stop the
    /// bridge so no mutation lands after teardown. Safe to call more
    /// than once.
    pub async fn close(&self) {
        self.session.close().await;
        self.bridge.abort();
        info!(room = %self.room_id, "Room session closed");
    }
}

fn effective_user_id(user: &Option<CurrentUser>) -> UserId {
    // with no identity, no run is "mine"
    user.as_ref().map(|u| u.id).unwrap_or(UserId(i64::MIN))
}

/// Feed session notifications into the store and re-derive the grouped
/// view after every mutation.
async fn bridge_loop(
    store: Arc<Mutex<MessageStore>>,
    my_id: UserId,
    mut notif_rx: mpsc::Receiver<SessionNotification>,
    groups_tx: watch::Sender<Vec<DateGroup>>,
    notice_tx: mpsc::Sender<serde_json::Value>,
) {
    while let Some(notification) = notif_rx.recv().await {
        match notification {
            SessionNotification::MessageReceived(msg) => {
                apply_to_store(&store, &groups_tx, my_id, |store| {
                    if let Err(e) = store.append(msg) {
                        // out-of-order policy: log and drop, never reorder
                        warn!(error = %e, "Dropping live message");
                    }
                });
            }

            SessionNotification::ReadEventReceived(event) => {
                apply_to_store(&store, &groups_tx, my_id, |store| {
                    read_receipts::apply(&event, store);
                });
            }

            SessionNotification::SystemNotice(notice) => {
                debug!("System notice received");
                let _ = notice_tx.send(notice).await;
            }

            SessionNotification::StateChanged(state) => {
                debug!(state = ?state, "Session state changed");
            }
        }
    }

    debug!("Room bridge loop ended");
}

fn apply_to_store<F>(
    store: &Arc<Mutex<MessageStore>>,
    groups_tx: &watch::Sender<Vec<DateGroup>>,
    my_id: UserId,
    mutate: F,
) where
    F: FnOnce(&mut MessageStore),
{
    let groups = {
        let mut guard = match store.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        mutate(&mut guard);
        group(guard.snapshot(), my_id)
    };
    groups_tx.send_replace(groups);
}
