//! Ordered, deduplicated message sequence for one room.
//!
//! Ids are assigned by the server and define the canonical order; the
//! store never reorders and never removes an admitted message. Every
//! successful mutation bumps a watch revision so observers know a fresh
//! snapshot is available.

use tokio::sync::watch;
use tracing::debug;

use salon_shared::protocol::Message;
use salon_shared::types::MessageId;

use crate::error::{Result, StoreError};

/// Single source of truth for a room's messages.
pub struct MessageStore {
    messages: Vec<Message>,
    revision: watch::Sender<u64>,
}

impl MessageStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            messages: Vec::new(),
            revision,
        }
    }

    /// Subscribe to change notifications. The value is a revision counter
    /// bumped on every successful mutation; subscribers re-read
    /// [`snapshot`](Self::snapshot) when it changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Replace the store's contents with a historical page.
    ///
    /// The page must already be in strictly ascending id order; a
    /// violation leaves the store untouched and returns
    /// [`StoreError::InvalidOrder`].
    pub fn seed(&mut self, page: Vec<Message>) -> Result<()> {
        for (index, pair) in page.windows(2).enumerate() {
            if pair[1].id <= pair[0].id {
                return Err(StoreError::InvalidOrder {
                    index: index + 1,
                    id: pair[1].id,
                });
            }
        }

        debug!(count = page.len(), "Seeding store from historical page");
        self.messages = page;
        self.bump();
        Ok(())
    }

    /// Append a live message at the tail.
    ///
    /// A duplicate id is a no-op (duplicate delivery guard). An id below
    /// the current maximum that is not present returns
    /// [`StoreError::OutOfOrder`] and leaves the store unchanged.
    pub fn append(&mut self, msg: Message) -> Result<()> {
        match self.last_id() {
            Some(max) if msg.id <= max => {
                if self.index_of(msg.id).is_some() {
                    debug!(id = %msg.id, "Dropping duplicate message");
                    Ok(())
                } else {
                    Err(StoreError::OutOfOrder { id: msg.id, max })
                }
            }
            _ => {
                self.messages.push(msg);
                self.bump();
                Ok(())
            }
        }
    }

    /// Increment a message's read counter. A receipt for an id the client
    /// has not loaded is a safe no-op.
    pub fn apply_read_count(&mut self, id: MessageId, delta: u32) {
        match self.index_of(id) {
            Some(index) => {
                self.messages[index].read_count += delta;
                self.bump();
            }
            None => {
                debug!(id = %id, "Read count for unknown message, skipping");
            }
        }
    }

    /// Current ordered sequence (read-only view).
    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    /// Id of the newest admitted message, if any.
    pub fn last_id(&self) -> Option<MessageId> {
        self.messages.last().map(|m| m.id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn index_of(&self, id: MessageId) -> Option<usize> {
        self.messages.binary_search_by_key(&id, |m| m.id).ok()
    }

    fn bump(&mut self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}
