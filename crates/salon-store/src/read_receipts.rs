//! Reconciliation of read-receipt events against the store.
//!
//! Individual events name one message; bulk events cover the open-closed
//! id range `(old, new]` so a returning participant can acknowledge an
//! arbitrary backlog with a single event.

use tracing::debug;

use salon_shared::protocol::ReadReceiptEvent;
use salon_shared::types::MessageId;

use crate::store::MessageStore;

/// Apply one read-receipt event to the store.
///
/// Increments are unconditional per event received: the wire carries no
/// reader identity, so a redelivered individual event double-counts. The
/// server is the authority that deduplicates physical reads.
pub fn apply(event: &ReadReceiptEvent, store: &mut MessageStore) {
    match *event {
        ReadReceiptEvent::Individual { message_id } => {
            store.apply_read_count(message_id, 1);
        }
        ReadReceiptEvent::Bulk {
            old_last_read_message_id: old,
            new_last_read_message_id: new,
        } => {
            if new <= old {
                debug!(old = %old, new = %new, "Empty bulk read range, skipping");
                return;
            }

            let covered: Vec<MessageId> = store
                .snapshot()
                .iter()
                .map(|m| m.id)
                .filter(|id| *id > old && *id <= new)
                .collect();

            debug!(old = %old, new = %new, count = covered.len(), "Applying bulk read");
            for id in covered {
                store.apply_read_count(id, 1);
            }
        }
    }
}
