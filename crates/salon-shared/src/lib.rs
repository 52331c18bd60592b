//! # salon-shared
//!
//! Domain types and wire protocol for the Salon chat synchronization
//! engine.
//!
//! Everything the server sends or accepts is defined here with
//! schema-exact serde shapes, so the store, transport, and client crates
//! all agree on what travels over the wire.

pub mod constants;
pub mod protocol;
pub mod types;

pub use protocol::{Message, OutboundMessage, ReadAck, ReadReceiptEvent};
pub use types::{ConnectionState, CurrentUser, MessageId, MessageType, RoomId, UserId};
