//! # salon-client
//!
//! Room-level synchronization for one chat room view: orchestrates the
//! historical seed, the one-time mark-all-read on entry, the transport
//! session's lifetime, and the derived date/sender grouping exposed to
//! the presentation layer.

pub mod api;
pub mod room;

mod error;

pub use api::{ChatApi, HistoryPage, HttpChatApi, Upload};
pub use error::ClientError;
pub use room::RoomSession;
