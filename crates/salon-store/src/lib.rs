//! # salon-store
//!
//! In-memory message state for a single chat room.
//!
//! The [`MessageStore`] is the single source of truth: an ordered,
//! deduplicated sequence of messages keyed by server-assigned id. The
//! `grouping` module derives the render-ready date/sender structure from a
//! store snapshot, and `read_receipts` reconciles incoming read events
//! against per-message read counters.

pub mod grouping;
pub mod read_receipts;
pub mod store;

mod error;

pub use error::StoreError;
pub use grouping::{group, DateGroup, GroupMessage};
pub use store::MessageStore;
