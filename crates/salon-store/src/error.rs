use salon_shared::types::MessageId;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// A historical page was not in strictly ascending id order.
    #[error("Historical page out of order: id {id} at index {index} does not increase")]
    InvalidOrder { index: usize, id: MessageId },

    /// A live message arrived with an id below the current maximum that
    /// is not a duplicate. The store never reorders; callers log and drop.
    #[error("Out-of-order message: id {id} is below current maximum {max}")]
    OutOfOrder { id: MessageId, max: MessageId },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
