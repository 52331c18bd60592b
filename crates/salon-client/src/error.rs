use thiserror::Error;

use salon_net::TransportError;
use salon_store::StoreError;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Malformed server payload (schema mismatch).
    #[error("Payload validation error: {0}")]
    Validation(#[from] serde_json::Error),

    /// Request or connection failure against the REST API.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
