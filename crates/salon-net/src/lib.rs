// Transport session layer over an abstract reliable pub/sub broker.

pub mod backoff;
pub mod broker;
pub mod session;

mod error;

pub use backoff::Backoff;
pub use broker::{Broker, BrokerConnection, BrokerEvent, Credentials, MemoryBroker};
pub use error::TransportError;
pub use session::{spawn_session, SessionConfig, SessionHandle, SessionNotification};
