use std::time::Duration;

/// Historical page size requested when a room view opens
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Bidirectional keepalive interval on the broker connection
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(4);

/// Missed-heartbeat multiplier before a silent connection is declared dead
pub const LIVENESS_GRACE: u32 = 3;

/// Capacity of the session command and notification channels
pub const CHANNEL_CAPACITY: usize = 256;

/// Reconnect backoff: first delay after an unexpected drop
pub const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Reconnect backoff: upper bound on the delay between attempts
pub const BACKOFF_CAP: Duration = Duration::from_secs(30);
