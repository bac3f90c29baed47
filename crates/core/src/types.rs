//! Shared primitive types.

use std::time::{SystemTime, UNIX_EPOCH};

/// Unix timestamp in milliseconds.
pub type Timestamp = u64;

/// Current wall-clock time in Unix milliseconds.
///
/// A clock set before the epoch reads as 0 rather than failing.
pub fn current_timestamp_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
