//! Wall-clock helpers (unix milliseconds)

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current time in unix milliseconds
pub fn now_millis() -> u64 {
    to_millis(SystemTime::now())
}

/// Convert a `SystemTime` to unix milliseconds (clamped at the epoch)
pub fn to_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}
