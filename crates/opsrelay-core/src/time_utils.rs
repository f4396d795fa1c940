use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds since the Unix epoch; zero if the clock is before it.
pub fn current_unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(duration_to_ms)
        .unwrap_or_default()
}

/// Session expiry check. The expiry instant itself still counts as live.
pub fn is_within_expiry(expires_unix_ms: u64, now_unix_ms: u64) -> bool {
    now_unix_ms <= expires_unix_ms
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
