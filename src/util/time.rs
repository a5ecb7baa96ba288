//! Time utilities for the arena loops

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Rate at which clients are expected to report their own state
pub const CLIENT_STATE_HZ: u32 = 20;
/// Merged-state broadcast rate
pub const STATE_TICK_HZ: u32 = 20;
/// Full snapshot correction rate
pub const SNAPSHOT_HZ: u32 = 2;
/// Bot AI update rate
pub const BOT_TICK_HZ: u32 = 20;

/// Idle reaper sweep period
pub const REAP_INTERVAL: Duration = Duration::from_secs(10);
/// Expired shot id sweep period
pub const SHOT_SWEEP_INTERVAL: Duration = Duration::from_secs(2);
/// Time a fresh connection has to send `hello`
pub const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// Period of a loop running at `hz`
pub fn period(hz: u32) -> Duration {
    Duration::from_micros(1_000_000 / hz.max(1) as u64)
}

/// Delta time of one bot tick (in seconds)
pub fn bot_tick_delta() -> f64 {
    1.0 / BOT_TICK_HZ as f64
}

/// Smallest accepted gap between two `state` messages of one client.
/// Slightly below the nominal interval so jitter at the boundary is not dropped.
pub fn min_state_interval_ms() -> f64 {
    1000.0 / CLIENT_STATE_HZ as f64 * 0.75
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_periods() {
        assert_eq!(period(STATE_TICK_HZ), Duration::from_millis(50));
        assert_eq!(period(SNAPSHOT_HZ), Duration::from_millis(500));
        assert_eq!(period(0), Duration::from_secs(1));
    }

    #[test]
    fn test_min_state_interval() {
        assert!((min_state_interval_ms() - 37.5).abs() < f64::EPSILON);
    }
}
