//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::util::time::min_state_interval_ms;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Process-wide websocket upgrade limit
pub const UPGRADE_RATE_LIMIT: u32 = 20; // Max 20 new connections per second

/// Inbound message window length
pub const MESSAGE_WINDOW_MS: u64 = 10_000;

/// Messages a session may send per window
pub const MESSAGE_WINDOW_MAX: u32 = 1200;

/// Fixed-window message counter for one session.
///
/// The window restarts once more than `window_ms` has passed since it began;
/// every admitted or rejected message counts.
#[derive(Debug, Clone)]
pub struct MessageBucket {
    window_ms: u64,
    max: u32,
    window_start: u64,
    count: u32,
}

impl MessageBucket {
    pub fn new(window_ms: u64, max: u32, now: u64) -> Self {
        Self {
            window_ms,
            max,
            window_start: now,
            count: 0,
        }
    }

    /// Bucket with the default session limits
    pub fn for_session(now: u64) -> Self {
        Self::new(MESSAGE_WINDOW_MS, MESSAGE_WINDOW_MAX, now)
    }

    /// Count one message, returns false once the window is exhausted
    pub fn admit(&mut self, now: u64) -> bool {
        if now.saturating_sub(self.window_start) > self.window_ms {
            self.window_start = now;
            self.count = 0;
        }
        self.count = self.count.saturating_add(1);
        self.count <= self.max
    }
}

/// Minimum-gap filter for positional updates
#[derive(Debug, Clone, Default)]
pub struct StateGate {
    last_accepted: Option<u64>,
}

impl StateGate {
    /// Returns true and remembers `now` if enough time passed since the last accepted update
    pub fn accept(&mut self, now: u64) -> bool {
        if let Some(last) = self.last_accepted {
            if (now.saturating_sub(last) as f64) < min_state_interval_ms() {
                return false;
            }
        }
        self.last_accepted = Some(now);
        true
    }
}
