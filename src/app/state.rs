//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::ArenaHandle;
use crate::util::rate_limit::{create_limiter, Limiter, UPGRADE_RATE_LIMIT};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub arena: ArenaHandle,
    /// Process-wide throttle on websocket upgrades
    pub upgrade_limiter: Arc<Limiter>,
}

impl AppState {
    pub fn new(config: Config, arena: ArenaHandle) -> Self {
        Self {
            config: Arc::new(config),
            arena,
            upgrade_limiter: create_limiter(UPGRADE_RATE_LIMIT),
        }
    }
}
