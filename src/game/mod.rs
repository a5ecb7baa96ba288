//! Game simulation modules

pub mod arena;
pub mod bots;
pub mod combat;
pub mod physics;
pub mod runtime;
pub mod session;
pub mod snapshot;
pub mod world;

pub use arena::{ArenaSettings, ArenaState, HelloRejected};
pub use bots::BotController;
pub use runtime::{ArenaCommand, ArenaHandle, ArenaStats, GameArena};

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque id of a player or bot, stable for the lifetime of its session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Fresh id for a joining human
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
