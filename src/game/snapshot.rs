//! Coalesced state buffer and broadcast frame building

use std::collections::HashMap;

use crate::ws::protocol::{ServerMsg, StateDelta};

use super::world::{EventLog, WorldStore};
use super::PlayerId;

/// Latest unbroadcast motion per player. Later updates overwrite earlier ones.
#[derive(Debug, Default)]
pub struct PendingStates {
    pending: HashMap<PlayerId, StateDelta>,
}

impl PendingStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, delta: StateDelta) {
        self.pending.insert(delta.id.clone(), delta);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take everything queued since the last tick as one `states` frame.
    /// Returns `None` when nothing moved, so empty frames are never sent.
    pub fn drain_frame(&mut self, now: u64) -> Option<ServerMsg> {
        if self.pending.is_empty() {
            return None;
        }
        let list: Vec<StateDelta> = self.pending.drain().map(|(_, delta)| delta).collect();
        Some(ServerMsg::States { at: now, list })
    }
}

/// Builds full world snapshots
pub struct SnapshotBuilder {
    world: String,
}

impl SnapshotBuilder {
    pub fn new(world: impl Into<String>) -> Self {
        Self {
            world: world.into(),
        }
    }

    /// Full store contents tagged with the latest event sequence
    pub fn build(&self, store: &WorldStore, log: &EventLog) -> ServerMsg {
        ServerMsg::Snapshot {
            world: self.world.clone(),
            players: store.to_vec(),
            latest_seq: log.latest_seq(),
        }
    }
}
