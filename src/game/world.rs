//! Authoritative player store and the append-only event log

use std::collections::{HashMap, VecDeque};

use crate::ws::protocol::{EventKind, PlayerSnapshot, WorldEvent};

use super::PlayerId;

/// Events older than this are pruned from the log (the store keeps their effects)
pub const EVENT_RETENTION_MS: u64 = 120_000;

/// Map of player id to its current snapshot
#[derive(Debug, Default)]
pub struct WorldStore {
    players: HashMap<PlayerId, PlayerSnapshot>,
}

impl WorldStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &PlayerId) -> Option<&PlayerSnapshot> {
        self.players.get(id)
    }

    pub fn set(&mut self, snapshot: PlayerSnapshot) {
        self.players.insert(snapshot.id.clone(), snapshot);
    }

    pub fn delete(&mut self, id: &PlayerId) -> Option<PlayerSnapshot> {
        self.players.remove(id)
    }

    pub fn values(&self) -> impl Iterator<Item = &PlayerSnapshot> {
        self.players.values()
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.players.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Owned copy of every snapshot, for snapshot frames
    pub fn to_vec(&self) -> Vec<PlayerSnapshot> {
        self.players.values().cloned().collect()
    }

    /// Apply `update` to an existing entry and stamp it; missing ids are ignored
    fn update(&mut self, id: &PlayerId, at: u64, update: impl FnOnce(&mut PlayerSnapshot)) {
        if let Some(snapshot) = self.players.get_mut(id) {
            update(snapshot);
            snapshot.updated_at = at;
        }
    }
}

impl WorldEvent {
    /// Fold this event into the store
    pub fn apply(&self, store: &mut WorldStore) {
        let at = self.at;
        match &self.kind {
            EventKind::Join { player } => store.set(player.clone()),
            EventKind::Leave { player_id, .. } => {
                store.delete(player_id);
            }
            EventKind::Chat { .. } | EventKind::Snowball { .. } => {}
            EventKind::State {
                player_id,
                pos,
                rot_y,
                vel,
                crouch,
            } => store.update(player_id, at, |p| {
                p.pos = *pos;
                p.rot_y = *rot_y;
                p.vel = *vel;
                p.crouch = *crouch;
            }),
            EventKind::Rename { player_id, name } => store.update(player_id, at, |p| {
                p.name = name.clone();
            }),
            EventKind::Respawn { player_id, pos, hp } => store.update(player_id, at, |p| {
                p.pos = *pos;
                p.hp = *hp;
                p.dead_until = 0;
            }),
            EventKind::Hit {
                victim_id,
                victim_hp,
                ..
            } => store.update(victim_id, at, |p| {
                p.hp = *victim_hp;
            }),
            EventKind::Death {
                victim_id,
                respawn_at,
                ..
            } => store.update(victim_id, at, |p| {
                p.hp = 0;
                p.dead_until = *respawn_at;
            }),
        }
    }
}

/// Recent history of world events in emission order
#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<WorldEvent>,
    latest_seq: u64,
    retention_ms: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(EVENT_RETENTION_MS)
    }
}

impl EventLog {
    pub fn new(retention_ms: u64) -> Self {
        Self {
            events: VecDeque::new(),
            latest_seq: 0,
            retention_ms,
        }
    }

    /// Sequence the payload, record it and prune expired history
    pub fn append(&mut self, kind: EventKind, now: u64) -> WorldEvent {
        self.latest_seq += 1;
        let event = WorldEvent {
            seq: self.latest_seq,
            at: now,
            kind,
        };
        self.events.push_back(event.clone());
        self.prune(now);
        event
    }

    /// Drop events older than the retention window, oldest first
    pub fn prune(&mut self, now: u64) {
        let cutoff = now.saturating_sub(self.retention_ms);
        while self.events.front().is_some_and(|ev| ev.at < cutoff) {
            self.events.pop_front();
        }
    }

    pub fn latest_seq(&self) -> u64 {
        self.latest_seq
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorldEvent> {
        self.events.iter()
    }
}
