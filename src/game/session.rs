//! Live connection registry

use std::collections::HashMap;

use tracing::warn;

use crate::util::rate_limit::{MessageBucket, StateGate};
use crate::ws::outbound::{encode, Delivery, Outbound};
use crate::ws::protocol::ServerMsg;

use super::PlayerId;

/// Close code sent when a session exceeds its message budget
pub const CLOSE_RATE_LIMITED: u16 = 4008;
/// Close code for a hello whose name is already taken
pub const CLOSE_DUPLICATE_NAME: u16 = 4001;
/// Close code for a connection that never said hello
pub const CLOSE_HELLO_TIMEOUT: u16 = 4000;

/// One joined connection
pub struct Session {
    pub id: PlayerId,
    pub name: String,
    pub connected_at: u64,
    pub bucket: MessageBucket,
    pub state_gate: StateGate,
    pub outbound: Outbound,
    /// Set once the session was cut off; its remaining input is ignored
    pub closing: bool,
}

impl Session {
    pub fn new(id: PlayerId, name: String, outbound: Outbound, now: u64) -> Self {
        Self {
            id,
            name,
            connected_at: now,
            bucket: MessageBucket::for_session(now),
            state_gate: StateGate::default(),
            outbound,
            closing: false,
        }
    }

    pub fn send(&self, msg: &ServerMsg) -> Delivery {
        self.outbound.send_msg(msg)
    }

    /// Count an inbound message; on overflow the client gets an error and is closed
    pub fn admit(&mut self, now: u64) -> bool {
        if self.closing {
            return false;
        }
        if self.bucket.admit(now) {
            return true;
        }
        warn!(player_id = %self.id, "Session exceeded message rate, closing");
        self.send(&ServerMsg::error("rate limited"));
        self.outbound.close(CLOSE_RATE_LIMITED, "rate limited");
        self.closing = true;
        false
    }
}

/// All joined sessions keyed by player id
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<PlayerId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, session: Session) {
        self.sessions.insert(session.id.clone(), session);
    }

    pub fn remove(&mut self, id: &PlayerId) -> Option<Session> {
        self.sessions.remove(id)
    }

    pub fn get(&self, id: &PlayerId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &PlayerId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Whether an open session already uses this display name
    pub fn name_in_use(&self, name: &str) -> bool {
        self.sessions.values().any(|s| !s.closing && s.name == name)
    }

    /// Deliver to every session, ignoring backpressure up to the hard ceiling
    pub fn broadcast_reliable(&self, msg: &ServerMsg) {
        let Some(text) = encode(msg) else {
            return;
        };
        for session in self.sessions.values() {
            if session.outbound.send_reliable(text.clone()) == Delivery::Overflow {
                warn!(
                    player_id = %session.id,
                    "Outbound buffer ceiling exceeded, dropping connection"
                );
            }
        }
    }

    /// Deliver to every session that is not backed up; returns how many received it
    pub fn broadcast_droppable(&self, msg: &ServerMsg) -> usize {
        let Some(text) = encode(msg) else {
            return 0;
        };
        self.sessions
            .values()
            .filter(|s| s.outbound.send_droppable(text.clone()))
            .count()
    }
}
