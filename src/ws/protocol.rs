//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::physics::Vec3;
use crate::game::PlayerId;

/// Positional update reported by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    pub pos: Vec3,
    pub rot_y: f64,
    #[serde(default)]
    pub vel: Option<Vec3>,
    #[serde(default)]
    pub crouch: Option<bool>,
    /// Client timestamp, informational only
    #[serde(default)]
    pub ts: Option<f64>,
    /// Round trip time measured by the client
    #[serde(default)]
    pub ping_ms: Option<f64>,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Handshake, the only message accepted before joining
    Hello {
        #[serde(default)]
        name: String,
    },

    /// Chat line
    Chat { text: String },

    /// Own position, rotation and motion
    State(StateUpdate),

    /// Throw a snowball
    Snowball {
        /// Shot id used for retransmission dedup
        #[serde(default)]
        id: Option<String>,
        dir: Vec3,
        #[serde(default)]
        ts: Option<f64>,
    },

    /// Latency check
    Ping {
        #[serde(default)]
        now: Option<f64>,
    },

    /// Change display name
    Rename { name: String },
}

/// Authoritative state of one player or bot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub pos: Vec3,
    pub rot_y: f64,
    pub vel: Vec3,
    pub hp: u32,
    pub crouch: bool,
    /// Epoch ms until which the player stays dead, 0 while alive
    #[serde(default)]
    pub dead_until: u64,
    pub updated_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping_ms: Option<f64>,
}

impl PlayerSnapshot {
    /// hp reached zero, regardless of whether the freeze window elapsed
    pub fn is_dead(&self) -> bool {
        self.hp == 0
    }

    /// Dead and still inside the freeze window
    pub fn is_frozen(&self, now: u64) -> bool {
        self.is_dead() && self.dead_until > now
    }

    /// Latest motion of this player as a batched delta
    pub fn to_delta(&self) -> StateDelta {
        StateDelta {
            id: self.id.clone(),
            pos: self.pos,
            rot_y: self.rot_y,
            vel: self.vel,
            crouch: self.crouch,
            updated_at: self.updated_at,
            ping_ms: self.ping_ms,
        }
    }
}

/// One entry of a `states` batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDelta {
    pub id: PlayerId,
    pub pos: Vec3,
    pub rot_y: f64,
    pub vel: Vec3,
    pub crouch: bool,
    pub updated_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping_ms: Option<f64>,
}

/// A sequenced world fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldEvent {
    pub seq: u64,
    pub at: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// World event payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EventKind {
    Join {
        player: PlayerSnapshot,
    },

    Leave {
        player_id: PlayerId,
        name: String,
    },

    Chat {
        player_id: PlayerId,
        name: String,
        text: String,
    },

    /// Single player motion, low-rate path
    State {
        player_id: PlayerId,
        pos: Vec3,
        rot_y: f64,
        vel: Vec3,
        crouch: bool,
    },

    /// Projectile thrown, rendered by every client whether or not it hits
    Snowball {
        id: String,
        owner_id: PlayerId,
        origin: Vec3,
        dir: Vec3,
        speed: f64,
    },

    Hit {
        attacker_id: PlayerId,
        victim_id: PlayerId,
        impulse: Vec3,
        victim_hp: u32,
        shot_id: String,
    },

    Death {
        victim_id: PlayerId,
        victim_name: String,
        attacker_id: PlayerId,
        attacker_name: String,
        shot_id: String,
        respawn_at: u64,
    },

    Respawn {
        player_id: PlayerId,
        pos: Vec3,
        hp: u32,
    },

    Rename {
        player_id: PlayerId,
        name: String,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Handshake accepted
    Welcome {
        id: PlayerId,
        world: String,
        now: u64,
        /// Seed for the shared terrain function
        seed: u32,
    },

    /// Full world state
    Snapshot {
        world: String,
        players: Vec<PlayerSnapshot>,
        latest_seq: u64,
    },

    /// Merged positional deltas since the previous tick
    States { at: u64, list: Vec<StateDelta> },

    /// A world event
    Event { ev: WorldEvent },

    /// Pong response
    Pong { now: u64 },

    /// Error message
    Error { message: String },
}

impl ServerMsg {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
