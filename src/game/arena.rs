//! Arena state and the per-message handlers
//!
//! Everything here runs on the arena task (see [`super::runtime`]); each
//! handler reads and writes the world inside a single call, so no two handlers
//! ever interleave.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::store::{KillRecord, KillSink};
use crate::ws::outbound::Outbound;
use crate::ws::protocol::{ClientMsg, EventKind, PlayerSnapshot, ServerMsg, StateUpdate, WorldEvent};

use super::combat::{sanitize_shot_id, CombatRules, CombatSystem, Impact, ShotDedup, MAX_HP};
use super::physics::{terrain_height, MapBounds, Vec3};
use super::session::{Session, SessionRegistry, CLOSE_DUPLICATE_NAME};
use super::snapshot::{PendingStates, SnapshotBuilder};
use super::world::{EventLog, WorldStore};
use super::PlayerId;

pub const MAX_NAME_CHARS: usize = 20;
pub const MAX_CHAT_CHARS: usize = 80;
const DEFAULT_NAME: &str = "Player";

/// Entries without a session are reaped after this much silence
pub const IDLE_MS: u64 = 60_000;

/// Arena-wide settings fixed at startup
#[derive(Debug, Clone)]
pub struct ArenaSettings {
    pub world: String,
    /// Terrain seed shared with clients
    pub seed: u32,
    pub allow_duplicate_names: bool,
    pub bounds: MapBounds,
    /// Humans spawn uniformly in [-spread, spread] on X and Z
    pub spawn_spread: f64,
    pub idle_ms: u64,
}

impl Default for ArenaSettings {
    fn default() -> Self {
        Self {
            world: "global".to_string(),
            seed: 0,
            allow_duplicate_names: false,
            bounds: MapBounds::default(),
            spawn_spread: 20.0,
            idle_ms: IDLE_MS,
        }
    }
}

/// Why a hello did not produce a session
#[derive(Debug, thiserror::Error)]
pub enum HelloRejected {
    #[error("name already in use: {0}")]
    DuplicateName(String),

    #[error("arena is not running")]
    Unavailable,
}

/// Everything the arena task owns
pub struct ArenaState {
    pub settings: ArenaSettings,
    pub rules: CombatRules,
    pub world: WorldStore,
    pub log: EventLog,
    pub sessions: SessionRegistry,
    pub pending: PendingStates,
    shots: ShotDedup,
    snapshots: SnapshotBuilder,
    rng: ChaCha8Rng,
    kills: Arc<dyn KillSink>,
}

impl ArenaState {
    pub fn new(settings: ArenaSettings, kills: Arc<dyn KillSink>) -> Self {
        Self {
            rules: CombatRules::default(),
            world: WorldStore::new(),
            log: EventLog::default(),
            sessions: SessionRegistry::new(),
            pending: PendingStates::new(),
            shots: ShotDedup::default(),
            snapshots: SnapshotBuilder::new(settings.world.clone()),
            rng: ChaCha8Rng::seed_from_u64(settings.seed as u64),
            kills,
            settings,
        }
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Append an event, fold it into the store and send it to every session
    pub fn emit(&mut self, kind: EventKind, now: u64) -> WorldEvent {
        let event = self.log.append(kind, now);
        event.apply(&mut self.world);
        self.sessions
            .broadcast_reliable(&ServerMsg::Event { ev: event.clone() });
        event
    }

    /// Turn a hello into a joined session
    pub fn join(&mut self, raw_name: &str, outbound: Outbound, now: u64) -> Result<PlayerId, HelloRejected> {
        let name = clamp_name(raw_name);

        if !self.settings.allow_duplicate_names && self.sessions.name_in_use(&name) {
            info!(name = %name, "Rejecting hello with duplicate name");
            outbound.send_msg(&ServerMsg::error("name already in use"));
            outbound.close(CLOSE_DUPLICATE_NAME, "duplicate name");
            return Err(HelloRejected::DuplicateName(name));
        }

        let id = PlayerId::random();
        let snapshot = PlayerSnapshot {
            id: id.clone(),
            name: name.clone(),
            pos: self.random_spawn(),
            rot_y: 0.0,
            vel: Vec3::ZERO,
            hp: MAX_HP,
            crouch: false,
            dead_until: 0,
            updated_at: now,
            ping_ms: None,
        };

        self.sessions
            .insert(Session::new(id.clone(), name.clone(), outbound.clone(), now));
        self.world.set(snapshot.clone());
        self.emit(EventKind::Join { player: snapshot }, now);

        outbound.send_msg(&ServerMsg::Welcome {
            id: id.clone(),
            world: self.settings.world.clone(),
            now,
            seed: self.settings.seed,
        });
        outbound.send_msg(&self.snapshots.build(&self.world, &self.log));

        info!(
            player_id = %id,
            name = %name,
            sessions = self.sessions.len(),
            "Player joined"
        );
        Ok(id)
    }

    /// Dispatch one decoded message from a joined session
    pub fn handle_client(&mut self, id: &PlayerId, msg: ClientMsg, now: u64) {
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        if !session.admit(now) {
            return;
        }

        match msg {
            ClientMsg::Hello { .. } => {}
            ClientMsg::Ping { .. } => {
                session.send(&ServerMsg::Pong { now });
            }
            ClientMsg::Chat { text } => self.handle_chat(id, &text, now),
            ClientMsg::State(update) => {
                if session.state_gate.accept(now) {
                    self.handle_state(id, update, now);
                } else {
                    debug!(player_id = %id, "State update arrived too soon, dropped");
                }
            }
            ClientMsg::Snowball { id: shot_id, dir, .. } => {
                self.handle_snowball(id, shot_id.as_deref(), dir, now);
            }
            ClientMsg::Rename { name } => self.handle_rename(id, &name, now),
        }
    }

    pub fn handle_chat(&mut self, id: &PlayerId, raw: &str, now: u64) {
        let text = clamp_chat(raw);
        if text.is_empty() {
            return;
        }
        let Some(name) = self.sessions.get(id).map(|s| s.name.clone()) else {
            return;
        };
        self.emit(
            EventKind::Chat {
                player_id: id.clone(),
                name,
                text,
            },
            now,
        );
    }

    pub fn handle_rename(&mut self, id: &PlayerId, raw: &str, now: u64) {
        let name = clamp_name(raw);
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        session.name = name.clone();
        self.emit(
            EventKind::Rename {
                player_id: id.clone(),
                name,
            },
            now,
        );
    }

    /// Merge a client's own state, or revive it once its freeze window is over
    pub fn handle_state(&mut self, id: &PlayerId, update: StateUpdate, now: u64) {
        if !self.settings.bounds.accepts(&update.pos) || !update.rot_y.is_finite() {
            debug!(player_id = %id, "Implausible state dropped");
            return;
        }
        let Some(prev) = self.world.get(id).cloned() else {
            return;
        };
        if prev.is_frozen(now) {
            return;
        }

        let ping_ms = update.ping_ms.filter(|p| p.is_finite()).or(prev.ping_ms);

        if prev.is_dead() {
            let pos = self.random_spawn();
            self.world.set(PlayerSnapshot {
                pos,
                rot_y: update.rot_y,
                vel: Vec3::ZERO,
                crouch: false,
                updated_at: now,
                ping_ms,
                ..prev
            });
            self.emit(
                EventKind::Respawn {
                    player_id: id.clone(),
                    pos,
                    hp: MAX_HP,
                },
                now,
            );
            if let Some(revived) = self.world.get(id) {
                self.pending.enqueue(revived.to_delta());
            }
            return;
        }

        let next = PlayerSnapshot {
            pos: update.pos,
            rot_y: update.rot_y,
            vel: update.vel.filter(Vec3::is_finite).unwrap_or(Vec3::ZERO),
            crouch: update.crouch.unwrap_or(false),
            updated_at: now,
            ping_ms,
            ..prev
        };
        self.pending.enqueue(next.to_delta());
        self.world.set(next);
    }

    pub fn handle_snowball(&mut self, id: &PlayerId, raw_shot_id: Option<&str>, dir: Vec3, now: u64) {
        let shot_id = sanitize_shot_id(raw_shot_id);
        self.fire(id, shot_id, dir, now, true);
    }

    /// Throw a snowball for `shooter` and apply whatever it hits.
    ///
    /// Shared by humans and bots; `persist_kill` decides whether a resulting
    /// death is handed to the kill sink.
    pub fn fire(
        &mut self,
        shooter: &PlayerId,
        shot_id: String,
        dir: Vec3,
        now: u64,
        persist_kill: bool,
    ) -> Option<Impact> {
        if !dir.is_finite() {
            return None;
        }
        let (origin, attacker_name) = {
            let snap = self.world.get(shooter)?;
            if snap.is_dead() {
                return None;
            }
            (
                CombatSystem::launch_origin(snap.pos, &self.rules.ballistics),
                snap.name.clone(),
            )
        };
        if self.shots.check_and_record(&shot_id, now) {
            debug!(shot_id = %shot_id, "Duplicate shot ignored");
            return None;
        }
        let dir = dir.normalize();

        self.emit(
            EventKind::Snowball {
                id: shot_id.clone(),
                owner_id: shooter.clone(),
                origin,
                dir,
                speed: self.rules.ballistics.speed,
            },
            now,
        );

        let impact = CombatSystem::resolve(shooter, origin, dir, self.world.values(), &self.rules)?;
        let victim = self.world.get(&impact.victim_id)?.clone();

        let weapon = self.rules.weapon;
        let impulse = CombatSystem::knockback(dir, &self.rules.ballistics, &weapon);
        let damage = CombatSystem::apply_damage(victim.hp, weapon.damage);

        self.emit(
            EventKind::Hit {
                attacker_id: shooter.clone(),
                victim_id: victim.id.clone(),
                impulse,
                victim_hp: damage.hp,
                shot_id: shot_id.clone(),
            },
            now,
        );

        if damage.killed {
            if persist_kill {
                self.kills.record(KillRecord::new(
                    shooter.as_str(),
                    &attacker_name,
                    victim.id.as_str(),
                    &victim.name,
                    &shot_id,
                ));
            }
            self.emit(
                EventKind::Death {
                    victim_id: victim.id.clone(),
                    victim_name: victim.name.clone(),
                    attacker_id: shooter.clone(),
                    attacker_name: attacker_name.clone(),
                    shot_id,
                    respawn_at: now + weapon.respawn_ms,
                },
                now,
            );
            info!(attacker = %attacker_name, victim = %victim.name, "Player knocked out");
        }

        Some(impact)
    }

    /// Drop a session and announce its departure
    pub fn disconnect(&mut self, id: &PlayerId, now: u64) {
        let Some(session) = self.sessions.remove(id) else {
            return;
        };
        self.emit(
            EventKind::Leave {
                player_id: id.clone(),
                name: session.name.clone(),
            },
            now,
        );
        info!(
            player_id = %id,
            name = %session.name,
            online_secs = now.saturating_sub(session.connected_at) / 1000,
            "Player left"
        );
    }

    /// Flush merged positional deltas to every connection that keeps up
    pub fn state_tick(&mut self, now: u64) {
        if self.sessions.is_empty() {
            return;
        }
        if let Some(frame) = self.pending.drain_frame(now) {
            self.sessions.broadcast_droppable(&frame);
        }
    }

    /// Periodic full-state correction
    pub fn snapshot_tick(&mut self) {
        if self.sessions.is_empty() {
            return;
        }
        let snapshot = self.snapshots.build(&self.world, &self.log);
        self.sessions.broadcast_droppable(&snapshot);
    }

    /// Remove stale store entries that have no session; `keep` protects bots
    pub fn reap_idle(&mut self, now: u64, keep: impl Fn(&PlayerId) -> bool) -> Vec<PlayerId> {
        let idle_ms = self.settings.idle_ms;
        let stale: Vec<PlayerId> = self
            .world
            .values()
            .filter(|p| !self.sessions.contains(&p.id) && !keep(&p.id))
            .filter(|p| now.saturating_sub(p.updated_at) > idle_ms)
            .map(|p| p.id.clone())
            .collect();

        for id in &stale {
            self.world.delete(id);
            debug!(player_id = %id, "Reaped idle entry");
        }
        stale
    }

    pub fn sweep_shots(&mut self, now: u64) {
        self.shots.sweep(now);
    }

    /// Random human spawn standing on the terrain
    pub fn random_spawn(&mut self) -> Vec3 {
        let spread = self.settings.spawn_spread;
        let x = self.rng.gen_range(-spread..=spread);
        let z = self.rng.gen_range(-spread..=spread);
        Vec3::new(x, terrain_height(self.settings.seed, x, z), z)
    }

    pub fn latest_seq(&self) -> u64 {
        self.log.latest_seq()
    }
}

/// Collapse whitespace, default empty names and cap the length
pub fn clamp_name(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let name: &str = if collapsed.is_empty() {
        DEFAULT_NAME
    } else {
        &collapsed
    };
    name.chars().take(MAX_NAME_CHARS).collect()
}

/// Trim and cap a chat line; empty means drop
pub fn clamp_chat(raw: &str) -> String {
    raw.trim().chars().take(MAX_CHAT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::outbound::{Frame, FrameReceiver};
    use crate::game::session::CLOSE_RATE_LIMITED;
    use parking_lot::Mutex;
    use serde_json::Value;

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<KillRecord>>,
    }

    impl KillSink for RecordingSink {
        fn record(&self, record: KillRecord) {
            self.records.lock().push(record);
        }
    }

    fn arena() -> (ArenaState, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let settings = ArenaSettings {
            seed: 1234,
            ..ArenaSettings::default()
        };
        (ArenaState::new(settings, sink.clone()), sink)
    }

    fn join(arena: &mut ArenaState, name: &str, now: u64) -> (PlayerId, FrameReceiver) {
        let (out, rx) = Outbound::channel();
        let id = arena.join(name, out, now).unwrap();
        (id, rx)
    }

    fn frames(rx: &mut FrameReceiver) -> Vec<Frame> {
        let mut out = Vec::new();
        while let Some(frame) = rx.try_recv() {
            out.push(frame);
        }
        out
    }

    fn json_frames(rx: &mut FrameReceiver) -> Vec<Value> {
        frames(rx)
            .into_iter()
            .filter_map(|f| match f {
                Frame::Text(text) => serde_json::from_str(&text).ok(),
                Frame::Close { .. } => None,
            })
            .collect()
    }

    fn place(arena: &mut ArenaState, id: &PlayerId, pos: Vec3, hp: u32) {
        let mut snap = arena.world.get(id).cloned().unwrap();
        snap.pos = pos;
        snap.hp = hp;
        arena.world.set(snap);
    }

    fn state_msg(x: f64) -> StateUpdate {
        StateUpdate {
            pos: Vec3::new(x, 6.0, 1.0),
            rot_y: 0.25,
            vel: None,
            crouch: Some(true),
            ts: None,
            ping_ms: Some(42.0),
        }
    }

    fn count(arena: &ArenaState, tag: &str) -> usize {
        arena
            .log
            .iter()
            .filter(|ev| serde_json::to_value(ev).unwrap()["t"] == tag)
            .count()
    }

    #[test]
    fn test_join_sends_own_join_then_welcome_then_snapshot() {
        let (mut arena, _) = arena();
        let (id, mut rx) = join(&mut arena, "  Alice   Smith ", 1_000);

        let msgs = json_frames(&mut rx);
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0]["t"], "event");
        assert_eq!(msgs[0]["ev"]["t"], "join");
        assert_eq!(msgs[0]["ev"]["player"]["name"], "Alice Smith");
        assert_eq!(msgs[1]["t"], "welcome");
        assert_eq!(msgs[1]["id"], id.as_str());
        assert_eq!(msgs[1]["seed"], 1234);
        assert_eq!(msgs[2]["t"], "snapshot");
        assert_eq!(msgs[2]["latestSeq"], 1);

        let snap = arena.world.get(&id).unwrap();
        assert!(snap.pos.x.abs() <= 20.0 && snap.pos.z.abs() <= 20.0);
        assert_eq!(snap.hp, MAX_HP);
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let (mut arena, _) = arena();
        let (_a, _rx) = join(&mut arena, "Alice", 1_000);

        let (out, mut rx) = Outbound::channel();
        let result = arena.join(" Alice ", out, 1_100);
        assert!(matches!(result, Err(HelloRejected::DuplicateName(ref n)) if n == "Alice"));

        let got = frames(&mut rx);
        assert_eq!(got.len(), 2);
        assert!(matches!(&got[0], Frame::Text(t) if t.contains("\"t\":\"error\"")));
        assert_eq!(
            got[1],
            Frame::Close {
                code: CLOSE_DUPLICATE_NAME,
                reason: "duplicate name"
            }
        );
        assert_eq!(arena.sessions.len(), 1);
    }

    #[test]
    fn test_duplicate_names_allowed_when_configured() {
        let (mut arena, _) = arena();
        arena.settings.allow_duplicate_names = true;
        let (a, _rx1) = join(&mut arena, "Alice", 1_000);
        let (b, _rx2) = join(&mut arena, "Alice", 1_000);
        assert_ne!(a, b);
        assert_eq!(arena.sessions.len(), 2);
    }

    #[test]
    fn test_seq_increases_across_handlers() {
        let (mut arena, _) = arena();
        let (a, _rx) = join(&mut arena, "Alice", 1_000);
        arena.handle_chat(&a, "hello", 1_010);
        arena.handle_chat(&a, "   ", 1_020);
        arena.handle_rename(&a, "Alicia", 1_030);
        arena.disconnect(&a, 1_040);

        let seqs: Vec<u64> = arena.log.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        assert!(arena.world.is_empty());
    }

    #[test]
    fn test_hit_on_full_health_target() {
        let (mut arena, sink) = arena();
        let (a, _rxa) = join(&mut arena, "Alice", 1_000);
        let (b, _rxb) = join(&mut arena, "Bob", 1_000);
        place(&mut arena, &a, Vec3::ZERO, 100);
        place(&mut arena, &b, Vec3::new(0.0, 0.0, -8.0), 100);

        let impact = arena
            .fire(&a, "shot-0001".to_string(), Vec3::new(0.0, 0.0, -1.0), 5_000, true)
            .unwrap();
        assert_eq!(impact.victim_id, b);
        assert!(impact.t < 1.0);

        assert_eq!(arena.world.get(&b).unwrap().hp, 90);
        assert_eq!(count(&arena, "hit"), 1);
        assert_eq!(count(&arena, "death"), 0);
        assert!(sink.records.lock().is_empty());
    }

    #[test]
    fn test_lethal_hit_emits_one_death_and_records_kill() {
        let (mut arena, sink) = arena();
        let (a, _rxa) = join(&mut arena, "Alice", 1_000);
        let (b, _rxb) = join(&mut arena, "Bob", 1_000);
        place(&mut arena, &a, Vec3::ZERO, 100);
        place(&mut arena, &b, Vec3::new(0.0, 0.0, -8.0), 10);

        arena.handle_snowball(&a, Some("shot-0002"), Vec3::new(0.0, 0.0, -1.0), 5_000);

        let deaths: Vec<&WorldEvent> = arena
            .log
            .iter()
            .filter(|ev| matches!(ev.kind, EventKind::Death { .. }))
            .collect();
        assert_eq!(deaths.len(), 1);
        match &deaths[0].kind {
            EventKind::Death { respawn_at, victim_id, .. } => {
                assert_eq!(*respawn_at, deaths[0].at + 3_000);
                assert_eq!(victim_id, &b);
            }
            _ => unreachable!(),
        }

        let victim = arena.world.get(&b).unwrap();
        assert_eq!(victim.hp, 0);
        assert_eq!(victim.dead_until, 8_000);

        let records = sink.records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attacker_name, "Alice");
        assert_eq!(records[0].victim_name, "Bob");
        assert_eq!(records[0].shot_id, "shot-0002");
    }

    #[test]
    fn test_unpersisted_kill() {
        let (mut arena, sink) = arena();
        let (a, _rxa) = join(&mut arena, "Alice", 1_000);
        let (b, _rxb) = join(&mut arena, "Bob", 1_000);
        place(&mut arena, &a, Vec3::ZERO, 100);
        place(&mut arena, &b, Vec3::new(0.0, 0.0, -8.0), 10);

        arena.fire(&a, "bot-shot-1".to_string(), Vec3::new(0.0, 0.0, -1.0), 5_000, false);
        assert_eq!(count(&arena, "death"), 1);
        assert!(sink.records.lock().is_empty());
    }

    #[test]
    fn test_repeated_shot_id_is_a_no_op() {
        let (mut arena, _) = arena();
        let (a, _rxa) = join(&mut arena, "Alice", 1_000);
        let (b, _rxb) = join(&mut arena, "Bob", 1_000);
        place(&mut arena, &a, Vec3::ZERO, 100);
        place(&mut arena, &b, Vec3::new(0.0, 0.0, -8.0), 100);

        let dir = Vec3::new(0.0, 0.0, -1.0);
        arena.handle_snowball(&a, Some("retransmitted"), dir, 5_000);
        arena.handle_snowball(&a, Some("retransmitted"), dir, 5_200);

        assert_eq!(count(&arena, "snowball"), 1);
        assert_eq!(count(&arena, "hit"), 1);
        assert_eq!(arena.world.get(&b).unwrap().hp, 90);
    }

    #[test]
    fn test_rejected_throw_keeps_shot_id_available() {
        let (mut arena, _) = arena();
        let (a, _rxa) = join(&mut arena, "Alice", 1_000);
        let (b, _rxb) = join(&mut arena, "Bob", 1_000);
        place(&mut arena, &a, Vec3::ZERO, 0);
        place(&mut arena, &b, Vec3::new(0.0, 0.0, -8.0), 100);

        let dir = Vec3::new(0.0, 0.0, -1.0);
        assert!(arena.fire(&a, "shot-0009".to_string(), dir, 5_000, true).is_none());
        assert!(arena.fire(&PlayerId::from("ghost"), "shot-0010".to_string(), dir, 5_000, true).is_none());
        assert_eq!(count(&arena, "snowball"), 0);

        place(&mut arena, &a, Vec3::ZERO, 100);
        assert!(arena.fire(&a, "shot-0009".to_string(), dir, 5_100, true).is_some());
        place(&mut arena, &b, Vec3::new(0.0, 0.0, -8.0), 100);
        assert!(arena.fire(&a, "shot-0010".to_string(), dir, 5_200, true).is_some());
        assert_eq!(count(&arena, "hit"), 2);
    }

    #[test]
    fn test_dead_player_frozen_then_respawns_once() {
        let (mut arena, _) = arena();
        let (a, _rxa) = join(&mut arena, "Alice", 1_000);
        let (b, _rxb) = join(&mut arena, "Bob", 1_000);
        place(&mut arena, &a, Vec3::ZERO, 100);
        place(&mut arena, &b, Vec3::new(0.0, 0.0, -8.0), 10);
        arena.handle_snowball(&a, Some("shot-0003"), Vec3::new(0.0, 0.0, -1.0), 5_000);
        let seq_after_death = arena.latest_seq();

        arena.handle_state(&b, state_msg(3.0), 6_000);
        assert_eq!(arena.latest_seq(), seq_after_death);
        assert_eq!(arena.world.get(&b).unwrap().pos, Vec3::new(0.0, 0.0, -8.0));

        arena.handle_state(&b, state_msg(3.0), 8_000);
        assert_eq!(count(&arena, "respawn"), 1);
        let revived = arena.world.get(&b).unwrap().clone();
        assert_eq!(revived.hp, MAX_HP);
        assert_eq!(revived.dead_until, 0);
        assert!(revived.pos.x.abs() <= 20.0 && revived.pos.z.abs() <= 20.0);
        assert!(arena.settings.bounds.accepts(&revived.pos));

        arena.handle_state(&b, state_msg(4.0), 8_100);
        assert_eq!(count(&arena, "respawn"), 1);
        let moved = arena.world.get(&b).unwrap();
        assert_eq!(moved.pos, Vec3::new(4.0, 6.0, 1.0));
        assert!(moved.crouch);
        assert_eq!(moved.ping_ms, Some(42.0));
    }

    #[test]
    fn test_implausible_state_dropped() {
        let (mut arena, _) = arena();
        let (a, _rx) = join(&mut arena, "Alice", 1_000);
        let before = arena.world.get(&a).unwrap().clone();

        let mut update = state_msg(0.0);
        update.pos = Vec3::new(101.0, 0.0, 0.0);
        arena.handle_state(&a, update, 2_000);
        let mut update = state_msg(0.0);
        update.rot_y = f64::NAN;
        arena.handle_state(&a, update, 2_100);

        assert_eq!(arena.world.get(&a).unwrap(), &before);
        assert!(arena.pending.is_empty());
    }

    #[test]
    fn test_reaper_spares_sessions_and_kept_ids() {
        let (mut arena, _) = arena();
        let (a, _rx) = join(&mut arena, "Alice", 1_000);
        let mut ghost = arena.world.get(&a).unwrap().clone();
        ghost.id = PlayerId::from("ghost");
        arena.world.set(ghost.clone());
        let mut bot = ghost.clone();
        bot.id = PlayerId::from("bot-0");
        arena.world.set(bot);

        let reaped = arena.reap_idle(100_000, |id| id.as_str() == "bot-0");
        assert_eq!(reaped, vec![PlayerId::from("ghost")]);
        assert!(arena.world.contains(&a));
        assert!(arena.world.contains(&PlayerId::from("bot-0")));

        // nothing left to reap, and no event was appended
        assert!(arena.reap_idle(200_000, |id| id.as_str() == "bot-0").is_empty());
        assert_eq!(arena.latest_seq(), 1);
    }

    #[test]
    fn test_rate_limit_closes_after_budget() {
        let (mut arena, _) = arena();
        let (a, mut rx) = join(&mut arena, "Alice", 1_000);
        frames(&mut rx);

        for i in 0..1300 {
            arena.handle_client(&a, ClientMsg::Ping { now: None }, 2_000 + i / 10);
        }

        let got = frames(&mut rx);
        let pongs = got
            .iter()
            .filter(|f| matches!(f, Frame::Text(t) if t.contains("\"t\":\"pong\"")))
            .count();
        assert_eq!(pongs, 1200);
        assert_eq!(got.len(), 1202);
        assert!(matches!(&got[1200], Frame::Text(t) if t.contains("rate limited")));
        assert_eq!(
            got[1201],
            Frame::Close {
                code: CLOSE_RATE_LIMITED,
                reason: "rate limited"
            }
        );
    }

    #[test]
    fn test_state_batch_holds_one_entry_per_client() {
        let (mut arena, _) = arena();
        let (a, mut rxa) = join(&mut arena, "Alice", 1_000);
        let (b, _rxb) = join(&mut arena, "Bob", 1_000);
        frames(&mut rxa);

        for k in 0..5u64 {
            let t = 2_000 + k * 50;
            for offset in [0, 25] {
                let x = (k * 2 + offset / 25) as f64;
                arena.handle_client(&a, ClientMsg::State(state_msg(x)), t + offset);
                arena.handle_client(&b, ClientMsg::State(state_msg(-x)), t + offset);
            }
            arena.state_tick(t + 49);
        }

        let batches: Vec<Value> = json_frames(&mut rxa)
            .into_iter()
            .filter(|m| m["t"] == "states")
            .collect();
        assert_eq!(batches.len(), 5);
        for batch in batches {
            let list = batch["list"].as_array().unwrap();
            assert_eq!(list.len(), 2);
            assert_ne!(list[0]["id"], list[1]["id"]);
            assert_eq!(list[0]["pingMs"], 42.0);
        }
    }

    #[test]
    fn test_clamp_name_and_chat() {
        assert_eq!(clamp_name("   "), "Player");
        assert_eq!(clamp_name("a \t b\n c"), "a b c");
        assert_eq!(clamp_name(&"x".repeat(40)).chars().count(), MAX_NAME_CHARS);
        assert_eq!(clamp_name("雪人雪人"), "雪人雪人");
        assert_eq!(clamp_chat("  hi  "), "hi");
        assert_eq!(clamp_chat(&"y".repeat(200)).len(), MAX_CHAT_CHARS);
        assert!(clamp_chat(" \n ").is_empty());
    }
}
