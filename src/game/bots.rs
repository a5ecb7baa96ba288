//! Server-driven bots
//!
//! Bots live in the world store like any player. Their AI fields stay here and
//! never leave the arena task.

use std::collections::HashSet;
use std::f64::consts::TAU;

use rand::Rng;
use tracing::info;
use uuid::Uuid;

use crate::util::time::bot_tick_delta;
use crate::ws::protocol::{EventKind, PlayerSnapshot};

use super::arena::ArenaState;
use super::combat::MAX_HP;
use super::physics::{terrain_height, PhysicsSystem, Vec3};
use super::PlayerId;

/// Walking speed (units per second)
pub const BOT_SPEED: f64 = 3.0;
/// A new wander point is picked this often
pub const RETARGET_MS: u64 = 3_000;
/// Minimum gap between two throws
pub const SHOT_INTERVAL_MS: u64 = 10_000;
/// Keep-out radius around the landmark at the map centre
pub const LANDMARK_RADIUS: f64 = 25.0;

/// Close enough to the wander point to stop
const ARRIVE_DISTANCE: f64 = 0.5;
const SPAWN_ATTEMPTS: usize = 50;
const WANDER_ATTEMPTS: usize = 20;
/// Bots aim at the chest rather than the feet
const AIM_HEIGHT: f64 = 1.0;

#[derive(Debug, Clone)]
struct BotBrain {
    id: PlayerId,
    target: Option<Vec3>,
    last_shot_at: u64,
    move_timer: u64,
}

/// Drives every bot once per bot tick
#[derive(Debug, Default)]
pub struct BotController {
    brains: Vec<BotBrain>,
    ids: HashSet<PlayerId>,
}

impl BotController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.brains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brains.is_empty()
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.ids.contains(id)
    }

    /// Place `count` bots into the world. First throws are staggered over one interval.
    pub fn init(&mut self, arena: &mut ArenaState, count: usize, now: u64) {
        for i in 0..count {
            let id = PlayerId::from(format!("bot-{}", i));
            let name = format!("Snowman Bot-{}", i + 1);
            let pos = bot_spawn(arena);
            let rot_y = arena.rng().gen_range(0.0..TAU);
            let first_shot_delay = arena.rng().gen_range(0..SHOT_INTERVAL_MS);

            arena.world.set(PlayerSnapshot {
                id: id.clone(),
                name: name.clone(),
                pos,
                rot_y,
                vel: Vec3::ZERO,
                hp: MAX_HP,
                crouch: false,
                dead_until: 0,
                updated_at: now,
                ping_ms: None,
            });

            info!(bot = %name, x = pos.x, z = pos.z, "Bot initialized");

            self.ids.insert(id.clone());
            self.brains.push(BotBrain {
                id,
                target: None,
                last_shot_at: now + first_shot_delay,
                move_timer: now,
            });
        }
    }

    /// Advance every bot by one tick
    pub fn tick(&mut self, arena: &mut ArenaState, now: u64) {
        let dt = bot_tick_delta();
        let seed = arena.settings.seed;
        let bounds = arena.settings.bounds;

        for brain in self.brains.iter_mut() {
            let Some(mut snap) = arena.world.get(&brain.id).cloned() else {
                continue;
            };

            if snap.is_dead() {
                if snap.dead_until <= now {
                    let pos = bot_spawn(arena);
                    brain.target = None;
                    arena.world.set(PlayerSnapshot {
                        pos,
                        vel: Vec3::ZERO,
                        updated_at: now,
                        ..snap
                    });
                    arena.emit(
                        EventKind::Respawn {
                            player_id: brain.id.clone(),
                            pos,
                            hp: MAX_HP,
                        },
                        now,
                    );
                    if let Some(revived) = arena.world.get(&brain.id) {
                        arena.pending.enqueue(revived.to_delta());
                    }
                }
                continue;
            }

            if brain.target.is_none() || now.saturating_sub(brain.move_timer) > RETARGET_MS {
                brain.target = Some(wander_target(arena, snap.pos));
                brain.move_timer = now;
            }

            if let Some(target) = brain.target {
                let dx = target.x - snap.pos.x;
                let dz = target.z - snap.pos.z;
                let dist = dx.hypot(dz);
                if dist > ARRIVE_DISTANCE {
                    let vel = Vec3::new(dx / dist * BOT_SPEED, 0.0, dz / dist * BOT_SPEED);
                    let moved = bounds.clamp(snap.pos + vel * dt);
                    snap.rot_y = PhysicsSystem::yaw_towards(&snap.pos, &target);
                    snap.pos = moved.with_y(terrain_height(seed, moved.x, moved.z));
                    snap.vel = vel;
                } else {
                    snap.vel = Vec3::ZERO;
                    brain.target = None;
                }
            }

            if now.saturating_sub(brain.last_shot_at) > SHOT_INTERVAL_MS {
                let target = nearest_player(arena, &self.ids, &snap.pos);
                if let Some(target) = target {
                    snap.rot_y = PhysicsSystem::yaw_towards(&snap.pos, &target);
                    // the throw starts from the stored position
                    arena.world.set(snap.clone());
                    let dir = Vec3::new(
                        target.x - snap.pos.x,
                        (target.y + AIM_HEIGHT) - (snap.pos.y + arena.rules.ballistics.hand_height),
                        target.z - snap.pos.z,
                    );
                    arena.fire(&brain.id, Uuid::new_v4().to_string(), dir, now, false);
                }
                brain.last_shot_at = now;
            }

            snap.updated_at = now;
            arena.pending.enqueue(snap.to_delta());
            arena.world.set(snap);
        }
    }
}

/// Random point in the central 75% of the map, outside the landmark radius
fn bot_spawn(arena: &mut ArenaState) -> Vec3 {
    let half = arena.settings.bounds.half;
    let span = half * 1.5;
    let mut x = 0.0;
    let mut z = 0.0;
    for _ in 0..SPAWN_ATTEMPTS {
        x = (arena.rng().gen::<f64>() - 0.5) * span;
        z = (arena.rng().gen::<f64>() - 0.5) * span;
        if x.hypot(z) > LANDMARK_RADIUS {
            break;
        }
    }
    let pos = arena.settings.bounds.clamp(Vec3::new(x, 0.0, z));
    pos.with_y(terrain_height(arena.settings.seed, pos.x, pos.z))
}

/// Wander point 10 to 30 units from `from`, clamped into the map
fn wander_target(arena: &mut ArenaState, from: Vec3) -> Vec3 {
    let bounds = arena.settings.bounds;
    let mut point = from;
    for _ in 0..WANDER_ATTEMPTS {
        let angle = arena.rng().gen_range(0.0..TAU);
        let distance = arena.rng().gen_range(10.0..30.0);
        point = bounds.clamp(Vec3::new(
            from.x + angle.cos() * distance,
            0.0,
            from.z + angle.sin() * distance,
        ));
        if point.x.hypot(point.z) > LANDMARK_RADIUS {
            break;
        }
    }
    point.with_y(terrain_height(arena.settings.seed, point.x, point.z))
}

/// Feet of the closest living human, by horizontal distance
fn nearest_player(arena: &ArenaState, bots: &HashSet<PlayerId>, from: &Vec3) -> Option<Vec3> {
    arena
        .world
        .values()
        .filter(|p| !bots.contains(&p.id) && !p.is_dead())
        .map(|p| (p.pos, p.pos.horizontal_distance(from)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(pos, _)| pos)
}
