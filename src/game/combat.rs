//! Combat system - shot dedup, trajectory simulation, damage

use std::collections::HashMap;

use uuid::Uuid;

use crate::ws::protocol::PlayerSnapshot;

use super::physics::{BallisticStats, Hitbox, PhysicsSystem, Vec3};
use super::PlayerId;

/// Repeated shot ids are ignored for this long
pub const SHOT_DEDUP_MS: u64 = 10_000;

/// Health of a fresh or respawned player
pub const MAX_HP: u32 = 100;

/// Damage and knockback constants
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    /// hp removed per hit
    pub damage: u32,
    /// Length of the knockback impulse
    pub knockback_force: f64,
    /// Upward component mixed into the knockback direction
    pub knock_up: f64,
    /// Freeze window after death
    pub respawn_ms: u64,
}

impl Default for WeaponStats {
    fn default() -> Self {
        Self {
            damage: 10,
            knockback_force: 26.0,
            knock_up: 1.2,
            respawn_ms: 3000,
        }
    }
}

/// Everything the hit resolution needs to know about the rules
#[derive(Debug, Clone, Copy, Default)]
pub struct CombatRules {
    pub ballistics: BallisticStats,
    pub hitbox: Hitbox,
    pub weapon: WeaponStats,
}

/// Recently seen shot ids with their expiry
#[derive(Debug)]
pub struct ShotDedup {
    seen: HashMap<String, u64>,
    window_ms: u64,
}

impl Default for ShotDedup {
    fn default() -> Self {
        Self::new(SHOT_DEDUP_MS)
    }
}

impl ShotDedup {
    pub fn new(window_ms: u64) -> Self {
        Self {
            seen: HashMap::new(),
            window_ms,
        }
    }

    /// Returns true if the shot was already handled inside the window,
    /// otherwise records it and returns false.
    pub fn check_and_record(&mut self, shot_id: &str, now: u64) -> bool {
        if let Some(&expires) = self.seen.get(shot_id) {
            if expires > now {
                return true;
            }
        }
        self.seen.insert(shot_id.to_string(), now + self.window_ms);
        false
    }

    /// Forget expired shot ids
    pub fn sweep(&mut self, now: u64) {
        self.seen.retain(|_, expires| *expires > now);
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Accept a client shot id if it looks sane, otherwise mint one
pub fn sanitize_shot_id(raw: Option<&str>) -> String {
    match raw {
        Some(id) if (8..=64).contains(&id.len()) => id.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

/// First target struck by a shot
#[derive(Debug, Clone, PartialEq)]
pub struct Impact {
    pub victim_id: PlayerId,
    /// Seconds after launch
    pub t: f64,
}

/// Damage outcome for one victim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageResult {
    pub hp: u32,
    pub killed: bool,
}

/// Combat system for resolving thrown snowballs
pub struct CombatSystem;

impl CombatSystem {
    /// Launch point of a throw from a player standing at `feet`
    pub fn launch_origin(feet: Vec3, ballistics: &BallisticStats) -> Vec3 {
        Vec3::new(feet.x, feet.y + ballistics.hand_height, feet.z)
    }

    /// Step the trajectory against every candidate and return the earliest impact.
    ///
    /// Candidates are skipped when they are the shooter or dead. Each candidate
    /// keeps only its first intersection; a candidate stops being tested once the
    /// snowball is below ground. Ties in `t` go to the lowest player id, so the
    /// outcome does not depend on store iteration order.
    pub fn resolve<'a>(
        shooter_id: &PlayerId,
        origin: Vec3,
        dir: Vec3,
        candidates: impl IntoIterator<Item = &'a PlayerSnapshot>,
        rules: &CombatRules,
    ) -> Option<Impact> {
        let ballistics = &rules.ballistics;
        let v0 = dir * ballistics.speed;
        let steps = ballistics.steps.max(1);
        let dt = ballistics.flight_secs / steps as f64;

        let mut best: Option<Impact> = None;

        for target in candidates {
            if &target.id == shooter_id || target.is_dead() {
                continue;
            }

            for i in 0..=steps {
                let t = i as f64 * dt;
                let pos = PhysicsSystem::position_at(origin, v0, ballistics.gravity, t);
                if pos.y < 0.0 {
                    break;
                }
                if PhysicsSystem::intersects_cylinder(pos, target.pos, &rules.hitbox) {
                    let earlier = best.as_ref().map_or(true, |b| {
                        t < b.t || (t == b.t && target.id.as_str() < b.victim_id.as_str())
                    });
                    if earlier {
                        best = Some(Impact {
                            victim_id: target.id.clone(),
                            t,
                        });
                    }
                    break;
                }
            }
        }

        best
    }

    /// Impulse pushed onto a victim by a shot travelling along `dir`
    pub fn knockback(dir: Vec3, ballistics: &BallisticStats, weapon: &WeaponStats) -> Vec3 {
        let v0 = dir * ballistics.speed;
        Vec3::new(v0.x, weapon.knock_up, v0.z).normalize() * weapon.knockback_force
    }

    /// Apply damage to health, clamped at zero
    pub fn apply_damage(current_hp: u32, damage: u32) -> DamageResult {
        let hp = current_hp.saturating_sub(damage);
        DamageResult { hp, killed: hp == 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str, x: f64, y: f64, z: f64) -> PlayerSnapshot {
        PlayerSnapshot {
            id: PlayerId::from(id),
            name: id.to_string(),
            pos: Vec3::new(x, y, z),
            rot_y: 0.0,
            vel: Vec3::ZERO,
            hp: 100,
            crouch: false,
            dead_until: 0,
            updated_at: 0,
            ping_ms: None,
        }
    }

    fn shooter() -> PlayerId {
        PlayerId::from("shooter")
    }

    const ORIGIN: Vec3 = Vec3::new(0.0, 1.3, 0.0);
    const FORWARD: Vec3 = Vec3::new(0.0, 0.0, -1.0);

    #[test]
    fn test_level_throw_hits_target_within_range() {
        let rules = CombatRules::default();
        let targets = [target("t", 0.0, 0.0, -8.0)];
        let impact = CombatSystem::resolve(&shooter(), ORIGIN, FORWARD, &targets, &rules).unwrap();
        assert_eq!(impact.victim_id, PlayerId::from("t"));
        assert!(impact.t < 1.0);
        assert!((impact.t - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_level_throw_lands_short_of_ten_metres() {
        // From 1.3m the snowball reaches the ground at about t=0.36s, z=-9.0,
        // just short of a cylinder whose near edge is at z=-9.1.
        let rules = CombatRules::default();
        let targets = [target("t", 0.0, 0.0, -10.0)];
        assert!(CombatSystem::resolve(&shooter(), ORIGIN, FORWARD, &targets, &rules).is_none());
    }

    #[test]
    fn test_earliest_impact_wins_regardless_of_order() {
        let rules = CombatRules::default();
        let near = target("near", 0.0, 0.0, -4.0);
        let far = target("far", 0.0, 0.0, -7.5);

        let a = CombatSystem::resolve(&shooter(), ORIGIN, FORWARD, [&far, &near], &rules).unwrap();
        let b = CombatSystem::resolve(&shooter(), ORIGIN, FORWARD, [&near, &far], &rules).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.victim_id, PlayerId::from("near"));
        assert!((a.t - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let rules = CombatRules::default();
        let dir = Vec3::new(0.3, 0.2, -1.0).normalize();
        let targets = [
            target("a", 2.0, 0.0, -6.0),
            target("b", 3.0, 0.5, -11.0),
            target("c", -4.0, 0.0, -3.0),
        ];
        let first = CombatSystem::resolve(&shooter(), ORIGIN, dir, &targets, &rules);
        for _ in 0..10 {
            assert_eq!(CombatSystem::resolve(&shooter(), ORIGIN, dir, &targets, &rules), first);
        }
    }

    #[test]
    fn test_simultaneous_hits_pick_lowest_id() {
        let rules = CombatRules::default();
        let alice = target("alice", -0.5, 0.0, -5.0);
        let bob = target("bob", 0.5, 0.0, -5.0);

        let a = CombatSystem::resolve(&shooter(), ORIGIN, FORWARD, [&bob, &alice], &rules).unwrap();
        let b = CombatSystem::resolve(&shooter(), ORIGIN, FORWARD, [&alice, &bob], &rules).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.victim_id, PlayerId::from("alice"));

        // Fresh stores hash differently; the victim must not follow iteration order.
        for _ in 0..32 {
            let mut store = crate::game::world::WorldStore::new();
            store.set(bob.clone());
            store.set(alice.clone());
            let impact =
                CombatSystem::resolve(&shooter(), ORIGIN, FORWARD, store.values(), &rules).unwrap();
            assert_eq!(impact, a);
        }
    }

    #[test]
    fn test_shooter_and_dead_targets_are_excluded() {
        let rules = CombatRules::default();
        let own = target("shooter", 0.0, 0.0, -0.2);
        let mut corpse = target("corpse", 0.0, 0.0, -4.0);
        corpse.hp = 0;
        corpse.dead_until = u64::MAX;
        let alive = target("alive", 0.0, 0.0, -7.5);

        let impact =
            CombatSystem::resolve(&shooter(), ORIGIN, FORWARD, [&own, &corpse, &alive], &rules).unwrap();
        assert_eq!(impact.victim_id, PlayerId::from("alive"));
    }

    #[test]
    fn test_dedup_window() {
        let mut dedup = ShotDedup::new(10_000);
        assert!(!dedup.check_and_record("shot-1", 0));
        assert!(dedup.check_and_record("shot-1", 9_999));
        assert!(!dedup.check_and_record("shot-1", 10_000));

        dedup.sweep(25_000);
        assert!(dedup.is_empty());
    }

    #[test]
    fn test_apply_damage_clamps() {
        assert_eq!(CombatSystem::apply_damage(100, 10), DamageResult { hp: 90, killed: false });
        assert_eq!(CombatSystem::apply_damage(10, 10), DamageResult { hp: 0, killed: true });
        assert_eq!(CombatSystem::apply_damage(5, 10), DamageResult { hp: 0, killed: true });
    }

    #[test]
    fn test_knockback_has_configured_length() {
        let stats = BallisticStats::default();
        let weapon = WeaponStats::default();
        let impulse = CombatSystem::knockback(FORWARD, &stats, &weapon);
        assert!((impulse.length() - weapon.knockback_force).abs() < 1e-9);
        assert!(impulse.y > 0.0);
        assert!(impulse.z < 0.0);
    }

    #[test]
    fn test_sanitize_shot_id() {
        assert_eq!(sanitize_shot_id(Some("abcdefgh")), "abcdefgh");
        assert_ne!(sanitize_shot_id(Some("short")), "short");
        assert_eq!(sanitize_shot_id(None).len(), 36);
    }
}
