//! Vector math, snowball ballistics and the shared terrain function

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Plain 3D vector as it travels on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector in the same direction; a zero vector is returned unchanged
    pub fn normalize(&self) -> Vec3 {
        let len = self.length();
        if len == 0.0 || !len.is_finite() {
            return *self;
        }
        *self * (1.0 / len)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Distance on the ground plane
    pub fn horizontal_distance(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    pub fn with_y(&self, y: f64) -> Vec3 {
        Vec3 { y, ..*self }
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;

    fn mul(self, s: f64) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
}

/// Map extents and plausibility limits
#[derive(Debug, Clone, Copy)]
pub struct MapBounds {
    /// Half extent of the square play area on X and Z
    pub half: f64,
    /// Extra slack accepted from clients beyond `half`
    pub tolerance: f64,
    /// Largest absolute height accepted from clients
    pub max_abs_y: f64,
}

impl Default for MapBounds {
    fn default() -> Self {
        Self {
            half: 95.0,
            tolerance: 5.0,
            max_abs_y: 5000.0,
        }
    }
}

impl MapBounds {
    /// Whether a client-reported position is physically plausible
    pub fn accepts(&self, pos: &Vec3) -> bool {
        let limit = self.half + self.tolerance;
        pos.is_finite() && pos.x.abs() <= limit && pos.z.abs() <= limit && pos.y.abs() <= self.max_abs_y
    }

    /// Clamp a position into the play area on X and Z
    pub fn clamp(&self, pos: Vec3) -> Vec3 {
        Vec3 {
            x: pos.x.clamp(-self.half, self.half),
            y: pos.y,
            z: pos.z.clamp(-self.half, self.half),
        }
    }
}

/// Projectile physics constants
#[derive(Debug, Clone, Copy)]
pub struct BallisticStats {
    /// Downward acceleration
    pub gravity: f64,
    /// Launch speed
    pub speed: f64,
    /// Simulated flight duration (seconds)
    pub flight_secs: f64,
    /// Number of discrete steps over the flight
    pub steps: u32,
    /// Launch height above the thrower's feet
    pub hand_height: f64,
}

impl Default for BallisticStats {
    fn default() -> Self {
        Self {
            gravity: 20.0,
            speed: 25.0,
            flight_secs: 3.0,
            steps: 60,
            hand_height: 1.3,
        }
    }
}

/// Target hitbox, a vertical cylinder standing on the target's feet
#[derive(Debug, Clone, Copy)]
pub struct Hitbox {
    pub radius: f64,
    pub height: f64,
}

impl Default for Hitbox {
    fn default() -> Self {
        Self {
            radius: 0.9,
            height: 2.2,
        }
    }
}

/// Physics helpers for projectiles and hitboxes
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Projectile position `t` seconds after launch under constant gravity
    pub fn position_at(origin: Vec3, v0: Vec3, gravity: f64, t: f64) -> Vec3 {
        Vec3 {
            x: origin.x + v0.x * t,
            y: origin.y + v0.y * t - 0.5 * gravity * t * t,
            z: origin.z + v0.z * t,
        }
    }

    /// Whether `point` lies inside the cylinder standing at `feet`
    pub fn intersects_cylinder(point: Vec3, feet: Vec3, hitbox: &Hitbox) -> bool {
        if point.horizontal_distance(&feet) > hitbox.radius {
            return false;
        }
        point.y >= feet.y && point.y <= feet.y + hitbox.height
    }

    /// Yaw that faces from `from` towards `to` (0 looks down +Z)
    pub fn yaw_towards(from: &Vec3, to: &Vec3) -> f64 {
        (to.x - from.x).atan2(to.z - from.z)
    }
}

/// Ground height at (x, z) for a world seed.
///
/// The client evaluates the same expression; keep both in lockstep.
pub fn terrain_height(seed: u32, x: f64, z: f64) -> f64 {
    let scale1 = 0.06;
    let scale2 = 0.12;
    let s = seed as f64 * 0.0001;
    let n1 = (x * scale1 + s * 13.37).sin() + (z * scale1 - s * 7.21).cos();
    let n2 = ((x + 1000.0) * scale2 - s * 3.17).sin() - ((z - 500.0) * scale2 + s * 9.99).cos();
    let h = n1 * 0.7 + n2 * 0.3;
    let sign = if h >= 0.0 { 1.0 } else { -1.0 };
    sign * h.abs().powf(1.8) * 2.5 + 6.0
}
