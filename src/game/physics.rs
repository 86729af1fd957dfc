//! Per-tick integration of players and projectiles

use crate::ws::protocol::ProjectileId;

use super::world::{Player, Projectile, World};

/// Units a projectile travels per tick
pub const PROJECTILE_SPEED: f64 = 4.0;
/// Velocity bound per axis
pub const MAX_VELOCITY: f64 = 10.0;
/// Denominator of the quadratic drag term
pub const DRAG_DIVISOR: f64 = 100.0;
/// Fraction of velocity added to position per tick
pub const POSITION_STEP: f64 = 0.5;

/// Clamp one velocity component to [-MAX_VELOCITY, MAX_VELOCITY]
pub fn clamp_velocity(v: f64) -> f64 {
    v.clamp(-MAX_VELOCITY, MAX_VELOCITY)
}

/// Wrap an angle in degrees into [0, 360)
pub fn wrap_degrees(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid rounds tiny negatives up to exactly 360
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Quadratic drag: decays faster at higher speed
fn drag(v: f64) -> f64 {
    v - v * v.abs() / DRAG_DIVISOR
}

/// What a tick removed
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub expired: Vec<ProjectileId>,
}

/// Physics system for advancing the world by one tick
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Drag, integrate, clamp. Touches only this player's fields.
    pub fn step_player(player: &mut Player) {
        player.acc_x = drag(player.acc_x);
        player.acc_y = drag(player.acc_y);

        player.x += player.acc_x * POSITION_STEP;
        player.y += player.acc_y * POSITION_STEP;

        player.acc_x = clamp_velocity(player.acc_x);
        player.acc_y = clamp_velocity(player.acc_y);
    }

    /// Move along the fixed direction; returns false once the projectile has lived `max_age` ticks
    pub fn step_projectile(projectile: &mut Projectile, max_age: u32) -> bool {
        projectile.x += projectile.dir_x * PROJECTILE_SPEED;
        projectile.y += projectile.dir_y * PROJECTILE_SPEED;
        projectile.age = projectile.age.saturating_add(1);
        projectile.age < max_age
    }

    /// Advance every projectile and player by one tick, removing expired projectiles
    pub fn integrate(world: &mut World, max_age: u32) -> TickReport {
        let mut report = TickReport::default();

        for (id, projectile) in world.projectiles_mut() {
            if !Self::step_projectile(projectile, max_age) {
                report.expired.push(id);
            }
        }
        for id in &report.expired {
            world.remove_projectile(*id);
        }

        for (_, player) in world.players_mut() {
            Self::step_player(player);
        }

        world.tick += 1;
        report
    }
}
