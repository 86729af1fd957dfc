//! Input validation for raw client requests

use std::fmt;

use crate::ws::protocol::MoveRequest;

use super::physics::{clamp_velocity, wrap_degrees};
use super::world::Player;

/// Exclusive bound on |x| and |y| of a move request
pub const MAX_MOVE_DELTA: f64 = 6.0;
/// Exclusive bound on |rot| of a move request
pub const MAX_ROT_DELTA: f64 = 10.0;
/// Scale from move delta to velocity impulse
pub const IMPULSE_SCALE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Rot,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => f.write_str("x"),
            Self::Y => f.write_str("y"),
            Self::Rot => f.write_str("rot"),
        }
    }
}

/// A request dropped before it reached the world
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum InputRejected {
    #[error("{axis} = {value} is outside ({lo}, {hi})")]
    OutOfRange {
        axis: Axis,
        value: f64,
        lo: f64,
        hi: f64,
    },
}

/// A move request that passed every bound
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidMove(MoveRequest);

/// Strict two-sided range test. NaN fails both comparisons.
fn check(axis: Axis, value: f64, bound: f64) -> Result<(), InputRejected> {
    let (lo, hi) = (-bound, bound);
    if lo < value && value < hi {
        Ok(())
    } else {
        Err(InputRejected::OutOfRange { axis, value, lo, hi })
    }
}

pub fn validate_move(req: MoveRequest) -> Result<ValidMove, InputRejected> {
    check(Axis::X, req.x, MAX_MOVE_DELTA)?;
    check(Axis::Y, req.y, MAX_MOVE_DELTA)?;
    check(Axis::Rot, req.rot, MAX_ROT_DELTA)?;
    Ok(ValidMove(req))
}

/// Apply an accepted move: deltas become velocity impulses, rotation wraps, boost is overwritten.
pub fn apply_move(player: &mut Player, mv: ValidMove) {
    let req = mv.0;
    // Clamped here as well as in the integrator so stored velocity never exceeds MAX_VELOCITY between ticks
    player.acc_x = clamp_velocity(player.acc_x + req.x * IMPULSE_SCALE);
    player.acc_y = clamp_velocity(player.acc_y + req.y * IMPULSE_SCALE);
    player.rot = wrap_degrees(player.rot + req.rot);
    player.boost = req.boost;
}
