//! WebSocket protocol message definitions
//! These are the wire types for client-server communication.
//!
//! Every frame is a JSON text message of the form `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transport-assigned session id, doubling as the player key
pub type ConnectionId = Uuid;

/// Stable projectile id, assigned at creation and never reused
pub type ProjectileId = u64;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Per-frame movement intent
    Move(MoveRequest),
    /// Fire request with a client-computed muzzle position
    Shoot(ShootRequest),
}

/// Raw movement deltas, validated before they touch the world
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Horizontal impulse, accepted in (-6, 6)
    pub x: f64,
    /// Vertical impulse, accepted in (-6, 6)
    pub y: f64,
    /// Rotation delta in degrees, accepted in (-10, 10)
    pub rot: f64,
    /// Thruster flag, shown by clients
    #[serde(default)]
    pub boost: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShootRequest {
    pub dir: Direction,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    pub x: f64,
    pub y: f64,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Initial sync for a new connection: full roster plus the assigned id
    Joined {
        players: Vec<PlayerRecord>,
        id: ConnectionId,
    },

    /// Another client joined
    NewPlayer(PlayerRecord),

    /// A projectile was fired
    NewBullet(ProjectileRecord),

    /// Per-tick projectile refresh
    UpdateBullet(ProjectileRecord),

    /// A projectile expired
    EndBullet { id: ProjectileId },

    /// Per-tick player refresh
    PlayerMoved(PlayerRecord),

    /// A client left
    PlayerDisconnected { id: ConnectionId },

    /// End-of-tick render barrier
    UpdateScreen,
}

impl ServerMsg {
    /// Wire event name, used for logging
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Joined { .. } => "joined",
            Self::NewPlayer(_) => "newPlayer",
            Self::NewBullet(_) => "newBullet",
            Self::UpdateBullet(_) => "updateBullet",
            Self::EndBullet { .. } => "endBullet",
            Self::PlayerMoved(_) => "playerMoved",
            Self::PlayerDisconnected { .. } => "playerDisconnected",
            Self::UpdateScreen => "updateScreen",
        }
    }
}

/// Player state as seen by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: ConnectionId,
    pub x: f64,
    pub y: f64,
    pub acc_x: f64,
    pub acc_y: f64,
    /// Rotation in degrees, [0, 360)
    pub rot: f64,
    pub name: String,
    pub boost: bool,
}

/// Projectile state as seen by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileRecord {
    pub id: ProjectileId,
    pub x: f64,
    pub y: f64,
    pub dir_x: f64,
    pub dir_y: f64,
    pub owner_id: ConnectionId,
}
