//! World state store: players by connection id and projectiles by stable id.
//!
//! The store holds data only. Callers validate before mutating.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::ws::protocol::{ConnectionId, PlayerRecord, ProjectileId, ProjectileRecord};

/// Side length of the square players spawn in
pub const SPAWN_AREA: f64 = 500.0;

/// The store behind the single lock shared by connection handlers and the tick driver
pub type SharedWorld = Arc<Mutex<World>>;

/// Player state (authoritative)
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub x: f64,
    pub y: f64,
    pub acc_x: f64,
    pub acc_y: f64,
    /// Degrees, kept in [0, 360)
    pub rot: f64,
    pub name: String,
    pub boost: bool,
}

impl Player {
    pub fn new(x: f64, y: f64, name: String) -> Self {
        Self {
            x,
            y,
            acc_x: 0.0,
            acc_y: 0.0,
            rot: 0.0,
            name,
            boost: false,
        }
    }

    pub fn to_record(&self, id: ConnectionId) -> PlayerRecord {
        PlayerRecord {
            id,
            x: self.x,
            y: self.y,
            acc_x: self.acc_x,
            acc_y: self.acc_y,
            rot: self.rot,
            name: self.name.clone(),
            boost: self.boost,
        }
    }
}

/// Live projectile
#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    pub x: f64,
    pub y: f64,
    /// Direction as sent by the client, never renormalized
    pub dir_x: f64,
    pub dir_y: f64,
    /// Firing connection; may outlive the player
    pub owner_id: ConnectionId,
    /// Ticks lived
    pub age: u32,
}

impl Projectile {
    pub fn new(x: f64, y: f64, dir_x: f64, dir_y: f64, owner_id: ConnectionId) -> Self {
        Self {
            x,
            y,
            dir_x,
            dir_y,
            owner_id,
            age: 0,
        }
    }

    pub fn to_record(&self, id: ProjectileId) -> ProjectileRecord {
        ProjectileRecord {
            id,
            x: self.x,
            y: self.y,
            dir_x: self.dir_x,
            dir_y: self.dir_y,
            owner_id: self.owner_id,
        }
    }
}

/// Canonical world state. Empty at boot, never persisted.
pub struct World {
    players: HashMap<ConnectionId, Player>,
    projectiles: BTreeMap<ProjectileId, Projectile>,
    next_projectile_id: ProjectileId,
    /// Suffix for the next "Player N" name; never decremented
    joined_count: u64,
    /// Completed ticks
    pub tick: u64,
    rng: ChaCha8Rng,
}

impl World {
    pub fn new(seed: u64) -> Self {
        Self {
            players: HashMap::new(),
            projectiles: BTreeMap::new(),
            next_projectile_id: 0,
            joined_count: 0,
            tick: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn shared(seed: u64) -> SharedWorld {
        Arc::new(Mutex::new(Self::new(seed)))
    }

    /// Build a fresh player at a random spot in the spawn square with the next sequential name
    pub fn spawn_player(&mut self) -> Player {
        let x = self.rng.gen_range(0.0..SPAWN_AREA).floor();
        let y = self.rng.gen_range(0.0..SPAWN_AREA).floor();
        let name = format!("Player {}", self.joined_count);
        self.joined_count = self.joined_count.wrapping_add(1);
        Player::new(x, y, name)
    }

    pub fn player(&self, id: &ConnectionId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn player_mut(&mut self, id: &ConnectionId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn insert_player(&mut self, id: ConnectionId, player: Player) {
        self.players.insert(id, player);
    }

    pub fn remove_player(&mut self, id: &ConnectionId) -> Option<Player> {
        self.players.remove(id)
    }

    pub fn players(&self) -> impl Iterator<Item = (&ConnectionId, &Player)> {
        self.players.iter()
    }

    pub fn players_mut(&mut self) -> impl Iterator<Item = (&ConnectionId, &mut Player)> {
        self.players.iter_mut()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Append a projectile, returning its stable id
    pub fn push_projectile(&mut self, projectile: Projectile) -> ProjectileId {
        let id = self.next_projectile_id;
        self.next_projectile_id += 1;
        self.projectiles.insert(id, projectile);
        id
    }

    pub fn projectile(&self, id: ProjectileId) -> Option<&Projectile> {
        self.projectiles.get(&id)
    }

    /// Projectiles in creation order, each with its stable id
    pub fn projectiles(&self) -> impl Iterator<Item = (ProjectileId, &Projectile)> {
        self.projectiles.iter().map(|(id, p)| (*id, p))
    }

    pub fn projectiles_mut(&mut self) -> impl Iterator<Item = (ProjectileId, &mut Projectile)> {
        self.projectiles.iter_mut().map(|(id, p)| (*id, p))
    }

    pub fn remove_projectile(&mut self, id: ProjectileId) -> Option<Projectile> {
        self.projectiles.remove(&id)
    }

    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    /// Full roster for the `joined` event
    pub fn roster(&self) -> Vec<PlayerRecord> {
        self.players
            .iter()
            .map(|(id, p)| p.to_record(*id))
            .collect()
    }
}
