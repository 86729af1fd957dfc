//! Outbound fan-out and the authoritative tick loop

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::ws::protocol::{ConnectionId, ServerMsg};

use super::physics::PhysicsSystem;
use super::world::{SharedWorld, World};

/// Who an envelope is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Only(ConnectionId),
    AllExcept(ConnectionId),
}

impl Audience {
    pub fn includes(&self, id: &ConnectionId) -> bool {
        match self {
            Self::All => true,
            Self::Only(target) => target == id,
            Self::AllExcept(excluded) => excluded != id,
        }
    }
}

/// A batch of events for one audience, delivered in order
#[derive(Debug, Clone)]
pub struct Envelope {
    pub audience: Audience,
    pub events: Arc<Vec<ServerMsg>>,
}

/// Shared sender side of the outbound channel
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<Envelope>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn send(&self, audience: Audience, events: Vec<ServerMsg>) {
        if events.is_empty() {
            return;
        }
        // No receivers just means nobody is connected
        let _ = self.tx.send(Envelope {
            audience,
            events: Arc::new(events),
        });
    }

    pub fn send_one(&self, audience: Audience, event: ServerMsg) {
        self.send(audience, vec![event]);
    }
}

/// How the driver waits between ticks
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickCadence {
    /// Delay of `per_player` times the player count (at least one player's worth)
    PerPlayer { per_player: Duration },
    /// Fixed rate; late ticks are skipped rather than bunched
    Fixed { ticks_per_second: u32 },
}

impl Default for TickCadence {
    fn default() -> Self {
        Self::PerPlayer {
            per_player: Duration::from_millis(10),
        }
    }
}

impl TickCadence {
    /// Delay after a tick in per-player mode
    pub fn per_player_delay(per_player: Duration, player_count: usize) -> Duration {
        let n = u32::try_from(player_count.max(1)).unwrap_or(u32::MAX);
        per_player.saturating_mul(n)
    }
}

/// Waits between ticks according to the cadence
enum Pacer {
    Sleep(Duration),
    Interval(Interval),
}

impl Pacer {
    fn new(cadence: TickCadence) -> Self {
        match cadence {
            TickCadence::PerPlayer { per_player } => Self::Sleep(per_player),
            TickCadence::Fixed { ticks_per_second } => {
                let period = Duration::from_secs(1) / ticks_per_second.max(1);
                let mut iv = interval(period);
                iv.set_missed_tick_behavior(MissedTickBehavior::Skip);
                Self::Interval(iv)
            }
        }
    }

    async fn wait(&mut self, player_count: usize) {
        match self {
            Self::Sleep(per_player) => {
                tokio::time::sleep(TickCadence::per_player_delay(*per_player, player_count)).await
            }
            Self::Interval(iv) => {
                iv.tick().await;
            }
        }
    }
}

/// Integrate one tick and build its broadcast batch.
///
/// Order: every live projectile, then expirations, then every player, then the render barrier.
pub fn run_tick(world: &mut World, projectile_max_age: u32) -> Vec<ServerMsg> {
    let report = PhysicsSystem::integrate(world, projectile_max_age);

    let mut events =
        Vec::with_capacity(world.projectile_count() + report.expired.len() + world.player_count() + 1);

    events.extend(
        world
            .projectiles()
            .map(|(id, p)| ServerMsg::UpdateBullet(p.to_record(id))),
    );
    events.extend(report.expired.into_iter().map(|id| ServerMsg::EndBullet { id }));
    events.extend(
        world
            .players()
            .map(|(id, p)| ServerMsg::PlayerMoved(p.to_record(*id))),
    );
    events.push(ServerMsg::UpdateScreen);

    events
}

/// Drives the simulation: lock, integrate, broadcast, wait, repeat
pub struct TickDriver {
    world: SharedWorld,
    outbound: Broadcaster,
    cadence: TickCadence,
    projectile_max_age: u32,
}

impl TickDriver {
    pub fn new(
        world: SharedWorld,
        outbound: Broadcaster,
        cadence: TickCadence,
        projectile_max_age: u32,
    ) -> Self {
        Self {
            world,
            outbound,
            cadence,
            projectile_max_age,
        }
    }

    /// Run one tick under the store lock; returns the player count for pacing
    pub fn step(&self) -> usize {
        let mut world = self.world.lock();
        let events = run_tick(&mut world, self.projectile_max_age);
        // Sent while locked so no join or leave can interleave with this tick's batch
        self.outbound.send(Audience::All, events);
        world.player_count()
    }

    /// Run the tick loop forever
    pub async fn run(self) {
        info!(cadence = ?self.cadence, "Tick loop started");
        let mut pacer = Pacer::new(self.cadence);

        loop {
            let player_count = self.step();
            if player_count > 0 {
                debug!(player_count, "Tick broadcast");
            }
            pacer.wait(player_count).await;
        }
    }
}
