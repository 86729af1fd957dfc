//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::{Broadcaster, ConnectionManager, SharedWorld, TickDriver, World};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub world: SharedWorld,
    pub outbound: Broadcaster,
    pub connections: ConnectionManager,
}

impl AppState {
    pub fn new(config: Config, seed: u64) -> Self {
        let config = Arc::new(config);

        // Single store guarded by one lock; empty at boot
        let world = World::shared(seed);

        let outbound = Broadcaster::new(config.outbound_capacity);
        let connections = ConnectionManager::new(world.clone(), outbound.clone());

        Self {
            config,
            world,
            outbound,
            connections,
        }
    }

    /// Tick driver bound to this state's world and outbound channel
    pub fn tick_driver(&self) -> TickDriver {
        TickDriver::new(
            self.world.clone(),
            self.outbound.clone(),
            self.config.tick_cadence,
            self.config.projectile_max_ticks,
        )
    }
}
