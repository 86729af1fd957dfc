//! Connection lifecycle: join, input dispatch, leave

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ws::protocol::{ClientMsg, ConnectionId, MoveRequest, ServerMsg, ShootRequest};

use super::broadcast::{Audience, Broadcaster, Envelope};
use super::validate::{apply_move, validate_move};
use super::world::{Projectile, SharedWorld};

/// Owns the join/leave protocol and routes client input into the world
#[derive(Clone)]
pub struct ConnectionManager {
    world: SharedWorld,
    outbound: Broadcaster,
}

impl ConnectionManager {
    pub fn new(world: SharedWorld, outbound: Broadcaster) -> Self {
        Self { world, outbound }
    }

    /// Register a new client.
    ///
    /// Every outbound send happens under the world lock, so subscribing inside it makes `joined`
    /// the first batch the new session sees, with nothing missed after it.
    pub fn connect(&self) -> (ConnectionHandler, Outbox) {
        let id = Uuid::new_v4();

        let mut world = self.world.lock();
        let outbound_rx = self.outbound.subscribe();
        let player = world.spawn_player();
        let record = player.to_record(id);
        world.insert_player(id, player);

        self.outbound.send_one(
            Audience::Only(id),
            ServerMsg::Joined {
                players: world.roster(),
                id,
            },
        );
        self.outbound
            .send_one(Audience::AllExcept(id), ServerMsg::NewPlayer(record.clone()));

        info!(
            connection_id = %id,
            name = %record.name,
            player_count = world.player_count(),
            "Player connected"
        );

        let handler = ConnectionHandler {
            id,
            manager: self.clone(),
        };
        let outbox = Outbox {
            id,
            rx: outbound_rx,
        };
        (handler, outbox)
    }

    /// Apply one client message. Unknown ids and out-of-range input are dropped.
    pub fn handle(&self, id: ConnectionId, msg: ClientMsg) {
        match msg {
            ClientMsg::Move(req) => self.handle_move(id, req),
            ClientMsg::Shoot(req) => self.handle_shoot(id, req),
        }
    }

    fn handle_move(&self, id: ConnectionId, req: MoveRequest) {
        let mv = match validate_move(req) {
            Ok(mv) => mv,
            Err(e) => {
                debug!(connection_id = %id, error = %e, "Dropped move");
                return;
            }
        };

        if let Some(player) = self.world.lock().player_mut(&id) {
            apply_move(player, mv);
        }
    }

    fn handle_shoot(&self, id: ConnectionId, req: ShootRequest) {
        let mut world = self.world.lock();
        if world.player(&id).is_none() {
            debug!(connection_id = %id, "Shoot from unknown connection");
            return;
        }

        let projectile_id =
            world.push_projectile(Projectile::new(req.x, req.y, req.dir.x, req.dir.y, id));

        if let Some(projectile) = world.projectile(projectile_id) {
            self.outbound.send_one(
                Audience::All,
                ServerMsg::NewBullet(projectile.to_record(projectile_id)),
            );
        }
    }

    /// Remove a client. Unknown or already-removed ids are a no-op.
    pub fn disconnect(&self, id: ConnectionId) {
        let mut world = self.world.lock();
        if world.remove_player(&id).is_none() {
            return;
        }
        self.outbound
            .send_one(Audience::AllExcept(id), ServerMsg::PlayerDisconnected { id });

        info!(
            connection_id = %id,
            player_count = world.player_count(),
            "Player disconnected"
        );
    }
}

/// One client session, bound to its id and an explicit handle on the manager
#[derive(Clone)]
pub struct ConnectionHandler {
    id: ConnectionId,
    manager: ConnectionManager,
}

impl ConnectionHandler {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn on_message(&self, msg: ClientMsg) {
        self.manager.handle(self.id, msg);
    }

    pub fn on_disconnect(&self) {
        self.manager.disconnect(self.id);
    }
}

/// Why a session's outbound stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OutboxError {
    /// Batches were overwritten before delivery; the client state can no longer be trusted
    #[error("fell behind by {0} batches")]
    Lagged(u64),

    #[error("outbound channel closed")]
    Closed,
}

/// Receiving end of the outbound stream, filtered to one connection
pub struct Outbox {
    id: ConnectionId,
    rx: broadcast::Receiver<Envelope>,
}

impl Outbox {
    /// Next batch addressed to this connection.
    ///
    /// Lag is an error rather than a skip: one-shot events such as `playerDisconnected` may be
    /// among the lost batches.
    pub async fn recv(&mut self) -> Result<Arc<Vec<ServerMsg>>, OutboxError> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) if envelope.audience.includes(&self.id) => return Ok(envelope.events),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => return Err(OutboxError::Lagged(n)),
                Err(broadcast::error::RecvError::Closed) => return Err(OutboxError::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::broadcast::TickDriver;
    use crate::game::world::World;
    use crate::ws::protocol::Direction;
    use std::collections::HashSet;

    struct Harness {
        manager: ConnectionManager,
        driver: TickDriver,
        world: SharedWorld,
    }

    fn harness() -> Harness {
        let world = World::shared(42);
        let outbound = Broadcaster::new(1024);
        Harness {
            manager: ConnectionManager::new(world.clone(), outbound.clone()),
            driver: TickDriver::new(world.clone(), outbound, Default::default(), 300),
            world,
        }
    }

    /// Everything currently queued for this outbox, in delivery order
    fn drain(outbox: &mut Outbox) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(envelope) = outbox.rx.try_recv() {
            if envelope.audience.includes(&outbox.id) {
                out.extend(envelope.events.iter().cloned());
            }
        }
        out
    }

    fn move_msg(x: f64, y: f64, rot: f64) -> ClientMsg {
        ClientMsg::Move(MoveRequest { x, y, rot, boost: false })
    }

    #[test]
    fn joined_contains_roster_including_self() {
        let h = harness();
        let (a, mut rx_a) = h.manager.connect();
        let (b, mut rx_b) = h.manager.connect();

        let a_events = drain(&mut rx_a);
        assert_eq!(a_events.len(), 2);
        match &a_events[0] {
            ServerMsg::Joined { players, id } => {
                assert_eq!(*id, a.id());
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].name, "Player 0");
            }
            other => panic!("expected joined, got {:?}", other),
        }
        assert!(matches!(&a_events[1], ServerMsg::NewPlayer(r) if r.id == b.id()));

        let b_events = drain(&mut rx_b);
        assert_eq!(b_events.len(), 1);
        match &b_events[0] {
            ServerMsg::Joined { players, id } => {
                assert_eq!(*id, b.id());
                let ids: HashSet<_> = players.iter().map(|p| p.id).collect();
                assert_eq!(ids, HashSet::from([a.id(), b.id()]));
            }
            other => panic!("expected joined, got {:?}", other),
        }
    }

    #[test]
    fn each_other_client_gets_exactly_one_new_player() {
        let h = harness();
        let (a, mut rx_a) = h.manager.connect();
        let (b, mut rx_b) = h.manager.connect();
        drain(&mut rx_a);
        drain(&mut rx_b);

        let (c, mut rx_c) = h.manager.connect();
        for rx in [&mut rx_a, &mut rx_b] {
            let events = drain(rx);
            let notices: Vec<_> = events
                .iter()
                .filter(|e| matches!(e, ServerMsg::NewPlayer(r) if r.id == c.id()))
                .collect();
            assert_eq!(notices.len(), 1);
        }
        let own = drain(&mut rx_c);
        assert!(!own.iter().any(|e| matches!(e, ServerMsg::NewPlayer(_))));
    }

    #[test]
    fn disconnect_notifies_others_once_and_vanishes_from_ticks() {
        let h = harness();
        let (a, mut rx_a) = h.manager.connect();
        let (b, mut rx_b) = h.manager.connect();
        drain(&mut rx_a);

        b.on_disconnect();
        b.on_disconnect();
        h.driver.step();
        h.driver.step();

        let events = drain(&mut rx_a);
        let gone = events
            .iter()
            .filter(|e| **e == ServerMsg::PlayerDisconnected { id: b.id() })
            .count();
        assert_eq!(gone, 1);
        assert!(!events
            .iter()
            .any(|e| matches!(e, ServerMsg::PlayerMoved(r) if r.id == b.id())));
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerMsg::PlayerMoved(r) if r.id == a.id())));

        let b_events = drain(&mut rx_b);
        assert!(!b_events
            .iter()
            .any(|e| matches!(e, ServerMsg::PlayerDisconnected { .. })));
    }

    #[test]
    fn valid_move_is_applied_and_invalid_is_dropped() {
        let h = harness();
        let (a, _rx) = h.manager.connect();

        a.on_message(move_msg(5.0, 0.0, 3.0));
        a.on_message(move_msg(6.0, 0.0, 0.0));
        a.on_message(move_msg(0.0, -100.0, 0.0));
        a.on_message(move_msg(0.0, 0.0, 10.0));

        let world = h.world.lock();
        let p = world.player(&a.id()).unwrap();
        assert!((p.acc_x - 0.5).abs() < 1e-12);
        assert_eq!(p.acc_y, 0.0);
        assert_eq!(p.rot, 3.0);
    }

    #[test]
    fn input_from_unknown_connection_is_ignored() {
        let h = harness();
        let (a, mut rx) = h.manager.connect();
        drain(&mut rx);

        let stranger = Uuid::new_v4();
        h.manager.handle(stranger, move_msg(1.0, 1.0, 1.0));
        h.manager.handle(
            stranger,
            ClientMsg::Shoot(ShootRequest {
                dir: Direction { x: 1.0, y: 0.0 },
                x: 0.0,
                y: 0.0,
            }),
        );
        h.manager.disconnect(stranger);

        assert_eq!(h.world.lock().projectile_count(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn shoot_is_broadcast_to_everyone_including_shooter() {
        let h = harness();
        let (a, mut rx_a) = h.manager.connect();
        let (b, mut rx_b) = h.manager.connect();
        drain(&mut rx_a);
        drain(&mut rx_b);

        a.on_message(ClientMsg::Shoot(ShootRequest {
            dir: Direction { x: 1.0, y: 0.0 },
            x: 50.0,
            y: 60.0,
        }));

        for rx in [&mut rx_a, &mut rx_b] {
            let events = drain(rx);
            assert_eq!(events.len(), 1);
            match &events[0] {
                ServerMsg::NewBullet(r) => {
                    assert_eq!((r.x, r.y, r.dir_x, r.dir_y), (50.0, 60.0, 1.0, 0.0));
                    assert_eq!(r.owner_id, a.id());
                }
                other => panic!("expected newBullet, got {:?}", other),
            }
        }

        h.driver.step();
        let events = drain(&mut rx_b);
        assert!(matches!(&events[0], ServerMsg::UpdateBullet(r) if r.x == 54.0));
    }

    #[test]
    fn projectile_outlives_its_owner() {
        let h = harness();
        let (a, _rx) = h.manager.connect();
        a.on_message(ClientMsg::Shoot(ShootRequest {
            dir: Direction { x: 0.0, y: -1.0 },
            x: 0.0,
            y: 0.0,
        }));
        a.on_disconnect();
        h.driver.step();

        let world = h.world.lock();
        let (_, p) = world.projectiles().next().unwrap();
        assert_eq!(p.owner_id, a.id());
        assert_eq!(p.y, -4.0);
    }

    #[test]
    fn single_impulse_decays_over_fifty_quiet_ticks() {
        let h = harness();
        let (a, _rx_a) = h.manager.connect();
        let (_b, _rx_b) = h.manager.connect();

        a.on_message(move_msg(5.0, 0.0, 0.0));
        h.driver.step();
        let after_first = h.world.lock().player(&a.id()).unwrap().acc_x;

        for _ in 1..50 {
            h.driver.step();
            let acc_x = h.world.lock().player(&a.id()).unwrap().acc_x;
            assert!(-10.0 < acc_x && acc_x < 10.0);
        }

        let last = h.world.lock().player(&a.id()).unwrap().acc_x;
        assert!(last.abs() < after_first.abs());
        assert!(last > 0.0);
    }

    #[tokio::test]
    async fn lagging_outbox_reports_lag_instead_of_skipping() {
        let world = World::shared(5);
        let outbound = Broadcaster::new(4);
        let manager = ConnectionManager::new(world.clone(), outbound.clone());
        let driver = TickDriver::new(world.clone(), outbound, Default::default(), 300);

        let (_a, mut outbox_a) = manager.connect();
        let (b, _outbox_b) = manager.connect();
        b.on_disconnect();
        for _ in 0..4 {
            driver.step();
        }

        // The playerDisconnected batch was overwritten; A must not carry on as if nothing happened
        assert!(matches!(outbox_a.recv().await, Err(OutboxError::Lagged(_))));
        assert!(world.lock().player(&b.id()).is_none());
    }

    #[tokio::test]
    async fn outbox_skips_batches_for_other_connections() {
        let h = harness();
        let (a, mut outbox_a) = h.manager.connect();
        let (_b, _outbox_b) = h.manager.connect();
        h.driver.step();

        let joined = outbox_a.recv().await.unwrap();
        assert!(matches!(&joined[0], ServerMsg::Joined { id, .. } if *id == a.id()));
        let notice = outbox_a.recv().await.unwrap();
        assert!(matches!(&notice[0], ServerMsg::NewPlayer(_)));
        let tick = outbox_a.recv().await.unwrap();
        assert_eq!(tick.last(), Some(&ServerMsg::UpdateScreen));
    }

    #[test]
    fn joined_is_first_even_while_ticking_concurrently() {
        let world = World::shared(11);
        let outbound = Broadcaster::new(8192);
        let manager = ConnectionManager::new(world.clone(), outbound.clone());
        let driver = TickDriver::new(world, outbound, Default::default(), 300);

        let ticker = std::thread::spawn(move || {
            for _ in 0..300 {
                driver.step();
            }
        });

        let mut sessions = Vec::new();
        for _ in 0..50 {
            sessions.push(manager.connect());
            std::thread::yield_now();
        }
        ticker.join().unwrap();

        for (handler, mut outbox) in sessions {
            let events = drain(&mut outbox);
            match events.first() {
                Some(ServerMsg::Joined { id, .. }) => assert_eq!(*id, handler.id()),
                other => panic!("first event was {:?}", other),
            }
        }
    }
}
