//! Game simulation modules

pub mod broadcast;
pub mod connection;
pub mod physics;
pub mod validate;
pub mod world;

pub use broadcast::{Broadcaster, Envelope, TickCadence, TickDriver};
pub use connection::{ConnectionHandler, ConnectionManager, Outbox, OutboxError};
pub use world::{SharedWorld, World};
