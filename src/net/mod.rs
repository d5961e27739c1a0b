// nexus_gateway/src/net/mod.rs

pub mod connection;
pub mod server;

pub use connection::{ConnOutcome, Connection, SequenceCounter};
pub use server::GatewayServer;
