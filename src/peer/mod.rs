//! Handshake state machine, connection admission, and dispatch (spec §4.5).

pub mod handshake;
pub mod keepalive;
pub mod listener;
pub mod state;

pub use state::{Peer, PeerPhase};
