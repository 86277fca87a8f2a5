//! Peer-to-peer secure messaging and file-transfer core: handshake state
//! machine, frame codec, symmetric/asymmetric cryptography, keystore, and
//! file transport. The GUI and interactive console input are out of scope
//! (see `cli` for the minimal headless surface this crate does ship).

pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod keystore;
pub mod peer;
pub mod progress;
pub mod rand_source;
pub mod session;
pub mod transfer;
pub mod util;
