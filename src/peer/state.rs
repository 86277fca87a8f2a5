//! Per-peer connection state and the handshake phase machine.
//!
//! `Peer` bundles everything a connection handler, the keep-alive loop, and
//! outbound senders need: the local identity, the negotiated session
//! parameters behind a single exclusive `tokio::sync::Mutex`, and the
//! progress sink. It deliberately does not hold a `TcpStream` — every
//! logical message opens its own connection.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use rsa::{RsaPrivateKey, RsaPublicKey};
use tokio::sync::Mutex;

use crate::progress::ProgressSink;
use crate::session::SessionParameters;

/// `AwaitingConnProps` is reached on both the initiator path (immediately
/// after HELLO_RESPONSE, before the CONN_PROPS send completes) and the
/// responder path (after sending HELLO_RESPONSE, before CONN_PROPS
/// arrives) — one named state covers both roles at that point in the
/// exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerPhase {
    Disconnected,
    AwaitingHelloResponse,
    UserConfirming,
    AwaitingConnProps,
    AwaitingConnPropsResponse,
    Connected,
}

pub struct PeerInner {
    pub phase: PeerPhase,
    pub connected: bool,
    pub remote_ip: Option<IpAddr>,
    pub remote_listen_port: Option<u16>,
    pub remote_public_key: Option<RsaPublicKey>,
    pub remote_public_key_pem: Option<Vec<u8>>,
    pub session: SessionParameters,
}

impl Default for PeerInner {
    fn default() -> Self {
        Self {
            phase: PeerPhase::Disconnected,
            connected: false,
            remote_ip: None,
            remote_listen_port: None,
            remote_public_key: None,
            remote_public_key_pem: None,
            session: SessionParameters::default(),
        }
    }
}

pub struct Peer {
    pub local_private_key: RsaPrivateKey,
    pub local_public_key: RsaPublicKey,
    pub local_public_key_pem: Vec<u8>,
    pub local_listen_port: u16,
    pub receive_directory: PathBuf,
    pub progress: Arc<dyn ProgressSink>,
    pub inner: Mutex<PeerInner>,
    /// Guards against spawning more than one keep-alive loop per peer
    /// across repeated CONNECTED transitions (spec §4.7).
    pub keepalive_started: AtomicBool,
}

impl Peer {
    pub fn new(
        local_private_key: RsaPrivateKey,
        local_public_key: RsaPublicKey,
        local_public_key_pem: Vec<u8>,
        local_listen_port: u16,
        receive_directory: PathBuf,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            local_private_key,
            local_public_key,
            local_public_key_pem,
            local_listen_port,
            receive_directory,
            progress,
            inner: Mutex::new(PeerInner::default()),
            keepalive_started: AtomicBool::new(false),
        }
    }

    /// `remote_ip:remote_listen_port` — the address outbound messages are
    /// sent to, *not* the source port of whichever inbound connection last
    /// carried a frame (spec §4.5).
    pub async fn remote_address(&self) -> Option<std::net::SocketAddr> {
        let inner = self.inner.lock().await;
        match (inner.remote_ip, inner.remote_listen_port) {
            (Some(ip), Some(port)) => Some(std::net::SocketAddr::new(ip, port)),
            _ => None,
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.connected
    }

    /// Transitions to disconnected, clearing the remote identity, and
    /// notifies the progress sink. Used both for a locally-initiated
    /// disconnect and a keep-alive failure (spec §4.7).
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        inner.connected = false;
        inner.phase = PeerPhase::Disconnected;
        inner.remote_ip = None;
        inner.remote_listen_port = None;
        drop(inner);
        self.keepalive_started.store(false, std::sync::atomic::Ordering::SeqCst);
        self.progress.set_connected(false);
    }
}
