//! Keep-alive loop (spec §4.7): every 2 seconds, ping the connected peer and
//! tear down the session on any failure to confirm liveness.

use std::sync::Arc;
use std::time::Duration;

use crate::config;

use super::handshake;
use super::state::Peer;

/// Spawns the keep-alive task and returns its handle. The loop exits on its
/// own once the peer disconnects — callers don't need to cancel it
/// explicitly (spec §5: no explicit cancellation tokens).
pub fn spawn(peer: Arc<Peer>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(config::KEEPALIVE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if !peer.is_connected().await {
                return;
            }
            let addr = match peer.remote_address().await {
                Some(addr) => addr,
                None => return,
            };
            match handshake::send_ping(addr).await {
                Ok(true) => continue,
                Ok(false) => {
                    tracing::info!(%addr, "peer reported not connected; disconnecting");
                    peer.disconnect().await;
                    return;
                }
                Err(e) => {
                    tracing::info!(%addr, error = %e, "ping failed; disconnecting");
                    peer.disconnect().await;
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::rsa as core_rsa;
    use crate::progress::NullProgressSink;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    async fn make_peer() -> Arc<Peer> {
        let (sk, pk) = core_rsa::generate_keypair(1024).unwrap();
        let pem = core_rsa::public_key_to_pem(&pk).unwrap().into_bytes();
        Arc::new(Peer::new(sk, pk, pem, 27001, std::path::PathBuf::from("."), Arc::new(NullProgressSink)))
    }

    #[tokio::test]
    async fn stops_when_peer_never_connects() {
        let peer = make_peer().await;
        let handle = spawn(peer.clone());
        // Not connected: the first tick should exit the loop promptly.
        tokio::time::timeout(Duration::from_secs(3), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn disconnects_on_unreachable_peer() {
        let peer = make_peer().await;
        {
            let mut inner = peer.inner.lock().await;
            inner.connected = true;
            inner.remote_ip = Some(IpAddr::V4(Ipv4Addr::LOCALHOST));
            inner.remote_listen_port = Some(1); // nothing listens here
        }
        let _: SocketAddr = peer.remote_address().await.unwrap();
        let handle = spawn(peer.clone());
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert!(!peer.is_connected().await);
    }
}
