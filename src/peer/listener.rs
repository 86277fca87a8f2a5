//! TCP accept loop, admission rule, and per-frame-type dispatch (spec §4.5).
//!
//! Each accepted connection is handled by its own task and carries exactly
//! one logical message; the follow-up outbound sends a handler triggers
//! (e.g. HELLO → HELLO_RESPONSE) are themselves spawned as separate tasks so
//! a slow or unreachable peer never blocks this connection's acknowledgement
//! write.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use crate::crypto::rsa as core_rsa;
use crate::crypto::stream_codec;
use crate::error::CoreResult;
use crate::frame::{self, CipherModePlaintext, ConnPropsPlaintext, ConnPropsResponsePlaintext, FrameType, HelloPayload};
use crate::keystore;
use crate::rand_source;
use crate::session::SessionParameters;
use crate::transfer;

use super::handshake;
use super::keepalive;
use super::state::{Peer, PeerPhase};

fn start_keepalive_once(peer: &Arc<Peer>) {
    if peer
        .keepalive_started
        .compare_exchange(false, true, std::sync::atomic::Ordering::SeqCst, std::sync::atomic::Ordering::SeqCst)
        .is_ok()
    {
        keepalive::spawn(peer.clone());
    }
}

const TEXT_MAX_LEN: usize = 16 * 1024 * 1024;

pub async fn run(peer: Arc<Peer>, bind_addr: SocketAddr) -> CoreResult<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "listening");
    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };
        let peer = peer.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(peer, stream, remote).await {
                tracing::warn!(error = %e, %remote, "connection handler failed");
            }
        });
    }
}

async fn handle_connection(peer: Arc<Peer>, mut stream: TcpStream, remote: SocketAddr) -> CoreResult<()> {
    if !frame::read_magic(&mut stream).await? {
        tracing::debug!(%remote, "closed connection with bad magic");
        return Ok(());
    }

    {
        let inner = peer.inner.lock().await;
        if inner.connected && inner.remote_ip != Some(remote.ip()) {
            tracing::debug!(%remote, established = ?inner.remote_ip, "rejecting connection from non-peer IP");
            return Ok(());
        }
    }

    let ty = frame::read_type(&mut stream).await?;

    if ty == FrameType::Ping {
        handle_ping(&peer, &mut stream).await?;
        return Ok(());
    }

    match ty {
        FrameType::Hello => handle_hello(&peer, &mut stream, remote).await?,
        FrameType::HelloResponse => handle_hello_response(&peer, &mut stream, remote).await?,
        FrameType::ConnProps => handle_conn_props(&peer, &mut stream, remote).await?,
        FrameType::ConnPropsResponse => handle_conn_props_response(&peer, &mut stream, remote).await?,
        FrameType::CipherMode => handle_cipher_mode(&peer, &mut stream).await?,
        FrameType::Text => handle_text(&peer, &mut stream).await?,
        FrameType::File => transfer::receive_file(&peer, &mut stream).await?,
        FrameType::Ping => unreachable!("handled above"),
    }

    stream.write_all(&frame::ACK).await?;
    Ok(())
}

async fn handle_ping(peer: &Arc<Peer>, stream: &mut TcpStream) -> CoreResult<()> {
    let reply = if peer.is_connected().await { frame::PING_OK } else { frame::PING_NOT_CONNECTED };
    stream.write_all(&reply).await?;
    Ok(())
}

async fn handle_hello(peer: &Arc<Peer>, stream: &mut TcpStream, remote: SocketAddr) -> CoreResult<()> {
    let hello = HelloPayload::read(stream).await?;

    let already_connected = peer.inner.lock().await.connected;
    if already_connected {
        tracing::debug!(%remote, "ignoring HELLO while already connected");
        return Ok(());
    }

    let remote_public_key = core_rsa::import_public_key(&hello.pub_key_pem);
    let fingerprint = keystore::fingerprint(&remote_public_key)?;
    peer.progress.show_message(&format!("peer fingerprint: {fingerprint}"));

    let remote_listen_port = hello.listen_port.max(0) as u16;
    {
        let mut inner = peer.inner.lock().await;
        inner.remote_ip = Some(remote.ip());
        inner.remote_listen_port = Some(remote_listen_port);
        inner.remote_public_key = Some(remote_public_key);
        inner.remote_public_key_pem = Some(hello.pub_key_pem);
        // Headless mode auto-accepts; interactive confirmation is the
        // out-of-scope UI's responsibility (spec §1).
        inner.connected = true;
        inner.phase = PeerPhase::AwaitingConnProps;
    }
    peer.progress.set_connected(true);
    peer.progress.change_address(&format!("{}:{}", remote.ip(), remote_listen_port));

    let addr = SocketAddr::new(remote.ip(), remote_listen_port);
    let local_port = peer.local_listen_port;
    let local_pem = peer.local_public_key_pem.clone();
    tokio::spawn(async move {
        if let Err(e) = handshake::send_hello_response(addr, local_port, &local_pem).await {
            tracing::warn!(error = %e, "failed to send HELLO_RESPONSE");
        }
    });
    Ok(())
}

async fn handle_hello_response(peer: &Arc<Peer>, stream: &mut TcpStream, remote: SocketAddr) -> CoreResult<()> {
    let hello = HelloPayload::read(stream).await?;

    let expecting = peer.inner.lock().await.phase == PeerPhase::AwaitingHelloResponse;
    if !expecting {
        tracing::debug!(%remote, "ignoring unexpected HELLO_RESPONSE");
        return Ok(());
    }

    let remote_public_key = core_rsa::import_public_key(&hello.pub_key_pem);
    let remote_listen_port = hello.listen_port.max(0) as u16;

    // Initiator's own (pre-combination) contribution: CBC/AES-256 by
    // default for a fresh handshake (see DESIGN.md's Open Question entry).
    let key_size = 32u32;
    let block_size = 16u32;
    let aes_key = rand_source::bytes(key_size as usize);
    let iv = rand_source::bytes(block_size as usize);

    let session = SessionParameters {
        algorithm_id: 0,
        key_size,
        block_size,
        cipher_mode: crate::crypto::modes::CipherMode::Cbc,
        aes_key: aes_key.clone(),
        iv: iv.clone(),
        remote_public_key: Some(peer.local_public_key_pem.clone()),
    };

    {
        let mut inner = peer.inner.lock().await;
        inner.remote_ip = Some(remote.ip());
        inner.remote_listen_port = Some(remote_listen_port);
        inner.remote_public_key = Some(remote_public_key.clone());
        inner.remote_public_key_pem = Some(hello.pub_key_pem);
        inner.session = session;
        inner.phase = PeerPhase::AwaitingConnPropsResponse;
    }

    let plaintext = ConnPropsPlaintext {
        algorithm: 0,
        key_size,
        block_size,
        cipher_mode: crate::crypto::modes::CipherMode::Cbc.as_byte(),
        aes_key,
        iv,
    };
    let addr = SocketAddr::new(remote.ip(), remote_listen_port);
    tokio::spawn(async move {
        if let Err(e) = handshake::send_conn_props(addr, &remote_public_key, &plaintext).await {
            tracing::warn!(error = %e, "failed to send CONN_PROPS");
        }
    });
    Ok(())
}

async fn handle_conn_props(peer: &Arc<Peer>, stream: &mut TcpStream, remote: SocketAddr) -> CoreResult<()> {
    let ciphertext = frame::read_length_prefixed(stream, TEXT_MAX_LEN).await?;

    // Held for the full mutation below (phase check through the session/phase
    // write) so a concurrently-handled CIPHER_MODE or second CONN_PROPS can't
    // interleave with this one; the protocol gives no ordering guarantee
    // between logical messages (spec §5).
    let mut inner = peer.inner.lock().await;
    if inner.phase != PeerPhase::AwaitingConnProps {
        tracing::debug!(%remote, "ignoring unexpected CONN_PROPS");
        return Ok(());
    }

    let mut session = match core_rsa::decrypt(&peer.local_private_key, &ciphertext)
        .ok()
        .and_then(|pt| ConnPropsPlaintext::decode(&pt).ok())
    {
        Some(props) => SessionParameters::from_conn_props(
            props.algorithm,
            props.key_size,
            props.block_size,
            props.cipher_mode,
            props.aes_key,
            props.iv,
            None,
        ),
        None => {
            tracing::warn!(%remote, "CONN_PROPS failed to decrypt/decode; using default session parameters");
            SessionParameters::default()
        }
    };

    let own_key_contribution = rand_source::bytes(session.aes_key.len());
    let own_iv_contribution = rand_source::bytes(session.iv.len());
    session.combine(&own_key_contribution, &own_iv_contribution)?;

    let remote_public_key = inner
        .remote_public_key
        .clone()
        .ok_or_else(|| crate::error::CoreError::InvariantViolation("CONN_PROPS received before HELLO".into()))?;
    let remote_listen_port = inner.remote_listen_port.unwrap_or(0);

    inner.session = session;
    inner.phase = PeerPhase::Connected;
    drop(inner);

    peer.progress.set_connected(true);
    start_keepalive_once(peer);

    let response = ConnPropsResponsePlaintext {
        aes_key_contribution: own_key_contribution,
        iv_contribution: own_iv_contribution,
    };
    let addr = SocketAddr::new(remote.ip(), remote_listen_port);
    tokio::spawn(async move {
        if let Err(e) = handshake::send_conn_props_response(addr, &remote_public_key, &response).await {
            tracing::warn!(error = %e, "failed to send CONN_PROPS_RESPONSE");
        }
    });
    Ok(())
}

async fn handle_conn_props_response(peer: &Arc<Peer>, stream: &mut TcpStream, remote: SocketAddr) -> CoreResult<()> {
    let ciphertext = frame::read_length_prefixed(stream, TEXT_MAX_LEN).await?;

    let mut inner = peer.inner.lock().await;
    if inner.phase != PeerPhase::AwaitingConnPropsResponse {
        tracing::debug!(%remote, "ignoring unexpected CONN_PROPS_RESPONSE");
        return Ok(());
    }

    let key_size = inner.session.aes_key.len();
    let block_size = inner.session.iv.len();
    let decoded = core_rsa::decrypt(&peer.local_private_key, &ciphertext)
        .ok()
        .and_then(|pt| ConnPropsResponsePlaintext::decode(&pt, key_size, block_size).ok());

    match decoded {
        Some(resp) => {
            inner.session.combine(&resp.aes_key_contribution, &resp.iv_contribution)?;
        }
        None => {
            tracing::warn!(%remote, "CONN_PROPS_RESPONSE failed to decrypt/decode; using default session parameters");
            inner.session = SessionParameters::default();
        }
    }
    inner.phase = PeerPhase::Connected;
    drop(inner);
    peer.progress.set_connected(true);
    start_keepalive_once(peer);
    Ok(())
}

async fn handle_cipher_mode(peer: &Arc<Peer>, stream: &mut TcpStream) -> CoreResult<()> {
    let ciphertext = frame::read_length_prefixed(stream, 1024).await?;

    let mut inner = peer.inner.lock().await;
    if inner.phase != PeerPhase::Connected {
        tracing::debug!("ignoring CIPHER_MODE outside CONNECTED state");
        return Ok(());
    }

    match core_rsa::decrypt(&peer.local_private_key, &ciphertext)
        .ok()
        .and_then(|pt| CipherModePlaintext::decode(&pt).ok())
    {
        Some(cm) => inner.session.set_cipher_mode(cm.cipher_mode),
        None => {
            tracing::warn!("CIPHER_MODE failed to decrypt/decode; using default session parameters");
            inner.session = SessionParameters::default();
        }
    }
    Ok(())
}

async fn handle_text(peer: &Arc<Peer>, stream: &mut TcpStream) -> CoreResult<()> {
    let ciphertext = frame::read_text(stream, TEXT_MAX_LEN).await?;

    let connected = peer.inner.lock().await.phase == PeerPhase::Connected;
    if !connected {
        tracing::debug!("ignoring TEXT outside CONNECTED state");
        return Ok(());
    }

    let inner = peer.inner.lock().await;
    let key = inner.session.aes_key.clone();
    let iv = inner.session.iv_array()?;
    let mode = inner.session.cipher_mode;
    drop(inner);

    match stream_codec::decrypt_bytes(mode, &key, iv, &ciphertext) {
        Ok(plaintext) => match String::from_utf8(plaintext) {
            Ok(text) => peer.progress.show_message(&text),
            Err(_) => tracing::warn!("decrypted TEXT was not valid UTF-8"),
        },
        Err(e) => tracing::warn!(error = %e, "failed to decrypt TEXT"),
    }
    Ok(())
}
