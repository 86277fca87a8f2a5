//! Outbound message sends: each opens its own short-lived TCP connection,
//! writes one frame, and — except PING, which has its own two-byte reply —
//! awaits the peer's `"OK"` acknowledgement before returning, so a send
//! looks synchronous from the caller's perspective.

use std::net::SocketAddr;
use std::sync::Arc;

use rsa::RsaPublicKey;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::crypto::rsa as core_rsa;
use crate::crypto::stream_codec;
use crate::error::{CoreError, CoreResult};
use crate::frame::{self, CipherModePlaintext, ConnPropsPlaintext, ConnPropsResponsePlaintext, FrameType, HelloPayload};

use super::state::Peer;

async fn expect_ack(stream: &mut TcpStream) -> CoreResult<()> {
    let mut ack = [0u8; 2];
    stream.read_exact(&mut ack).await?;
    if ack != frame::ACK {
        return Err(CoreError::Frame(format!("expected OK ack, got {ack:?}")));
    }
    Ok(())
}

pub async fn send_hello(addr: SocketAddr, listen_port: u16, pub_key_pem: &[u8]) -> CoreResult<()> {
    let mut stream = TcpStream::connect(addr).await?;
    frame::write_header(&mut stream, FrameType::Hello).await?;
    HelloPayload {
        listen_port: listen_port as i32,
        pub_key_pem: pub_key_pem.to_vec(),
    }
    .write(&mut stream)
    .await?;
    expect_ack(&mut stream).await
}

pub async fn send_hello_response(addr: SocketAddr, listen_port: u16, pub_key_pem: &[u8]) -> CoreResult<()> {
    let mut stream = TcpStream::connect(addr).await?;
    frame::write_header(&mut stream, FrameType::HelloResponse).await?;
    HelloPayload {
        listen_port: listen_port as i32,
        pub_key_pem: pub_key_pem.to_vec(),
    }
    .write(&mut stream)
    .await?;
    expect_ack(&mut stream).await
}

/// Sends CONN_PROPS (spec §4.4) encrypted under the responder's public key.
pub async fn send_conn_props(addr: SocketAddr, remote_pub_key: &RsaPublicKey, plaintext: &ConnPropsPlaintext) -> CoreResult<()> {
    let ciphertext = core_rsa::encrypt(remote_pub_key, &plaintext.encode())?;
    let mut stream = TcpStream::connect(addr).await?;
    frame::write_header(&mut stream, FrameType::ConnProps).await?;
    frame::write_length_prefixed(&mut stream, &ciphertext).await?;
    expect_ack(&mut stream).await
}

pub async fn send_conn_props_response(
    addr: SocketAddr,
    remote_pub_key: &RsaPublicKey,
    plaintext: &ConnPropsResponsePlaintext,
) -> CoreResult<()> {
    let ciphertext = core_rsa::encrypt(remote_pub_key, &plaintext.encode())?;
    let mut stream = TcpStream::connect(addr).await?;
    frame::write_header(&mut stream, FrameType::ConnPropsResponse).await?;
    frame::write_length_prefixed(&mut stream, &ciphertext).await?;
    expect_ack(&mut stream).await
}

/// Sends CIPHER_MODE (spec §4.5) encrypted under the remote peer's public
/// key, then applies the same mode to this peer's own session — the spec
/// states the exchange "updates both peers' cipher_mode field", and nothing
/// else observes the wire frame this peer just sent to update its own side.
pub async fn send_cipher_mode(peer: &Arc<Peer>, addr: SocketAddr, remote_pub_key: &RsaPublicKey, mode: u8) -> CoreResult<()> {
    let ciphertext = core_rsa::encrypt(remote_pub_key, &CipherModePlaintext { cipher_mode: mode }.encode())?;
    let mut stream = TcpStream::connect(addr).await?;
    frame::write_header(&mut stream, FrameType::CipherMode).await?;
    frame::write_length_prefixed(&mut stream, &ciphertext).await?;
    expect_ack(&mut stream).await?;
    peer.inner.lock().await.session.set_cipher_mode(mode);
    Ok(())
}

/// Encrypts `plaintext` under `peer`'s current session parameters and sends
/// it to `addr` as a TEXT frame (spec §4.4). The session lock is held only
/// for the duration of the encrypt call, never across the network
/// round-trip, mirroring [`crate::transfer::send_file`]'s lock-then-release
/// shape for the same field.
pub async fn send_text(peer: &Arc<Peer>, addr: SocketAddr, plaintext: &[u8]) -> CoreResult<()> {
    let ciphertext = {
        let inner = peer.inner.lock().await;
        let iv = inner.session.iv_array()?;
        stream_codec::encrypt_bytes(inner.session.cipher_mode, &inner.session.aes_key, iv, plaintext)?
    };
    let mut stream = TcpStream::connect(addr).await?;
    frame::write_header(&mut stream, FrameType::Text).await?;
    frame::write_text(&mut stream, &ciphertext).await?;
    expect_ack(&mut stream).await
}

/// Sends a PING and reports whether the peer replied `"OK"` (alive and
/// still considers itself connected). Any transport error or an `"NK"`
/// reply is reported as `Ok(false)` — the keep-alive loop treats both the
/// same way (spec §4.7).
pub async fn send_ping(addr: SocketAddr) -> CoreResult<bool> {
    let mut stream = TcpStream::connect(addr).await?;
    frame::write_header(&mut stream, FrameType::Ping).await?;
    stream.flush().await?;
    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;
    Ok(reply == frame::PING_OK)
}
