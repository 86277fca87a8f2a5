//! File transport (spec §4.6): encrypt-to-temp-file send path, and the
//! receive path invoked by [`crate::peer::listener`] on a FILE frame.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config;
use crate::crypto::stream_codec;
use crate::error::{CoreError, CoreResult};
use crate::frame::{self, FrameType};
use crate::peer::state::Peer;
use crate::rand_source;

fn temp_path() -> PathBuf {
    std::env::temp_dir().join(rand_source::random_name(10))
}

/// Encrypts `path` to a temp file, sends it as a FILE frame to `addr`, then
/// removes the temp file. Progress reflects bytes of the *encrypted* file
/// (spec §4.6).
pub async fn send_file(peer: &Arc<Peer>, addr: std::net::SocketAddr, path: &Path) -> CoreResult<()> {
    let filename = path
        .file_name()
        .ok_or_else(|| CoreError::Frame("file path has no basename".into()))?
        .to_string_lossy()
        .into_owned();

    let (key, iv, mode) = {
        let inner = peer.inner.lock().await;
        (inner.session.aes_key.clone(), inner.session.iv_array()?, inner.session.cipher_mode)
    };

    let encrypted_filename = stream_codec::encrypt_bytes(mode, &key, iv, filename.as_bytes())?;

    let source_path = path.to_path_buf();
    let temp = temp_path();
    let temp_for_encrypt = temp.clone();
    let started = Instant::now();
    let progress = peer.progress.clone();
    tokio::task::spawn_blocking(move || -> CoreResult<()> {
        let mut src = std::fs::File::open(&source_path)?;
        let plaintext_len = src.metadata()?.len();
        let mut dst = std::fs::File::create(&temp_for_encrypt)?;
        stream_codec::encrypt(mode, &key, iv, plaintext_len, &mut src, &mut dst)?;
        progress.encryption_progress(1.0, started.elapsed());
        Ok(())
    })
    .await
    .map_err(|e| CoreError::CryptoInternal(format!("encrypt task panicked: {e}")))??;

    let result = send_encrypted_file(peer, addr, &encrypted_filename, &temp).await;
    let _ = std::fs::remove_file(&temp);
    result
}

async fn send_encrypted_file(
    peer: &Arc<Peer>,
    addr: std::net::SocketAddr,
    encrypted_filename: &[u8],
    encrypted_payload_path: &Path,
) -> CoreResult<()> {
    let payload_len = tokio::fs::metadata(encrypted_payload_path).await?.len();

    let mut stream = TcpStream::connect(addr).await?;
    frame::write_header(&mut stream, FrameType::File).await?;
    stream.write_all(&frame::encode_ascii_field(encrypted_filename.len() as u64)).await?;
    stream.write_all(&frame::encode_ascii_field(payload_len)).await?;
    stream.write_all(encrypted_filename).await?;

    let mut file = tokio::fs::File::open(encrypted_payload_path).await?;
    let mut buf = vec![0u8; config::FILE_CHUNK_LEN];
    let mut sent = 0u64;
    let started = Instant::now();
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        stream.write_all(&buf[..n]).await?;
        sent += n as u64;
        peer.progress.upload_progress(sent as f64 / payload_len.max(1) as f64, started.elapsed());
    }

    let mut ack = [0u8; 2];
    stream.read_exact(&mut ack).await?;
    if ack != frame::ACK {
        return Err(CoreError::Frame(format!("expected OK ack after file send, got {ack:?}")));
    }
    Ok(())
}

/// Reads a FILE frame's payload off an already-accepted connection, decrypts
/// it into `receive_directory`, and reports progress (spec §4.6). The
/// caller ([`crate::peer::listener`]) writes the frame-level acknowledgement
/// afterward.
pub async fn receive_file(peer: &Arc<Peer>, stream: &mut TcpStream) -> CoreResult<()> {
    let mut filename_len_field = [0u8; config::FILE_FIELD_WIDTH];
    stream.read_exact(&mut filename_len_field).await?;
    let filename_len = frame::decode_ascii_field(&filename_len_field)? as usize;

    let mut file_size_field = [0u8; config::FILE_FIELD_WIDTH];
    stream.read_exact(&mut file_size_field).await?;
    let file_size = frame::decode_ascii_field(&file_size_field)?;

    let mut encrypted_filename = vec![0u8; filename_len];
    stream.read_exact(&mut encrypted_filename).await?;

    let (key, iv, mode) = {
        let inner = peer.inner.lock().await;
        (inner.session.aes_key.clone(), inner.session.iv_array()?, inner.session.cipher_mode)
    };

    let filename = stream_codec::decrypt_bytes(mode, &key, iv, &encrypted_filename)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| rand_source::random_name(10));

    let temp = temp_path();
    {
        let mut temp_file = tokio::fs::File::create(&temp).await?;
        let mut buf = vec![0u8; config::FILE_CHUNK_LEN];
        let mut received = 0u64;
        let started = Instant::now();
        while received < file_size {
            let want = (file_size - received).min(buf.len() as u64) as usize;
            let n = stream.read(&mut buf[..want]).await?;
            if n == 0 {
                return Err(CoreError::TruncatedStream);
            }
            temp_file.write_all(&buf[..n]).await?;
            received += n as u64;
            peer.progress.download_progress(received as f64 / file_size.max(1) as f64, started.elapsed());
        }
    }

    tokio::fs::create_dir_all(&peer.receive_directory).await?;
    let dest = peer.receive_directory.join(&filename);
    let temp_for_decrypt = temp.clone();
    let started = Instant::now();
    let progress = peer.progress.clone();
    let result = tokio::task::spawn_blocking(move || -> CoreResult<()> {
        let mut src = std::fs::File::open(&temp_for_decrypt)?;
        let mut dst = std::fs::File::create(&dest)?;
        stream_codec::decrypt(mode, &key, iv, file_size, &mut src, &mut dst)?;
        progress.decryption_progress(1.0, started.elapsed());
        Ok(())
    })
    .await
    .map_err(|e| CoreError::CryptoInternal(format!("decrypt task panicked: {e}")))?;

    let _ = std::fs::remove_file(&temp);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::rsa as core_rsa;
    use crate::progress::NullProgressSink;
    use tokio::net::TcpListener;

    async fn make_connected_peer(listen_port: u16) -> Arc<Peer> {
        let (sk, pk) = core_rsa::generate_keypair(1024).unwrap();
        let pem = core_rsa::public_key_to_pem(&pk).unwrap().into_bytes();
        let dir = tempfile::tempdir().unwrap();
        let peer = Peer::new(sk, pk, pem, listen_port, dir.into_path(), Arc::new(NullProgressSink));
        {
            let mut inner = peer.inner.lock().await;
            inner.connected = true;
            inner.phase = crate::peer::PeerPhase::Connected;
            inner.session = crate::session::SessionParameters::from_conn_props(
                0,
                16,
                16,
                1,
                vec![5u8; 16],
                vec![6u8; 16],
                None,
            );
        }
        Arc::new(peer)
    }

    #[tokio::test]
    async fn file_send_and_receive_roundtrip() {
        let sender = make_connected_peer(0).await;
        let receiver = make_connected_peer(0).await;
        // Both peers must agree on session parameters to decrypt each other's frames.
        {
            let mut inner = receiver.inner.lock().await;
            inner.session = sender.inner.lock().await.session.clone();
        }

        let src_dir = tempfile::tempdir().unwrap();
        let src_path = src_dir.path().join("report.bin");
        let contents = vec![0x5Au8; 1024];
        std::fs::write(&src_path, &contents).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let receiver_clone = receiver.clone();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            assert!(frame::read_magic(&mut stream).await.unwrap());
            assert_eq!(frame::read_type(&mut stream).await.unwrap(), FrameType::File);
            receive_file(&receiver_clone, &mut stream).await.unwrap();
            stream.write_all(&frame::ACK).await.unwrap();
        });

        send_file(&sender, addr, &src_path).await.unwrap();
        server.await.unwrap();

        let received = std::fs::read(receiver.receive_directory.join("report.bin")).unwrap();
        assert_eq!(received, contents);
    }
}
