//! Multi-task scenarios that need a live tokio runtime and real TCP sockets
//! on 127.0.0.1: full handshake, cipher-mode switch, file transfer, keep-alive
//! disconnect detection, and rogue-IP rejection while connected.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use peerlink::crypto::rsa as core_rsa;
use peerlink::frame::{self, FrameType, HelloPayload};
use peerlink::keystore;
use peerlink::peer::{handshake, listener, Peer};
use peerlink::progress::ProgressSink;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::timeout;

/// Captures every `show_message` call and the latest connected state, so
/// tests can assert on what a peer actually surfaced instead of only on its
/// internal phase.
#[derive(Default)]
struct RecordingProgress {
    messages: Mutex<Vec<String>>,
    connected: AtomicBool,
}

impl ProgressSink for RecordingProgress {
    fn encryption_progress(&self, _fraction: f64, _elapsed: Duration) {}
    fn decryption_progress(&self, _fraction: f64, _elapsed: Duration) {}
    fn upload_progress(&self, _fraction: f64, _elapsed: Duration) {}
    fn download_progress(&self, _fraction: f64, _elapsed: Duration) {}

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn change_address(&self, _addr: &str) {}

    fn show_message(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

struct TestPeer {
    peer: Arc<Peer>,
    progress: Arc<RecordingProgress>,
    addr: SocketAddr,
    listener_task: tokio::task::JoinHandle<()>,
}

async fn spawn_test_peer(bits: usize) -> TestPeer {
    let keystore_dir = tempfile::tempdir().unwrap();
    let receive_dir = tempfile::tempdir().unwrap();
    let (private_key, public_key) = keystore::create(keystore_dir.path(), "hunter2", bits).unwrap();
    let public_key_pem = core_rsa::public_key_to_pem(&public_key).unwrap().into_bytes();

    let progress = Arc::new(RecordingProgress::default());
    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    // Reserve a port by binding it once up front; dropped immediately so
    // `listener::run` can bind the same port itself (the interval between
    // the two binds is negligible for a single-process test run).
    let probe = tokio::net::TcpListener::bind(bind_addr).await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let peer = Arc::new(Peer::new(
        private_key,
        public_key,
        public_key_pem,
        addr.port(),
        PathBuf::from(receive_dir.path()),
        progress.clone() as Arc<dyn ProgressSink>,
    ));
    // Keep the temp directories alive for the duration of the test process
    // by leaking them; they're process-scoped scratch space for the test.
    std::mem::forget(keystore_dir);
    std::mem::forget(receive_dir);

    let run_peer = peer.clone();
    let listener_task = tokio::spawn(async move {
        let _ = listener::run(run_peer, addr).await;
    });

    // Give the listener a moment to actually bind before anyone connects.
    tokio::time::sleep(Duration::from_millis(20)).await;

    TestPeer { peer, progress, addr, listener_task }
}

async fn wait_connected(peer: &Peer) {
    timeout(Duration::from_secs(5), async {
        loop {
            if peer.is_connected().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("peers did not reach CONNECTED in time");
}

async fn handshake_peers(a: &TestPeer, b: &TestPeer) {
    {
        let mut inner = a.peer.inner.lock().await;
        inner.phase = peerlink::peer::PeerPhase::AwaitingHelloResponse;
    }
    handshake::send_hello(b.addr, a.addr.port(), &a.peer.local_public_key_pem)
        .await
        .unwrap();
    wait_connected(&a.peer).await;
    wait_connected(&b.peer).await;
}

#[tokio::test]
async fn full_handshake_then_text_message_round_trips() {
    let a = spawn_test_peer(1024).await;
    let b = spawn_test_peer(1024).await;
    handshake_peers(&a, &b).await;
    assert!(a.progress.connected.load(Ordering::SeqCst));
    assert!(b.progress.connected.load(Ordering::SeqCst));

    handshake::send_text(&a.peer, b.addr, b"hello from a").await.unwrap();

    timeout(Duration::from_secs(5), async {
        loop {
            if b.progress.messages.lock().unwrap().iter().any(|m| m == "hello from a") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("text message never arrived");

    a.listener_task.abort();
    b.listener_task.abort();
}

#[tokio::test]
async fn cipher_mode_switch_is_honored_for_subsequent_messages() {
    let a = spawn_test_peer(1024).await;
    let b = spawn_test_peer(1024).await;
    handshake_peers(&a, &b).await;

    let b_public_key = {
        let inner = a.peer.inner.lock().await;
        inner.remote_public_key.clone().unwrap()
    };
    // Switch to CFB (mode byte 2); the receiver applies it only once
    // CONNECTED, which both peers already are. Sending it also updates A's
    // own session so the follow-up TEXT below is encrypted under CFB too.
    handshake::send_cipher_mode(&a.peer, b.addr, &b_public_key, 2).await.unwrap();

    timeout(Duration::from_secs(5), async {
        loop {
            if b.peer.inner.lock().await.session.cipher_mode == peerlink::crypto::modes::CipherMode::Cfb {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("cipher mode switch was never applied");

    assert_eq!(a.peer.inner.lock().await.session.cipher_mode, peerlink::crypto::modes::CipherMode::Cfb);
    handshake::send_text(&a.peer, b.addr, b"over cfb now").await.unwrap();

    timeout(Duration::from_secs(5), async {
        loop {
            if b.progress.messages.lock().unwrap().iter().any(|m| m == "over cfb now") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("text message under the new cipher mode never arrived");

    a.listener_task.abort();
    b.listener_task.abort();
}

#[tokio::test]
async fn file_transfer_delivers_matching_bytes() {
    let a = spawn_test_peer(1024).await;
    let b = spawn_test_peer(1024).await;
    handshake_peers(&a, &b).await;

    let src_dir = tempfile::tempdir().unwrap();
    let src_path = src_dir.path().join("note.txt");
    let payload = b"the quick brown fox jumps over the lazy dog".repeat(64);
    std::fs::write(&src_path, &payload).unwrap();

    peerlink::transfer::send_file(&a.peer, b.addr, &src_path).await.unwrap();

    let dest_path = b.peer.receive_directory.join("note.txt");
    timeout(Duration::from_secs(5), async {
        loop {
            if dest_path.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("file never arrived at the receiver");

    let received = std::fs::read(&dest_path).unwrap();
    assert_eq!(received, payload);

    a.listener_task.abort();
    b.listener_task.abort();
}

#[tokio::test]
async fn keepalive_disconnects_when_peer_goes_away() {
    let a = spawn_test_peer(1024).await;
    let b = spawn_test_peer(1024).await;
    handshake_peers(&a, &b).await;

    // Simulate B vanishing without a clean disconnect.
    b.listener_task.abort();

    timeout(Duration::from_secs(5), async {
        loop {
            if !a.peer.is_connected().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("peer A never noticed B disappearing");

    a.listener_task.abort();
}

#[tokio::test]
async fn connection_from_a_different_ip_is_rejected_while_connected() {
    let a = spawn_test_peer(1024).await;
    let b = spawn_test_peer(1024).await;
    handshake_peers(&a, &b).await;

    let established_remote = b.peer.inner.lock().await.remote_ip;
    assert_eq!(established_remote, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));

    // Connect to B from a distinct loopback address (127.0.0.2) and send a
    // HELLO; the admission rule in the listener must reject it silently
    // rather than replacing the already-established peer.
    let rogue_local: SocketAddr = "127.0.0.2:0".parse().unwrap();
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind(rogue_local).unwrap();
    let mut stream: TcpStream = socket.connect(b.addr).await.unwrap();

    frame::write_header(&mut stream, FrameType::Hello).await.unwrap();
    let (_rogue_sk, rogue_pk) = core_rsa::generate_keypair(1024).unwrap();
    let rogue_pem = core_rsa::public_key_to_pem(&rogue_pk).unwrap().into_bytes();
    HelloPayload { listen_port: 9999, pub_key_pem: rogue_pem }.write(&mut stream).await.unwrap();

    // The connection should be dropped without an ACK.
    let mut buf = [0u8; 2];
    let result = timeout(Duration::from_secs(2), stream.read_exact(&mut buf)).await;
    match result {
        Ok(Ok(_)) => panic!("rogue HELLO should not have been acknowledged"),
        Ok(Err(_)) | Err(_) => {}
    }

    assert_eq!(b.peer.inner.lock().await.remote_ip, established_remote);

    a.listener_task.abort();
    b.listener_task.abort();
}

#[tokio::test]
async fn keystore_round_trip_and_wrong_password_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let (sk, pk) = keystore::create(dir.path(), "correct horse battery staple", 1024).unwrap();

    let (sk2, pk2) = keystore::load(dir.path(), "correct horse battery staple").unwrap();
    assert_eq!(
        core_rsa::private_key_to_pem(&sk).unwrap(),
        core_rsa::private_key_to_pem(&sk2).unwrap()
    );
    assert_eq!(
        core_rsa::public_key_to_pem(&pk).unwrap(),
        core_rsa::public_key_to_pem(&pk2).unwrap()
    );

    let err = keystore::load(dir.path(), "wrong password").unwrap_err();
    assert!(matches!(err, peerlink::error::CoreError::KeystoreCorrupt));
}
