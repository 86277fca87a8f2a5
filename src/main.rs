use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use peerlink::cli::Cli;
use peerlink::config;
use peerlink::crypto::rsa as core_rsa;
use peerlink::keystore;
use peerlink::peer::{handshake, listener, state::PeerPhase, Peer};
use peerlink::progress::NullProgressSink;
use zeroize::Zeroize;

const KEYSTORE_DIR: &str = "./config";
const RECEIVE_DIR: &str = "./files";

fn prompt_password(prompt: &str) -> Result<String> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn open_keystore() -> Result<(rsa::RsaPrivateKey, rsa::RsaPublicKey)> {
    let dir = PathBuf::from(KEYSTORE_DIR);
    if dir.is_dir() {
        let mut password = prompt_password("keystore password: ")?;
        let result = keystore::load(&dir, &password).context("failed to unlock keystore");
        password.zeroize();
        result
    } else {
        let mut password = prompt_password("no keystore found; choose a password: ")?;
        let result = keystore::create(&dir, &password, config::DEFAULT_RSA_BITS).context("failed to create keystore");
        password.zeroize();
        result
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if !cli.console {
        anyhow::bail!("interactive GUI mode is not implemented in this build; rerun with --console");
    }
    let (private_key, public_key) = open_keystore()?;
    let public_key_pem = core_rsa::public_key_to_pem(&public_key)?.into_bytes();
    let fingerprint = keystore::fingerprint(&public_key)?;
    tracing::info!(%fingerprint, "local identity loaded");

    let progress: Arc<dyn peerlink::progress::ProgressSink> = Arc::new(NullProgressSink);
    let peer = Arc::new(Peer::new(
        private_key,
        public_key,
        public_key_pem.clone(),
        cli.port,
        PathBuf::from(RECEIVE_DIR),
        progress,
    ));

    let bind_addr: std::net::SocketAddr = format!("0.0.0.0:{}", cli.port)
        .parse()
        .context("invalid --port")?;

    let listener_peer = peer.clone();
    let listener_task = tokio::spawn(async move {
        if let Err(e) = listener::run(listener_peer, bind_addr).await {
            tracing::error!(error = %e, "listener exited");
        }
    });

    if let Some(addr_str) = cli.connect_addr() {
        let mut addrs = tokio::net::lookup_host(&addr_str).await.context("failed to resolve --connect address")?;
        let addr = addrs.next().context("--connect address resolved to no addresses")?;
        {
            let mut inner = peer.inner.lock().await;
            inner.phase = PeerPhase::AwaitingHelloResponse;
        }
        handshake::send_hello(addr, cli.port, &public_key_pem)
            .await
            .context("failed to send initial HELLO")?;
        tracing::info!(%addr, "sent HELLO");
    }

    listener_task.await.context("listener task panicked")?;
    Ok(())
}
