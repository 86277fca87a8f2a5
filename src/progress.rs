//! Abstract observer the core invokes; a GUI front end would supply a
//! concrete implementation, headless mode uses [`NullProgressSink`].
//!
//! Passed as a parameter to streaming operations rather than stored on the
//! session, to avoid a session↔transport↔UI reference cycle.

use std::time::Duration;

pub trait ProgressSink: Send + Sync {
    fn encryption_progress(&self, fraction: f64, elapsed: Duration);
    fn decryption_progress(&self, fraction: f64, elapsed: Duration);
    fn upload_progress(&self, fraction: f64, elapsed: Duration);
    fn download_progress(&self, fraction: f64, elapsed: Duration);
    fn set_connected(&self, connected: bool);
    fn change_address(&self, address: &str);
    fn show_message(&self, message: &str);
}

/// No-op sink used by `--console` mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn encryption_progress(&self, _fraction: f64, _elapsed: Duration) {}
    fn decryption_progress(&self, _fraction: f64, _elapsed: Duration) {}
    fn upload_progress(&self, _fraction: f64, _elapsed: Duration) {}
    fn download_progress(&self, _fraction: f64, _elapsed: Duration) {}

    fn set_connected(&self, connected: bool) {
        tracing::info!(connected, "connection state changed");
    }

    fn change_address(&self, address: &str) {
        tracing::info!(address, "peer address changed");
    }

    fn show_message(&self, message: &str) {
        tracing::info!(%message, "peer message");
    }
}
