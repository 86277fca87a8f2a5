//! Error taxonomy for the core protocol stack (spec §7).
//!
//! Transport/frame errors on inbound connections are logged and the
//! connection is closed; RSA decrypt failures during handshake fall back to
//! default session parameters; keystore errors are the only ones expected to
//! reach a user-facing prompt.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("frame error: {0}")]
    Frame(String),

    #[error("invalid key material: {0}")]
    CryptoKey(String),

    #[error("internal cipher failure: {0}")]
    CryptoInternal(String),

    #[error("ciphertext truncated before declared length")]
    TruncatedStream,

    #[error("keystore directory missing")]
    KeystoreMissing,

    #[error("keystore corrupt or wrong password")]
    KeystoreCorrupt,

    #[error("protocol invariant violated: {0}")]
    InvariantViolation(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
