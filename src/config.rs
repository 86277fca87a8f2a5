//! Protocol constants as plain `const`s, plus a `ProtocolConfig` bundle for
//! callers that want to override them (e.g. in tests) instead of reaching
//! for the free-floating globals directly.

/// Frame header magic, big-endian on the wire.
pub const MAGIC: u32 = 0x1337_ABCD;

/// Default TCP listen port for a peer that doesn't override it.
pub const DEFAULT_PORT: u16 = 27002;

/// Fixed-size read buffer for HELLO/HELLO_RESPONSE payloads.
pub const HELLO_BUFFER_LEN: usize = 262_144;

/// Read/write chunk size for file transport.
pub const FILE_CHUNK_LEN: usize = 262_144;

/// Batching factor K: block-mode codec chunk size is `block_size * K`.
pub const BLOCK_CODEC_BATCH: usize = 16_384;

/// Width of the ASCII-decimal length fields in the FILE frame.
pub const FILE_FIELD_WIDTH: usize = 10;

/// Padding byte used to right-pad the FILE frame's ASCII length fields.
pub const FILE_FIELD_PAD: u8 = b':';

/// Interval between keep-alive pings once a peer is connected.
pub const KEEPALIVE_INTERVAL_SECS: u64 = 2;

/// RSA keypair size used by `keystore::create` when none is specified.
pub const DEFAULT_RSA_BITS: usize = 4096;

#[derive(Debug, Clone, Copy)]
pub struct ProtocolConfig {
    pub magic: u32,
    pub hello_buffer_len: usize,
    pub file_chunk_len: usize,
    pub block_codec_batch: usize,
    pub keepalive_interval_secs: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            magic: MAGIC,
            hello_buffer_len: HELLO_BUFFER_LEN,
            file_chunk_len: FILE_CHUNK_LEN,
            block_codec_batch: BLOCK_CODEC_BATCH,
            keepalive_interval_secs: KEEPALIVE_INTERVAL_SECS,
        }
    }
}
