//! Uniform random bytes for keys, IVs, and temporary filenames.

use rand::rngs::OsRng;
use rand::RngCore;

pub fn fill(buf: &mut [u8]) {
    OsRng.fill_bytes(buf);
}

pub fn bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    fill(&mut buf);
    buf
}

const FILENAME_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random 10-character ASCII basename, used for temporary files and as a
/// fallback when a received filename fails to decrypt.
pub fn random_name(length: usize) -> String {
    let mut out = String::with_capacity(length);
    let mut idx = vec![0u8; length];
    fill(&mut idx);
    for b in idx {
        out.push(FILENAME_CHARSET[(b as usize) % FILENAME_CHARSET.len()] as char);
    }
    out
}
