//! Per-peer session parameters (spec §3): the symmetric key material and
//! cipher choice negotiated during handshake and used for every TEXT/FILE
//! message afterward.
//!
//! Grounded on `original_source/encryptedmessagehandler.go`'s
//! `keySize`/`blockSize`/`cipherMode`/`aesKey`/`iv` globals, reshaped here
//! into an owned struct meant to live behind a `tokio::sync::Mutex` (see
//! [`crate::peer::state`]) instead of module-level mutable statics.

use zeroize::Zeroize;

use crate::crypto::block::BLOCK_SIZE;
use crate::crypto::modes::CipherMode;
use crate::error::{CoreError, CoreResult};

/// Default parameters substituted whenever decoded parameters violate an
/// invariant (spec §3): 32-byte (AES-256) key, 16-byte block/IV, ECB.
pub const DEFAULT_KEY_SIZE: u32 = 32;
pub const DEFAULT_BLOCK_SIZE: u32 = 16;

#[derive(Debug, Clone)]
pub struct SessionParameters {
    pub algorithm_id: u8,
    pub key_size: u32,
    pub block_size: u32,
    pub cipher_mode: CipherMode,
    pub aes_key: Vec<u8>,
    pub iv: Vec<u8>,
    /// PEM bytes of the remote peer's public key, learned from HELLO.
    pub remote_public_key: Option<Vec<u8>>,
}

impl Default for SessionParameters {
    fn default() -> Self {
        Self {
            algorithm_id: 0,
            key_size: DEFAULT_KEY_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            cipher_mode: CipherMode::Ecb,
            aes_key: vec![0u8; DEFAULT_KEY_SIZE as usize],
            iv: vec![0u8; DEFAULT_BLOCK_SIZE as usize],
            remote_public_key: None,
        }
    }
}

impl SessionParameters {
    /// Builds parameters from a decoded CONN_PROPS payload, enforcing the
    /// invariants of spec §3. Any violation yields [`Self::default`] rather
    /// than an error — this is a stated protocol rule, not a failure mode.
    pub fn from_conn_props(
        algorithm_id: u8,
        key_size: u32,
        block_size: u32,
        cipher_mode_byte: u8,
        aes_key: Vec<u8>,
        iv: Vec<u8>,
        remote_public_key: Option<Vec<u8>>,
    ) -> Self {
        let valid = block_size % 8 == 0
            && key_size % 8 == 0
            && cipher_mode_byte < 4
            && aes_key.len() as u32 == key_size
            && iv.len() as u32 == block_size;

        if !valid {
            tracing::warn!(
                key_size,
                block_size,
                cipher_mode_byte,
                "CONN_PROPS violated a session invariant; substituting defaults"
            );
            let mut defaults = Self::default();
            defaults.remote_public_key = remote_public_key;
            return defaults;
        }

        Self {
            algorithm_id,
            key_size,
            block_size,
            cipher_mode: CipherMode::from_byte(cipher_mode_byte).unwrap_or(CipherMode::Ecb),
            aes_key,
            iv,
            remote_public_key,
        }
    }

    /// Applies a CIPHER_MODE update (spec §4.5): an out-of-range mode byte
    /// resets silently to ECB rather than erroring.
    pub fn set_cipher_mode(&mut self, mode_byte: u8) {
        self.cipher_mode = CipherMode::from_byte(mode_byte).unwrap_or(CipherMode::Ecb);
    }

    /// XORs `key_contribution`/`iv_contribution` into this session's key and
    /// IV in place (spec §3's key combination rule). Lengths must match
    /// `key_size`/`block_size`; a mismatch is the caller's bug, not a wire
    /// condition the protocol tolerates, so it is reported as
    /// [`CoreError::InvariantViolation`].
    pub fn combine(&mut self, key_contribution: &[u8], iv_contribution: &[u8]) -> CoreResult<()> {
        if key_contribution.len() != self.aes_key.len() || iv_contribution.len() != self.iv.len() {
            return Err(CoreError::InvariantViolation(
                "key/iv contribution length does not match session parameters".into(),
            ));
        }
        for (b, c) in self.aes_key.iter_mut().zip(key_contribution) {
            *b ^= c;
        }
        for (b, c) in self.iv.iter_mut().zip(iv_contribution) {
            *b ^= c;
        }
        Ok(())
    }

    pub fn iv_array(&self) -> CoreResult<[u8; BLOCK_SIZE]> {
        self.iv
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::InvariantViolation("iv is not 16 bytes".into()))
    }
}

impl Drop for SessionParameters {
    fn drop(&mut self) {
        self.aes_key.zeroize();
        self.iv.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_cipher_mode_falls_back_to_defaults() {
        let params = SessionParameters::from_conn_props(0, 32, 16, 5, vec![0u8; 32], vec![0u8; 16], None);
        assert_eq!(params.cipher_mode, CipherMode::Ecb);
        assert_eq!(params.key_size, DEFAULT_KEY_SIZE);
        assert_eq!(params.block_size, DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn odd_block_size_falls_back_to_defaults() {
        let params = SessionParameters::from_conn_props(0, 32, 15, 0, vec![0u8; 32], vec![0u8; 15], None);
        assert_eq!(params.block_size, DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn valid_conn_props_are_adopted_verbatim() {
        let key = vec![7u8; 16];
        let iv = vec![9u8; 16];
        let params = SessionParameters::from_conn_props(0, 16, 16, 1, key.clone(), iv.clone(), None);
        assert_eq!(params.cipher_mode, CipherMode::Cbc);
        assert_eq!(params.aes_key, key);
        assert_eq!(params.iv, iv);
    }

    #[test]
    fn key_combination_is_xor_in_place() {
        let mut params = SessionParameters::from_conn_props(
            0,
            8,
            8,
            0,
            vec![0b1010_1010; 8],
            vec![0b0000_1111; 8],
            None,
        );
        params.combine(&[0b0101_0101; 8], &[0b1111_0000; 8]).unwrap();
        assert_eq!(params.aes_key, vec![0xFFu8; 8]);
        assert_eq!(params.iv, vec![0xFFu8; 8]);
    }

    #[test]
    fn mismatched_contribution_length_is_rejected() {
        let mut params = SessionParameters::default();
        let err = params.combine(&[0u8; 4], &[0u8; 16]).unwrap_err();
        assert!(matches!(err, CoreError::InvariantViolation(_)));
    }

    #[test]
    fn cipher_mode_update_resets_out_of_range_to_ecb() {
        let mut params = SessionParameters::default();
        params.cipher_mode = CipherMode::Ofb;
        params.set_cipher_mode(9);
        assert_eq!(params.cipher_mode, CipherMode::Ecb);
    }
}
