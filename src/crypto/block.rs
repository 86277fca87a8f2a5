//! AES-128/192/256 block primitive, dispatched at runtime on key length.
//!
//! This is the leaf the four mode adapters in [`super::modes`] are built on
//! top of — mirrors the corpus's habit of wrapping the raw RustCrypto block
//! cipher rather than reaching straight for an AEAD crate when the protocol
//! wants unauthenticated modes.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};

use crate::error::{CoreError, CoreResult};

pub const BLOCK_SIZE: usize = 16;

pub enum AesKey {
    Aes128(Box<Aes128>),
    Aes192(Box<Aes192>),
    Aes256(Box<Aes256>),
}

impl AesKey {
    pub fn new(key: &[u8]) -> CoreResult<Self> {
        match key.len() {
            16 => Ok(AesKey::Aes128(Box::new(Aes128::new_from_slice(key).map_err(
                |e| CoreError::CryptoKey(format!("aes-128 key: {e}")),
            )?))),
            24 => Ok(AesKey::Aes192(Box::new(Aes192::new_from_slice(key).map_err(
                |e| CoreError::CryptoKey(format!("aes-192 key: {e}")),
            )?))),
            32 => Ok(AesKey::Aes256(Box::new(Aes256::new_from_slice(key).map_err(
                |e| CoreError::CryptoKey(format!("aes-256 key: {e}")),
            )?))),
            n => Err(CoreError::CryptoKey(format!(
                "unsupported AES key length {n} (want 16, 24, or 32)"
            ))),
        }
    }

    pub fn encrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        let ga = aes::cipher::generic_array::GenericArray::from_mut_slice(block);
        match self {
            AesKey::Aes128(c) => c.encrypt_block(ga),
            AesKey::Aes192(c) => c.encrypt_block(ga),
            AesKey::Aes256(c) => c.encrypt_block(ga),
        }
    }

    pub fn decrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        let ga = aes::cipher::generic_array::GenericArray::from_mut_slice(block);
        match self {
            AesKey::Aes128(c) => c.decrypt_block(ga),
            AesKey::Aes192(c) => c.decrypt_block(ga),
            AesKey::Aes256(c) => c.decrypt_block(ga),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_is_identity() {
        let key = [0x42u8; 32];
        let cipher = AesKey::new(&key).unwrap();
        let mut block = *b"0123456789abcdef";
        let original = block;
        cipher.encrypt_block(&mut block);
        assert_ne!(block, original);
        cipher.decrypt_block(&mut block);
        assert_eq!(block, original);
    }

    #[test]
    fn rejects_bad_key_length() {
        assert!(AesKey::new(&[0u8; 20]).is_err());
    }
}
