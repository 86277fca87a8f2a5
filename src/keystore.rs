//! On-disk encrypted keypair: `create`/`load` a peer's long-lived RSA
//! identity under `directory/{privKey,pubKey}`, protected by
//! `AES-CBC(SHA-256(password))`.
//!
//! Grounded on `original_source/rsatools.go`'s `CreateKeys`/`LoadKeys` pair:
//! a symmetric key derived from a passphrase before handing it to the
//! block-cipher core.

use std::path::Path;

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::crypto::block::BLOCK_SIZE;
use crate::crypto::modes::CipherMode;
use crate::crypto::rsa as core_rsa;
use crate::crypto::stream_codec;
use crate::error::{CoreError, CoreResult};
use crate::rand_source;

const PRIVATE_KEY_FILE: &str = "privKey";
const PUBLIC_KEY_FILE: &str = "pubKey";

fn derive_key(password: &str) -> Vec<u8> {
    Sha256::digest(password.as_bytes()).to_vec()
}

/// Generates a fresh keypair and writes the encrypted keystore files.
///
/// The IV is generated once and written in the clear as the first 16 bytes
/// of `privKey`; `pubKey` is encrypted under the *same* IV with no IV prefix
/// of its own (spec §3/§4.3 — preserved quirk, not a bug).
pub fn create(directory: &Path, password: &str, bits: usize) -> CoreResult<(RsaPrivateKey, RsaPublicKey)> {
    std::fs::create_dir_all(directory)?;

    let (sk, pk) = core_rsa::generate_keypair(bits)?;
    let mut priv_pem = core_rsa::private_key_to_pem(&sk)?;
    let pub_pem = core_rsa::public_key_to_pem(&pk)?;

    let mut key = derive_key(password);
    let mut iv = [0u8; BLOCK_SIZE];
    rand_source::fill(&mut iv);

    let mut priv_out = iv.to_vec();
    stream_codec::encrypt(
        CipherMode::Cbc,
        &key,
        iv,
        priv_pem.len() as u64,
        std::io::Cursor::new(priv_pem.as_bytes()),
        &mut priv_out,
    )?;
    std::fs::write(directory.join(PRIVATE_KEY_FILE), &priv_out)?;

    let mut pub_out = Vec::new();
    stream_codec::encrypt(
        CipherMode::Cbc,
        &key,
        iv,
        pub_pem.len() as u64,
        std::io::Cursor::new(pub_pem.as_bytes()),
        &mut pub_out,
    )?;
    std::fs::write(directory.join(PUBLIC_KEY_FILE), &pub_out)?;

    priv_pem.zeroize();
    key.zeroize();

    Ok((sk, pk))
}

/// Loads and decrypts a keystore written by [`create`].
///
/// A missing `directory` is [`CoreError::KeystoreMissing`]. A wrong password
/// (or any other corruption) decrypts to bytes that fail PEM/PKCS#1 parsing
/// and is reported as [`CoreError::KeystoreCorrupt`] — this path does *not*
/// fall back to a throw-away key the way wire-received keys do (spec §4.3).
pub fn load(directory: &Path, password: &str) -> CoreResult<(RsaPrivateKey, RsaPublicKey)> {
    if !directory.is_dir() {
        return Err(CoreError::KeystoreMissing);
    }

    let priv_path = directory.join(PRIVATE_KEY_FILE);
    let pub_path = directory.join(PUBLIC_KEY_FILE);
    let priv_raw = std::fs::read(&priv_path).map_err(|_| CoreError::KeystoreMissing)?;
    let pub_raw = std::fs::read(&pub_path).map_err(|_| CoreError::KeystoreMissing)?;

    if priv_raw.len() < BLOCK_SIZE {
        return Err(CoreError::KeystoreCorrupt);
    }
    let mut iv = [0u8; BLOCK_SIZE];
    iv.copy_from_slice(&priv_raw[..BLOCK_SIZE]);
    let priv_ciphertext = &priv_raw[BLOCK_SIZE..];

    let mut key = derive_key(password);

    let mut priv_pem_bytes = Vec::new();
    let priv_result = stream_codec::decrypt(
        CipherMode::Cbc,
        &key,
        iv,
        0,
        std::io::Cursor::new(priv_ciphertext),
        &mut priv_pem_bytes,
    );

    let mut pub_pem_bytes = Vec::new();
    let pub_result = stream_codec::decrypt(
        CipherMode::Cbc,
        &key,
        iv,
        0,
        std::io::Cursor::new(pub_raw.as_slice()),
        &mut pub_pem_bytes,
    );
    key.zeroize();
    priv_result.map_err(|_| CoreError::KeystoreCorrupt)?;
    pub_result.map_err(|_| CoreError::KeystoreCorrupt)?;

    let priv_pem = std::str::from_utf8(&priv_pem_bytes).map_err(|_| CoreError::KeystoreCorrupt)?;
    let pub_pem = std::str::from_utf8(&pub_pem_bytes).map_err(|_| CoreError::KeystoreCorrupt)?;

    let sk = RsaPrivateKey::from_pkcs1_pem(priv_pem).map_err(|_| CoreError::KeystoreCorrupt)?;
    let pk = RsaPublicKey::from_pkcs1_pem(pub_pem).map_err(|_| CoreError::KeystoreCorrupt)?;

    priv_pem_bytes.zeroize();
    pub_pem_bytes.zeroize();

    Ok((sk, pk))
}

/// `SHA-256(PEM(public_key))` rendered as lowercase hex, shown to the user
/// for out-of-band peer verification (spec §3).
pub fn fingerprint(pub_key: &RsaPublicKey) -> CoreResult<String> {
    let pem = core_rsa::public_key_to_pem(pub_key)?;
    Ok(hex::encode(Sha256::digest(pem.as_bytes())))
}
