//! Asymmetric core (spec §4.2): RSA keypair generation, OAEP-SHA512
//! encrypt/decrypt, PKCS#1 + PEM serialization.
//!
//! Grounded on the teacher's `rsa_kem.rs` (OAEP wrap/unwrap shape) and on
//! `original_source/rsatools.go`, which this module follows for the PEM
//! block types ("RSA PRIVATE KEY" / "RSA PUBLIC KEY" / "MESSAGE") and for
//! the "never fail a handshake over a malformed key" policy — a received
//! key that fails to parse gets silently replaced by a freshly generated
//! throw-away key of the same kind, rather than surfacing a parse error.
//! This hides bugs in malformed peers, as the spec's design notes say to
//! document rather than silently fix.

use rand::rngs::OsRng;
use rsa::pkcs1::{
    DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding,
};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha512;

use crate::error::{CoreError, CoreResult};

/// Bits used for the throw-away keypair synthesized when an imported key
/// fails to parse. Kept small: it only exists to let the handshake
/// continue without crashing, never to protect anything.
const THROWAWAY_BITS: usize = 2048;

pub fn generate_keypair(bits: usize) -> CoreResult<(RsaPrivateKey, RsaPublicKey)> {
    let sk = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| CoreError::CryptoInternal(format!("rsa keygen: {e}")))?;
    let pk = RsaPublicKey::from(&sk);
    Ok((sk, pk))
}

pub fn private_key_to_pem(key: &RsaPrivateKey) -> CoreResult<String> {
    key.to_pkcs1_pem(LineEnding::LF)
        .map(|z| z.to_string())
        .map_err(|e| CoreError::CryptoInternal(format!("pkcs1 pem encode: {e}")))
}

pub fn public_key_to_pem(key: &RsaPublicKey) -> CoreResult<String> {
    key.to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| CoreError::CryptoInternal(format!("pkcs1 pem encode: {e}")))
}

/// Imports a PEM-framed PKCS#1 private key. Per the robustness clause, a
/// key that fails to parse never aborts the caller: it logs loudly and
/// returns a freshly generated throw-away key instead.
pub fn import_private_key(pem: &[u8]) -> RsaPrivateKey {
    match std::str::from_utf8(pem)
        .ok()
        .and_then(|s| RsaPrivateKey::from_pkcs1_pem(s).ok())
    {
        Some(key) => key,
        None => {
            tracing::warn!(
                "received private key failed PEM/PKCS#1 decode; substituting a throw-away keypair"
            );
            RsaPrivateKey::new(&mut OsRng, THROWAWAY_BITS).expect("throw-away rsa keygen")
        }
    }
}

/// Imports a PEM-framed PKCS#1 public key, with the same silent fallback.
pub fn import_public_key(pem: &[u8]) -> RsaPublicKey {
    match std::str::from_utf8(pem)
        .ok()
        .and_then(|s| RsaPublicKey::from_pkcs1_pem(s).ok())
    {
        Some(key) => key,
        None => {
            tracing::warn!(
                "received public key failed PEM/PKCS#1 decode; substituting a throw-away keypair"
            );
            let sk = RsaPrivateKey::new(&mut OsRng, THROWAWAY_BITS).expect("throw-away rsa keygen");
            RsaPublicKey::from(&sk)
        }
    }
}

/// Largest plaintext OAEP-SHA512 can wrap under a key of this modulus size.
pub fn oaep_sha512_max_plaintext(modulus_bytes: usize) -> usize {
    // OAEP bound: k - 2*hLen - 2, hLen = 64 for SHA-512.
    modulus_bytes.saturating_sub(2 * 64 + 2)
}

/// Encrypts `plaintext` under `pub_key` with OAEP-SHA512 and wraps the
/// ciphertext in a `MESSAGE` PEM block, matching what the frame codec puts
/// on the wire for CONN_PROPS / CONN_PROPS_RESPONSE / CIPHER_MODE.
pub fn encrypt(pub_key: &RsaPublicKey, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
    let raw = pub_key
        .encrypt(&mut OsRng, Oaep::new::<Sha512>(), plaintext)
        .map_err(|e| CoreError::CryptoInternal(format!("rsa oaep encrypt: {e}")))?;
    Ok(super::pem::encode("MESSAGE", &raw).into_bytes())
}

/// Inverse of [`encrypt`]. A payload that fails to PEM-unwrap or decrypt is
/// reported as [`CoreError::CryptoInternal`]; per spec §4.5 / §7 the caller
/// (handshake/cipher-mode handlers) treats that as non-fatal and falls back
/// to default session parameters rather than propagating the error further.
pub fn decrypt(priv_key: &RsaPrivateKey, pem_message: &[u8]) -> CoreResult<Vec<u8>> {
    let text = std::str::from_utf8(pem_message)
        .map_err(|_| CoreError::CryptoInternal("MESSAGE PEM is not valid UTF-8".into()))?;
    let raw = super::pem::decode("MESSAGE", text)
        .ok_or_else(|| CoreError::CryptoInternal("MESSAGE PEM frame missing/malformed".into()))?;
    priv_key
        .decrypt(Oaep::new::<Sha512>(), &raw)
        .map_err(|e| CoreError::CryptoInternal(format!("rsa oaep decrypt: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypairs_are_not_deterministic() {
        let (a, _) = generate_keypair(1024).unwrap();
        let (b, _) = generate_keypair(1024).unwrap();
        assert_ne!(a.to_pkcs1_pem(LineEnding::LF).unwrap().to_string(), {
            let pem = b.to_pkcs1_pem(LineEnding::LF).unwrap();
            pem.to_string()
        });
    }

    #[test]
    fn oaep_encryptions_of_same_plaintext_differ() {
        let (_sk, pk) = generate_keypair(1024).unwrap();
        let a = encrypt(&pk, b"hello").unwrap();
        let b = encrypt(&pk, b"hello").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn roundtrip_within_oaep_bound() {
        let (sk, pk) = generate_keypair(1024).unwrap();
        let max = oaep_sha512_max_plaintext(1024 / 8);
        let msg = vec![0x5Au8; max];
        let ct = encrypt(&pk, &msg).unwrap();
        let pt = decrypt(&sk, &ct).unwrap();
        assert_eq!(pt, msg);
    }

    #[test]
    fn malformed_private_key_yields_usable_throwaway() {
        let key = import_private_key(b"not a pem at all");
        // Usable: can be converted back to PEM without panicking.
        assert!(key.to_pkcs1_pem(LineEnding::LF).is_ok());
    }

    #[test]
    fn malformed_public_key_yields_usable_throwaway() {
        let key = import_public_key(b"also not a pem");
        assert!(key.to_pkcs1_pem(LineEnding::LF).is_ok());
    }
}
