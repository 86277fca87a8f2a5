//! Minimal PEM block framing for the `MESSAGE` type the wire protocol wraps
//! RSA ciphertexts in (spec §4.2). The keypair PEM itself is handled by the
//! `rsa` crate's own PKCS#1 PEM codec; this module covers the one PEM type
//! that crate doesn't know about.

use base64::{engine::general_purpose::STANDARD, Engine};

const LINE_WIDTH: usize = 64;

pub fn encode(label: &str, data: &[u8]) -> String {
    let body = STANDARD.encode(data);
    let mut out = format!("-----BEGIN {label}-----\n");
    for chunk in body.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(std::str::from_utf8(chunk).unwrap());
        out.push('\n');
    }
    out.push_str(&format!("-----END {label}-----\n"));
    out
}

pub fn decode(label: &str, pem: &str) -> Option<Vec<u8>> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");
    let start = pem.find(&begin)? + begin.len();
    let stop = pem.find(&end)?;
    if stop < start {
        return None;
    }
    let body: String = pem[start..stop].chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(body).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let data = b"some ciphertext bytes, not actually random".to_vec();
        let pem = encode("MESSAGE", &data);
        assert!(pem.starts_with("-----BEGIN MESSAGE-----\n"));
        let decoded = decode("MESSAGE", &pem).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn wrong_label_fails() {
        let pem = encode("MESSAGE", b"x");
        assert!(decode("OTHER", &pem).is_none());
    }
}
