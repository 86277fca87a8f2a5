//! Wire frame header and per-type payload codecs (spec §4.4).
//!
//! Every exchange is magic + type byte + a type-specific payload on its own
//! short-lived TCP connection. All multi-byte integers are big-endian,
//! unlike `original_source/netclient.go`'s `binary.LittleEndian` — the spec
//! fixes the byte order explicitly, so this module does too.

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Hello = 0,
    HelloResponse = 1,
    ConnProps = 2,
    ConnPropsResponse = 3,
    CipherMode = 4,
    Text = 5,
    File = 6,
    Ping = 7,
}

impl FrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(FrameType::Hello),
            1 => Some(FrameType::HelloResponse),
            2 => Some(FrameType::ConnProps),
            3 => Some(FrameType::ConnPropsResponse),
            4 => Some(FrameType::CipherMode),
            5 => Some(FrameType::Text),
            6 => Some(FrameType::File),
            7 => Some(FrameType::Ping),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Reads exactly 4 bytes and reports whether they match the protocol magic,
/// without treating a mismatch as an error — the caller (the listener) is
/// responsible for closing the connection silently on a `false` result
/// (spec §4.5's admission rule / §8's magic-enforcement property).
pub async fn read_magic<R: AsyncRead + Unpin>(reader: &mut R) -> CoreResult<bool> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).await?;
    Ok(u32::from_be_bytes(buf) == config::MAGIC)
}

pub async fn read_type<R: AsyncRead + Unpin>(reader: &mut R) -> CoreResult<FrameType> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf).await?;
    FrameType::from_byte(buf[0]).ok_or_else(|| CoreError::Frame(format!("unknown frame type {}", buf[0])))
}

pub async fn write_header<W: AsyncWrite + Unpin>(writer: &mut W, ty: FrameType) -> CoreResult<()> {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u32(config::MAGIC);
    buf.put_u8(ty.as_byte());
    writer.write_all(&buf).await?;
    Ok(())
}

/// Ping's reply is the two-byte ASCII literal `OK` (connected) or `NK` (not
/// connected); the responder closes the connection right after writing it.
pub const PING_OK: [u8; 2] = *b"OK";
pub const PING_NOT_CONNECTED: [u8; 2] = *b"NK";

/// The two-byte acknowledgement written after handling any non-PING frame.
pub const ACK: [u8; 2] = *b"OK";

fn decode_i32_length(raw: i32, what: &str) -> CoreResult<usize> {
    if raw < 0 {
        return Err(CoreError::Frame(format!("{what} length is negative: {raw}")));
    }
    Ok(raw as usize)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloPayload {
    pub listen_port: i32,
    pub pub_key_pem: Vec<u8>,
}

impl HelloPayload {
    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> CoreResult<()> {
        let mut buf = BytesMut::with_capacity(8 + self.pub_key_pem.len());
        buf.put_i32(self.listen_port);
        buf.put_i32(self.pub_key_pem.len() as i32);
        buf.put_slice(&self.pub_key_pem);
        writer.write_all(&buf).await?;
        Ok(())
    }

    /// Mirrors the original's fixed read buffer (spec §4.4): only the first
    /// `pub_key_length` bytes of the declared buffer are meaningful, the
    /// rest is an implementation detail of the sender's original buffering
    /// and carries no wire-format significance here.
    pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> CoreResult<Self> {
        let mut header = [0u8; 8];
        reader.read_exact(&mut header).await?;
        let listen_port = i32::from_be_bytes(header[0..4].try_into().unwrap());
        let pub_key_length = decode_i32_length(
            i32::from_be_bytes(header[4..8].try_into().unwrap()),
            "pub_key_length",
        )?;
        if pub_key_length > config::HELLO_BUFFER_LEN {
            return Err(CoreError::Frame(format!(
                "pub_key_length {pub_key_length} exceeds hello buffer {}",
                config::HELLO_BUFFER_LEN
            )));
        }
        let mut pub_key_pem = vec![0u8; pub_key_length];
        reader.read_exact(&mut pub_key_pem).await?;
        Ok(Self { listen_port, pub_key_pem })
    }
}

/// Writes a `u32`-length-prefixed blob, used for the RSA-OAEP/PEM-wrapped
/// payloads of CONN_PROPS, CONN_PROPS_RESPONSE, and CIPHER_MODE. The spec
/// leaves the exact on-wire framing of these ciphertext payloads open (their
/// length is, in principle, derivable from the receiver's own RSA modulus
/// size, but that requires recomputing PEM formatting arithmetic); this
/// crate resolves the ambiguity by reusing TEXT's length-prefix shape
/// uniformly across every ciphertext-carrying frame (see DESIGN.md).
pub async fn write_length_prefixed<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> CoreResult<()> {
    let mut buf = BytesMut::with_capacity(4 + data.len());
    buf.put_i32(data.len() as i32);
    buf.put_slice(data);
    writer.write_all(&buf).await?;
    Ok(())
}

pub async fn read_length_prefixed<R: AsyncRead + Unpin>(reader: &mut R, max_len: usize) -> CoreResult<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = decode_i32_length(i32::from_be_bytes(len_buf), "frame payload length")?;
    if len > max_len {
        return Err(CoreError::Frame(format!("frame payload length {len} exceeds max {max_len}")));
    }
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;
    Ok(data)
}

/// Plaintext carried (after RSA decrypt) inside a CONN_PROPS frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnPropsPlaintext {
    pub algorithm: u8,
    pub key_size: u32,
    pub block_size: u32,
    pub cipher_mode: u8,
    pub aes_key: Vec<u8>,
    pub iv: Vec<u8>,
}

impl ConnPropsPlaintext {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(10 + self.aes_key.len() + self.iv.len());
        buf.put_u8(self.algorithm);
        buf.put_u32(self.key_size);
        buf.put_u32(self.block_size);
        buf.put_u8(self.cipher_mode);
        buf.put_slice(&self.aes_key);
        buf.put_slice(&self.iv);
        buf.to_vec()
    }

    pub fn decode(mut bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < 10 {
            return Err(CoreError::Frame("conn_props plaintext too short".into()));
        }
        let algorithm = bytes.get_u8();
        let key_size = bytes.get_u32();
        let block_size = bytes.get_u32();
        let cipher_mode = bytes.get_u8();
        if bytes.len() < key_size as usize + block_size as usize {
            return Err(CoreError::Frame("conn_props plaintext truncated".into()));
        }
        let aes_key = bytes[..key_size as usize].to_vec();
        bytes.advance(key_size as usize);
        let iv = bytes[..block_size as usize].to_vec();
        Ok(Self {
            algorithm,
            key_size,
            block_size,
            cipher_mode,
            aes_key,
            iv,
        })
    }
}

/// Plaintext carried inside a CONN_PROPS_RESPONSE frame. Unlike CONN_PROPS,
/// neither field carries its own length prefix: both lengths are already
/// known to the decrypting side from its own (already-adopted) session
/// parameters (spec §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnPropsResponsePlaintext {
    pub aes_key_contribution: Vec<u8>,
    pub iv_contribution: Vec<u8>,
}

impl ConnPropsResponsePlaintext {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.aes_key_contribution.len() + self.iv_contribution.len());
        buf.extend_from_slice(&self.aes_key_contribution);
        buf.extend_from_slice(&self.iv_contribution);
        buf
    }

    pub fn decode(bytes: &[u8], key_size: usize, block_size: usize) -> CoreResult<Self> {
        if bytes.len() != key_size + block_size {
            return Err(CoreError::Frame(format!(
                "conn_props_response plaintext length {} does not match key_size {key_size} + block_size {block_size}",
                bytes.len()
            )));
        }
        Ok(Self {
            aes_key_contribution: bytes[..key_size].to_vec(),
            iv_contribution: bytes[key_size..].to_vec(),
        })
    }
}

/// Plaintext carried inside a CIPHER_MODE frame: a single mode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherModePlaintext {
    pub cipher_mode: u8,
}

impl CipherModePlaintext {
    pub fn encode(&self) -> Vec<u8> {
        vec![self.cipher_mode]
    }

    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        bytes
            .first()
            .map(|&b| Self { cipher_mode: b })
            .ok_or_else(|| CoreError::Frame("cipher_mode plaintext empty".into()))
    }
}

/// TEXT frame payload: `length:int32 | ciphertext:bytes[length]`.
pub async fn write_text<W: AsyncWrite + Unpin>(writer: &mut W, ciphertext: &[u8]) -> CoreResult<()> {
    write_length_prefixed(writer, ciphertext).await
}

pub async fn read_text<R: AsyncRead + Unpin>(reader: &mut R, max_len: usize) -> CoreResult<Vec<u8>> {
    read_length_prefixed(reader, max_len).await
}

/// Right-pads `value` as decimal ASCII to [`config::FILE_FIELD_WIDTH`] bytes
/// using [`config::FILE_FIELD_PAD`] — the FILE frame's `*_ascii` fields.
pub fn encode_ascii_field(value: u64) -> [u8; config::FILE_FIELD_WIDTH] {
    let digits = value.to_string();
    let mut field = [config::FILE_FIELD_PAD; config::FILE_FIELD_WIDTH];
    field[..digits.len()].copy_from_slice(digits.as_bytes());
    field
}

pub fn decode_ascii_field(field: &[u8]) -> CoreResult<u64> {
    let trimmed: Vec<u8> = field.iter().copied().take_while(|&b| b != config::FILE_FIELD_PAD).collect();
    std::str::from_utf8(&trimmed)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| CoreError::Frame(format!("malformed file length field: {field:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn magic_roundtrips() {
        let mut buf = Vec::new();
        write_header(&mut buf, FrameType::Text).await.unwrap();
        let mut cursor: &[u8] = &buf;
        assert!(read_magic(&mut cursor).await.unwrap());
        assert_eq!(read_type(&mut cursor).await.unwrap(), FrameType::Text);
    }

    #[tokio::test]
    async fn bad_magic_is_rejected() {
        let buf = [0u8, 0, 0, 0];
        let mut cursor: &[u8] = &buf;
        assert!(!read_magic(&mut cursor).await.unwrap());
    }

    #[tokio::test]
    async fn hello_payload_roundtrips() {
        let payload = HelloPayload {
            listen_port: 27002,
            pub_key_pem: b"-----BEGIN RSA PUBLIC KEY-----\nabc\n-----END RSA PUBLIC KEY-----\n".to_vec(),
        };
        let mut buf = Vec::new();
        payload.write(&mut buf).await.unwrap();
        let mut cursor: &[u8] = &buf;
        let decoded = HelloPayload::read(&mut cursor).await.unwrap();
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn hello_payload_rejects_oversized_length() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&27002i32.to_be_bytes());
        buf.extend_from_slice(&(config::HELLO_BUFFER_LEN as i32 + 1).to_be_bytes());
        let mut cursor: &[u8] = &buf;
        assert!(HelloPayload::read(&mut cursor).await.is_err());
    }

    #[test]
    fn conn_props_plaintext_roundtrips() {
        let props = ConnPropsPlaintext {
            algorithm: 0,
            key_size: 16,
            block_size: 16,
            cipher_mode: 1,
            aes_key: vec![1u8; 16],
            iv: vec![2u8; 16],
        };
        let encoded = props.encode();
        let decoded = ConnPropsPlaintext::decode(&encoded).unwrap();
        assert_eq!(decoded, props);
    }

    #[test]
    fn conn_props_response_requires_exact_length() {
        let resp = ConnPropsResponsePlaintext {
            aes_key_contribution: vec![9u8; 16],
            iv_contribution: vec![8u8; 16],
        };
        let encoded = resp.encode();
        let decoded = ConnPropsResponsePlaintext::decode(&encoded, 16, 16).unwrap();
        assert_eq!(decoded, resp);
        assert!(ConnPropsResponsePlaintext::decode(&encoded, 15, 16).is_err());
    }

    #[test]
    fn cipher_mode_plaintext_roundtrips() {
        let encoded = CipherModePlaintext { cipher_mode: 3 }.encode();
        assert_eq!(CipherModePlaintext::decode(&encoded).unwrap().cipher_mode, 3);
    }

    #[test]
    fn ascii_field_roundtrips() {
        let field = encode_ascii_field(1_048_577);
        assert_eq!(&field, b"1048577:::");
        assert_eq!(decode_ascii_field(&field).unwrap(), 1_048_577);
    }

    #[test]
    fn ascii_field_roundtrips_zero() {
        let field = encode_ascii_field(0);
        assert_eq!(decode_ascii_field(&field).unwrap(), 0);
    }

    #[tokio::test]
    async fn negative_length_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(-1i32).to_be_bytes());
        let mut cursor: &[u8] = &buf;
        assert!(read_length_prefixed(&mut cursor, 1024).await.is_err());
    }
}
