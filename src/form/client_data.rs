//! Encoding of data that makes a round trip through the client
//!
//! ```text
//! JSON ─▶ 'X' + bytes, or 'Z' + gzip above the threshold
//!      ─▶ HMAC-SHA256 prepended (when a passphrase is configured)
//!      ─▶ URL-safe base64
//! ```
//!
//! Decompression stops at `max_decoded_len` bytes; unsigned data comes
//! straight from the client.
//!
//! The form action log is the main user: it decides which components get
//! updated on submit, so it must not be forgeable by the client.

use std::fmt;
use std::io::{Read, Write};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const MAC_LEN: usize = 32;
/// Largest JSON a compressed payload may inflate to
pub const DEFAULT_MAX_DECODED_LEN: usize = 1024 * 1024;

const PLAIN: u8 = b'X';
const GZIP: u8 = b'Z';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientDataError {
    /// Not valid base64
    Encoding(String),
    /// Signature missing or wrong
    Tampered,
    /// Unknown format marker or broken compression
    Corrupt(String),
    Serialization(String),
}

impl fmt::Display for ClientDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding(e) => write!(f, "Client data is not valid base64: {}", e),
            Self::Tampered => write!(f, "Client data signature does not match; the data may have been tampered with"),
            Self::Corrupt(e) => write!(f, "Client data is corrupt: {}", e),
            Self::Serialization(e) => write!(f, "Client data could not be (de)serialized: {}", e),
        }
    }
}

impl std::error::Error for ClientDataError {}

#[derive(Clone)]
pub struct ClientDataEncoder {
    key: Option<Vec<u8>>,
    compress_threshold: usize,
    max_decoded_len: usize,
}

impl fmt::Debug for ClientDataEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientDataEncoder")
            .field("signed", &self.key.is_some())
            .field("compress_threshold", &self.compress_threshold)
            .field("max_decoded_len", &self.max_decoded_len)
            .finish()
    }
}

impl ClientDataEncoder {
    /// Payloads larger than `compress_threshold` bytes are gzipped
    pub fn new(passphrase: Option<&str>, compress_threshold: usize) -> Self {
        let key = passphrase
            .filter(|p| !p.is_empty())
            .map(|p| p.as_bytes().to_vec());
        if key.is_none() {
            tracing::warn!(
                "No HMAC passphrase configured: form data sent to the client is unsigned and can be forged"
            );
        }
        Self {
            key,
            compress_threshold,
            max_decoded_len: DEFAULT_MAX_DECODED_LEN,
        }
    }

    pub fn with_max_decoded_len(mut self, max_decoded_len: usize) -> Self {
        self.max_decoded_len = max_decoded_len;
        self
    }

    pub fn is_signed(&self) -> bool {
        self.key.is_some()
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<String, ClientDataError> {
        let json = serde_json::to_vec(value).map_err(|e| ClientDataError::Serialization(e.to_string()))?;

        let mut payload = Vec::with_capacity(json.len() + 1);
        if json.len() > self.compress_threshold {
            payload.push(GZIP);
            let mut encoder = GzEncoder::new(payload, Compression::default());
            encoder
                .write_all(&json)
                .map_err(|e| ClientDataError::Corrupt(e.to_string()))?;
            payload = encoder
                .finish()
                .map_err(|e| ClientDataError::Corrupt(e.to_string()))?;
        } else {
            payload.push(PLAIN);
            payload.extend_from_slice(&json);
        }

        let signed = match &self.key {
            Some(key) => {
                let mut signed = keyed_mac(key)?
                    .chain_update(&payload)
                    .finalize()
                    .into_bytes()
                    .to_vec();
                signed.extend_from_slice(&payload);
                signed
            }
            None => payload,
        };

        Ok(URL_SAFE_NO_PAD.encode(signed))
    }

    pub fn decode<T: DeserializeOwned>(&self, data: &str) -> Result<T, ClientDataError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(data.trim())
            .map_err(|e| ClientDataError::Encoding(e.to_string()))?;

        let payload = match &self.key {
            Some(key) => {
                if bytes.len() <= MAC_LEN {
                    return Err(ClientDataError::Tampered);
                }
                let (mac, payload) = bytes.split_at(MAC_LEN);
                keyed_mac(key)?
                    .chain_update(payload)
                    .verify_slice(mac)
                    .map_err(|_| ClientDataError::Tampered)?;
                payload
            }
            None => &bytes[..],
        };

        let json = match payload.split_first() {
            Some((&PLAIN, rest)) => rest.to_vec(),
            Some((&GZIP, rest)) => {
                let limit = self.max_decoded_len;
                let mut json = Vec::new();
                GzDecoder::new(rest)
                    .take(limit as u64 + 1)
                    .read_to_end(&mut json)
                    .map_err(|e| ClientDataError::Corrupt(e.to_string()))?;
                if json.len() > limit {
                    return Err(ClientDataError::Corrupt(format!(
                        "decompressed data exceeds {} bytes",
                        limit
                    )));
                }
                json
            }
            Some((marker, _)) => {
                return Err(ClientDataError::Corrupt(format!(
                    "unknown format marker 0x{:02x}",
                    marker
                )))
            }
            None => return Err(ClientDataError::Corrupt("empty payload".to_string())),
        };

        serde_json::from_slice(&json).map_err(|e| ClientDataError::Serialization(e.to_string()))
    }
}

fn keyed_mac(key: &[u8]) -> Result<HmacSha256, ClientDataError> {
    HmacSha256::new_from_slice(key).map_err(|e| ClientDataError::Corrupt(format!("signing key rejected: {}", e)))
}
