//! 32-byte hashes and storage keys
//!
//! `H256` carries Keccak digests, storage keys, and log topics. Keys and
//! topics are the big-endian image of a machine word, so the word
//! conversions are the primary constructors.

use crate::U256;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Hash parsing error
#[derive(Debug, Error)]
pub enum HashError {
    /// Invalid hex string
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    /// Invalid length
    #[error("invalid hash length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// 256-bit hash (32 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct H256([u8; 32]);

impl H256 {
    /// Zero hash
    pub const ZERO: H256 = H256([0u8; 32]);

    /// Wrap raw bytes as a hash
    pub const fn new(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether every byte is zero
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl From<U256> for H256 {
    /// Big-endian image of a word (how storage keys and topics are formed)
    fn from(word: U256) -> Self {
        let mut bytes = [0u8; 32];
        word.to_big_endian(&mut bytes);
        H256(bytes)
    }
}

impl From<H256> for U256 {
    /// Read the 32 bytes back as a big-endian word
    fn from(hash: H256) -> Self {
        U256::from_big_endian(&hash.0)
    }
}

impl FromStr for H256 {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| HashError::InvalidHex(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| HashError::InvalidLength(v.len()))?;
        Ok(H256(bytes))
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
