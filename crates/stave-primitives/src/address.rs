//! Account addresses
//!
//! An address is the low 20 bytes of a machine word. Opcode handlers
//! narrow popped words with `Address::from` and widen addresses back with
//! `U256::from`; keeping both conversions here means every handler agrees
//! on the zero-extension convention.

use crate::U256;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Address parsing error
#[derive(Debug, Error)]
pub enum AddressError {
    /// Invalid hex string
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    /// Invalid length
    #[error("invalid address length: expected 20 bytes, got {0}")]
    InvalidLength(usize),
}

/// 20-byte account identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// Zero address (0x0000...0000)
    pub const ZERO: Address = Address([0u8; 20]);

    /// Wrap raw bytes as an address
    pub const fn new(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Whether this is the zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl From<U256> for Address {
    /// Narrow a word to an address: the high 12 bytes are discarded
    fn from(word: U256) -> Self {
        let mut bytes = [0u8; 32];
        word.to_big_endian(&mut bytes);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&bytes[12..32]);
        Address(addr)
    }
}

impl From<Address> for U256 {
    /// Widen an address to a word, zero-extended on the left
    fn from(addr: Address) -> Self {
        let mut bytes = [0u8; 32];
        bytes[12..32].copy_from_slice(&addr.0);
        U256::from_big_endian(&bytes)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| AddressError::InvalidLength(v.len()))?;
        Ok(Address(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        let addr: Address = "0x00000000000000000000000000000000000000ff".parse().unwrap();
        assert_eq!(addr.as_bytes()[19], 0xff);
        assert_eq!(addr.to_string(), "0x00000000000000000000000000000000000000ff");
    }

    #[test]
    fn test_parse_without_prefix() {
        let addr: Address = "aa".repeat(20).parse().unwrap();
        assert_eq!(addr, Address::new([0xaa; 20]));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            "0x1234".parse::<Address>(),
            Err(AddressError::InvalidLength(2))
        ));
        assert!(matches!(
            "0xzz".parse::<Address>(),
            Err(AddressError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_word_narrowing_keeps_low_bytes() {
        let mut bytes = [0xee; 32];
        bytes[12..32].copy_from_slice(&[0x11; 20]);
        let word = U256::from_big_endian(&bytes);
        assert_eq!(Address::from(word), Address::new([0x11; 20]));
    }

    #[test]
    fn test_word_roundtrip() {
        let addr = Address::new([0x42; 20]);
        assert_eq!(Address::from(U256::from(addr)), addr);
    }

    #[test]
    fn test_widening_zero_extends() {
        let word = U256::from(Address::new([0xff; 20]));
        let mut expected = [0u8; 32];
        expected[12..32].copy_from_slice(&[0xff; 20]);
        assert_eq!(word, U256::from_big_endian(&expected));
    }

    #[test]
    fn test_zero() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::new([1; 20]).is_zero());
    }
}
