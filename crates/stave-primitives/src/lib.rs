//! # stave-primitives
//!
//! Primitive types for the stave EVM execution core.
//!
//! This crate provides the fundamental data types the machine operates on:
//! 20-byte addresses, 32-byte hashes/storage keys, and the 256-bit word.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod error;
mod hash;

pub use address::{Address, AddressError};
pub use error::PrimitiveError;
pub use hash::{H256, HashError};

// Re-export primitive-types for the 256-bit machine word. U512 backs the
// wide intermediates of ADDMOD/MULMOD.
pub use primitive_types::{U256, U512};

/// Block height type
pub type BlockHeight = u64;

/// Transaction nonce type
pub type Nonce = u64;

/// Gas type
pub type Gas = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_basic() {
        let a = U256::from(100u64);
        let b = U256::from(200u64);
        assert_eq!(a + b, U256::from(300u64));
    }

    #[test]
    fn test_u512_widening() {
        let a = U512::from(U256::MAX);
        let b = a + a;
        assert!(b > U512::from(U256::MAX));
    }
}
