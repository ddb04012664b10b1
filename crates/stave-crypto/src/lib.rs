//! # stave-crypto
//!
//! Keccak-256 hashing for the stave EVM core.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod hash;

pub use hash::keccak256;
