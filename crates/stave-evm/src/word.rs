//! 256-bit word arithmetic
//!
//! Every arithmetic, comparison, and bitwise opcode routes through this
//! module so that wrap-on-overflow and the signed two's-complement bridging
//! stay in one place. All results reduce mod 2^256 unless stated otherwise.

use stave_primitives::{U256, U512};

/// Wrapping addition: (a + b) mod 2^256
pub fn add(a: U256, b: U256) -> U256 {
    a.overflowing_add(b).0
}

/// Wrapping multiplication: (a * b) mod 2^256
pub fn mul(a: U256, b: U256) -> U256 {
    a.overflowing_mul(b).0
}

/// Wrapping subtraction: (a - b) mod 2^256
pub fn sub(a: U256, b: U256) -> U256 {
    a.overflowing_sub(b).0
}

/// Unsigned division; division by zero yields zero
pub fn div(a: U256, b: U256) -> U256 {
    a.checked_div(b).unwrap_or_default()
}

/// Unsigned remainder; modulo zero yields zero
pub fn rem(a: U256, b: U256) -> U256 {
    a.checked_rem(b).unwrap_or_default()
}

/// Signed division, truncating toward zero; division by zero yields zero
pub fn sdiv(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::zero();
    }
    let (a_abs, a_neg) = abs(a);
    let (b_abs, b_neg) = abs(b);
    let quotient = a_abs / b_abs;
    if a_neg ^ b_neg {
        neg(quotient)
    } else {
        quotient
    }
}

/// Signed remainder, carrying the sign of the dividend; modulo zero yields zero
pub fn smod(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::zero();
    }
    let (a_abs, a_neg) = abs(a);
    let (b_abs, _) = abs(b);
    let remainder = a_abs % b_abs;
    if a_neg {
        neg(remainder)
    } else {
        remainder
    }
}

/// (a + b) mod c computed over 512-bit intermediates; c = 0 yields zero
pub fn addmod(a: U256, b: U256, c: U256) -> U256 {
    if c.is_zero() {
        return U256::zero();
    }
    let wide = U512::from(a) + U512::from(b);
    let reduced = wide % U512::from(c);
    U256::try_from(reduced).expect("x mod c < c fits in 256 bits")
}

/// (a * b) mod c computed over 512-bit intermediates; c = 0 yields zero
pub fn mulmod(a: U256, b: U256, c: U256) -> U256 {
    if c.is_zero() {
        return U256::zero();
    }
    let wide = U512::from(a) * U512::from(b);
    let reduced = wide % U512::from(c);
    U256::try_from(reduced).expect("x mod c < c fits in 256 bits")
}

/// b^e mod 2^256; e = 0 yields one
pub fn exp(base: U256, exponent: U256) -> U256 {
    base.overflowing_pow(exponent).0
}

/// Number of significant bytes in a word (0 for zero)
///
/// This is the `1 + floor(log_256 e)` term of the EXP gas surcharge.
pub fn byte_len(value: U256) -> usize {
    (value.bits() + 7) / 8
}

/// Sign-extend `value` from the `(k+1)`-th low byte; k >= 31 is the identity
pub fn signextend(k: U256, value: U256) -> U256 {
    if k >= U256::from(32u64) {
        return value;
    }
    let bit_position = k.low_u64() as usize * 8 + 7;
    let mask = (U256::one() << bit_position) - U256::one();
    if value.bit(bit_position) {
        value | !mask
    } else {
        value & mask
    }
}

/// Unsigned less-than as a machine word (1 or 0)
pub fn lt(a: U256, b: U256) -> U256 {
    bool_word(a < b)
}

/// Unsigned greater-than as a machine word (1 or 0)
pub fn gt(a: U256, b: U256) -> U256 {
    bool_word(a > b)
}

/// Signed less-than as a machine word (1 or 0)
pub fn slt(a: U256, b: U256) -> U256 {
    bool_word(match (is_negative(a), is_negative(b)) {
        (true, false) => true,
        (false, true) => false,
        _ => a < b,
    })
}

/// Signed greater-than as a machine word (1 or 0)
pub fn sgt(a: U256, b: U256) -> U256 {
    slt(b, a)
}

/// Equality as a machine word (1 or 0)
pub fn eq(a: U256, b: U256) -> U256 {
    bool_word(a == b)
}

/// Zero test as a machine word (1 or 0)
pub fn iszero(a: U256) -> U256 {
    bool_word(a.is_zero())
}

/// Bitwise complement restricted to 256 bits
pub fn not(a: U256) -> U256 {
    !a
}

/// The i-th most-significant byte of `w` as a word; i >= 32 yields zero
pub fn byte(i: U256, w: U256) -> U256 {
    if i >= U256::from(32u64) {
        return U256::zero();
    }
    (w >> (8 * (31 - i.low_u64() as usize))) & U256::from(0xffu64)
}

/// Two's-complement sign bit
pub fn is_negative(value: U256) -> bool {
    value.bit(255)
}

/// Two's-complement negation: (2^256 - value) mod 2^256
pub fn neg(value: U256) -> U256 {
    (!value).overflowing_add(U256::one()).0
}

/// Magnitude and sign of a two's-complement word
fn abs(value: U256) -> (U256, bool) {
    if is_negative(value) {
        (neg(value), true)
    } else {
        (value, false)
    }
}

/// Narrow a word to u64 if it fits
pub fn to_u64(value: U256) -> Option<u64> {
    if value.bits() <= 64 {
        Some(value.low_u64())
    } else {
        None
    }
}

fn bool_word(b: bool) -> U256 {
    if b {
        U256::one()
    } else {
        U256::zero()
    }
}
