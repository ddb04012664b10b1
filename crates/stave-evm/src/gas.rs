//! Gas metering
//!
//! The meter owns the frame's remaining gas, its refund accumulator, and
//! the high-water mark of memory cost. Memory expansion bills only the
//! increment over the highest total already paid, so the mark never
//! decreases within a frame.

use crate::error::{EvmError, EvmResult};
use crate::fees::FeeSchedule;
use crate::opcode;

/// Per-frame gas counter
#[derive(Clone, Debug)]
pub struct GasMeter {
    left: u64,
    refund: u64,
    highest_mem_cost: u64,
}

impl GasMeter {
    /// Create a meter holding the frame's gas budget
    pub fn new(limit: u64) -> Self {
        Self {
            left: limit,
            refund: 0,
            highest_mem_cost: 0,
        }
    }

    /// Remaining gas
    pub fn left(&self) -> u64 {
        self.left
    }

    /// Accumulated refund
    pub fn refund(&self) -> u64 {
        self.refund
    }

    /// Total memory cost charged so far
    pub fn highest_mem_cost(&self) -> u64 {
        self.highest_mem_cost
    }

    /// Deduct gas; underflow traps out-of-gas
    pub fn charge(&mut self, amount: u64) -> EvmResult<()> {
        if self.left < amount {
            return Err(EvmError::OutOfGas);
        }
        self.left -= amount;
        Ok(())
    }

    /// Credit gas back (the call stipend is the only source of this)
    pub fn credit(&mut self, amount: u64) {
        self.left = self.left.saturating_add(amount);
    }

    /// Accumulate a refund for transaction-level accounting
    pub fn add_refund(&mut self, amount: u64) {
        self.refund = self.refund.saturating_add(amount);
    }

    /// Bill memory expansion up to `words` 32-byte words
    ///
    /// Total cost for `w` words is `memory_gas * w + w^2 / quad_coeff_div`;
    /// only the increment over the high-water mark is deducted.
    pub fn charge_memory(&mut self, fees: &FeeSchedule, words: u64) -> EvmResult<()> {
        let w = words as u128;
        let total = fees.memory_gas as u128 * w + w * w / fees.quad_coeff_div as u128;
        let total = u64::try_from(total).map_err(|_| EvmError::OutOfGas)?;
        if total > self.highest_mem_cost {
            self.charge(total - self.highest_mem_cost)?;
            self.highest_mem_cost = total;
        }
        Ok(())
    }
}

/// Base cost of an opcode from the fee schedule
///
/// Unassigned bytes are the dispatcher's problem; this covers every opcode
/// of the supported fork. Dynamic surcharges (copy words, log data, EXP
/// bytes, memory, SSTORE) are billed by the handlers.
pub fn base_cost(fees: &FeeSchedule, op: u8) -> u64 {
    use crate::opcode::*;
    match op {
        STOP | RETURN | SSTORE => 0,

        ADDRESS | ORIGIN | CALLER | CALLVALUE | CALLDATASIZE | CODESIZE | GASPRICE
        | COINBASE | TIMESTAMP | NUMBER | DIFFICULTY | GASLIMIT | POP | PC | MSIZE | GAS => {
            fees.base_gas
        }

        ADD | SUB | NOT | LT | GT | SLT | SGT | EQ | ISZERO | AND | OR | XOR | BYTE
        | CALLDATALOAD | CALLDATACOPY | CODECOPY | MLOAD | MSTORE | MSTORE8 => fees.very_low_gas,
        op if is_push(op) => fees.very_low_gas,
        op if (DUP1..=DUP16).contains(&op) => fees.very_low_gas,
        op if (SWAP1..=SWAP16).contains(&op) => fees.very_low_gas,

        MUL | DIV | SDIV | MOD | SMOD | SIGNEXTEND => fees.low_gas,

        ADDMOD | MULMOD | JUMP => fees.mid_gas,
        JUMPI => fees.high_gas,
        JUMPDEST => fees.jumpdest_gas,

        EXP => fees.exp_gas,
        SHA3 => fees.sha3_gas,

        BALANCE => fees.balance_gas,
        EXTCODESIZE | EXTCODECOPY => fees.ext_code_gas,
        BLOCKHASH => fees.blockhash_gas,
        SLOAD => fees.sload_gas,

        op if (LOG0..=LOG4).contains(&op) => fees.log_gas,

        CREATE => fees.create_gas,
        CALL | CALLCODE | DELEGATECALL => fees.call_gas,
        SELFDESTRUCT => fees.selfdestruct_gas,

        _ => 0,
    }
}

/// Copy surcharge: `copy_gas` per started 32-byte word
pub fn copy_cost(fees: &FeeSchedule, len: u64) -> u64 {
    fees.copy_gas.saturating_mul(len.div_ceil(32))
}

/// SHA3 surcharge: `sha3_word_gas` per started 32-byte word
pub fn sha3_cost(fees: &FeeSchedule, len: u64) -> u64 {
    fees.sha3_word_gas.saturating_mul(len.div_ceil(32))
}

/// LOG surcharge: per-topic plus per-data-byte
pub fn log_cost(fees: &FeeSchedule, topics: u64, len: u64) -> u64 {
    fees.log_topic_gas
        .saturating_mul(topics)
        .saturating_add(fees.log_data_gas.saturating_mul(len))
}
