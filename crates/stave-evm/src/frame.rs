//! Per-call execution context

use crate::error::{EvmError, EvmResult};
use crate::fees::FeeSchedule;
use crate::gas::GasMeter;
use crate::memory::{Memory, MAX_RANGE};
use crate::opcode;
use crate::stack::Stack;
use crate::state::Account;
use crate::word;
use std::collections::HashMap;
use stave_crypto::keccak256;
use stave_primitives::{Address, H256, U256};

/// A log entry emitted by the LOG opcodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    /// Contract address that emitted the log
    pub address: Address,
    /// Indexed topics (0 to 4)
    pub topics: Vec<H256>,
    /// Non-indexed data
    pub data: Vec<u8>,
}

/// Header fields of the block the frame executes in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockContext {
    /// Block number
    pub number: u64,
    /// Beneficiary address
    pub coinbase: Address,
    /// Block timestamp
    pub timestamp: u64,
    /// Block difficulty
    pub difficulty: U256,
    /// Block gas limit
    pub gas_limit: u64,
}

/// One execution context: code at an address with its own stack, memory,
/// gas, and program counter
#[derive(Debug)]
pub struct Frame {
    /// Code being executed
    pub code: Vec<u8>,
    /// Program counter (byte index into `code`)
    pub pc: usize,
    /// Operand stack
    pub stack: Stack,
    /// Frame memory
    pub memory: Memory,
    /// Gas counter
    pub gas: GasMeter,

    /// Executing contract address
    pub address: Address,
    /// Immediate caller
    pub caller: Address,
    /// Transaction origin
    pub origin: Address,
    /// Value passed with the call
    pub call_value: U256,
    /// Transaction gas price
    pub gas_price: U256,
    /// Input data
    pub call_data: Vec<u8>,
    /// Cached view of the executing account
    pub contract: Account,
    /// Enclosing block header fields
    pub block: BlockContext,

    /// Logs appended by this frame and completed children
    pub logs: Vec<Log>,
    /// Selfdestructed address -> refund recipient
    pub selfdestructs: HashMap<Address, Address>,
    /// Bytes produced by RETURN
    pub return_value: Vec<u8>,
    /// Terminal flag
    pub stopped: bool,
    /// Call-stack depth (0 at top level)
    pub depth: usize,

    valid_jumps: Vec<bool>,
}

impl Frame {
    /// Create a frame ready to execute `code`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fees: &FeeSchedule,
        code: Vec<u8>,
        address: Address,
        caller: Address,
        origin: Address,
        call_value: U256,
        gas_price: U256,
        call_data: Vec<u8>,
        gas_limit: u64,
        contract: Account,
        block: BlockContext,
        depth: usize,
        selfdestructs: HashMap<Address, Address>,
    ) -> Self {
        let valid_jumps = analyze_jumpdests(&code);
        Self {
            code,
            pc: 0,
            stack: Stack::new(fees.stack_limit),
            memory: Memory::new(),
            gas: GasMeter::new(gas_limit),
            address,
            caller,
            origin,
            call_value,
            gas_price,
            call_data,
            contract,
            block,
            logs: Vec::new(),
            selfdestructs,
            return_value: Vec::new(),
            stopped: false,
            depth,
            valid_jumps,
        }
    }

    /// Whether `dest` is a JUMPDEST outside PUSH data
    pub fn is_valid_jump(&self, dest: usize) -> bool {
        self.valid_jumps.get(dest).copied().unwrap_or(false)
    }

    /// Convert a popped word into a memory range and bill its expansion
    ///
    /// Zero-length ranges are free and skip the offset bound check. Ranges
    /// that cannot fit a platform-safe integer can never be paid for and
    /// trap out-of-gas.
    pub fn prepare_range(
        &mut self,
        fees: &FeeSchedule,
        offset: U256,
        len: U256,
    ) -> EvmResult<(usize, usize)> {
        let len = word::to_u64(len).filter(|l| *l <= MAX_RANGE).ok_or(EvmError::OutOfGas)?;
        if len == 0 {
            return Ok((0, 0));
        }
        let offset = word::to_u64(offset)
            .filter(|o| o + len <= MAX_RANGE)
            .ok_or(EvmError::OutOfGas)?;
        let end = offset + len;
        let words = end.div_ceil(32).max(self.memory.word_count() as u64);
        self.gas.charge_memory(fees, words)?;
        self.memory.grow(end as usize);
        Ok((offset as usize, len as usize))
    }

    /// Diagnostic location of the current instruction:
    /// `keccak(code)/address:pc`
    pub fn trap_location(&self) -> String {
        format!(
            "{}/{}:{}",
            hex::encode(keccak256(&self.code).as_bytes()),
            self.address,
            self.pc
        )
    }
}

/// Precompute the set of valid jump targets: JUMPDEST bytes that are not
/// inside a PUSH immediate
fn analyze_jumpdests(code: &[u8]) -> Vec<bool> {
    let mut dests = vec![false; code.len()];
    let mut i = 0;
    while i < code.len() {
        let op = code[i];
        if op == opcode::JUMPDEST {
            dests[i] = true;
        }
        i += 1 + opcode::push_bytes(op);
    }
    dests
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame(code: Vec<u8>, gas: u64) -> Frame {
        Frame::new(
            &FeeSchedule::default(),
            code,
            Address::new([0xbb; 20]),
            Address::new([0xaa; 20]),
            Address::new([0xaa; 20]),
            U256::zero(),
            U256::zero(),
            Vec::new(),
            gas,
            Account::default(),
            BlockContext::default(),
            0,
            HashMap::new(),
        )
    }

    #[test]
    fn test_jumpdest_analysis() {
        // PUSH1 0x5b JUMPDEST STOP: offset 1 is PUSH data, offset 2 is real
        let frame = test_frame(vec![0x60, 0x5b, 0x5b, 0x00], 0);
        assert!(!frame.is_valid_jump(0));
        assert!(!frame.is_valid_jump(1));
        assert!(frame.is_valid_jump(2));
        assert!(!frame.is_valid_jump(3));
        assert!(!frame.is_valid_jump(100));
    }

    #[test]
    fn test_jumpdest_inside_push32() {
        let mut code = vec![0x7f]; // PUSH32
        code.extend([0x5b; 32]);
        code.push(0x5b); // real JUMPDEST at offset 33
        let frame = test_frame(code, 0);
        for i in 1..=32 {
            assert!(!frame.is_valid_jump(i));
        }
        assert!(frame.is_valid_jump(33));
    }

    #[test]
    fn test_prepare_range_zero_length_is_free() {
        let mut frame = test_frame(vec![], 10);
        let (off, len) = frame
            .prepare_range(&FeeSchedule::default(), U256::MAX, U256::zero())
            .unwrap();
        assert_eq!((off, len), (0, 0));
        assert_eq!(frame.gas.left(), 10);
        assert_eq!(frame.memory.len(), 0);
    }

    #[test]
    fn test_prepare_range_charges_and_grows() {
        let mut frame = test_frame(vec![], 100);
        let (off, len) = frame
            .prepare_range(&FeeSchedule::default(), U256::zero(), U256::from(32u64))
            .unwrap();
        assert_eq!((off, len), (0, 32));
        assert_eq!(frame.gas.left(), 97);
        assert_eq!(frame.memory.word_count(), 1);
    }

    #[test]
    fn test_prepare_range_unpayable_offset_traps() {
        let mut frame = test_frame(vec![], u64::MAX);
        let err = frame
            .prepare_range(&FeeSchedule::default(), U256::MAX, U256::one())
            .unwrap_err();
        assert_eq!(err, EvmError::OutOfGas);
    }

    #[test]
    fn test_trap_location_shape() {
        let frame = test_frame(vec![0x00], 0);
        let loc = frame.trap_location();
        // 64 hex chars of code hash, then /0x...:pc
        let (hash, rest) = loc.split_once('/').unwrap();
        assert_eq!(hash.len(), 64);
        assert!(rest.ends_with(":0"));
        assert!(rest.starts_with("0xbb"));
    }
}
