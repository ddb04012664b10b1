//! Opcode dispatch and the canonical frame runner
//!
//! The dispatcher is a loop over instruction bytes: it advances the
//! program counter, deducts the opcode's base cost, then executes the
//! handler. Handlers bill their dynamic surcharges before any effect, so
//! the GAS opcode observes the counter after its own base cost and a trap
//! never leaves a half-billed operation behind.

use crate::call::{self, FrameInput, FrameOutcome, FrameRunner};
use crate::error::{EvmError, EvmResult};
use crate::fees::FeeSchedule;
use crate::frame::{Frame, Log};
use crate::gas;
use crate::opcode;
use crate::state::StateAccess;
use crate::word;
use std::collections::HashMap;
use stave_crypto::keccak256;
use stave_primitives::{Address, H256, U256};

/// The EVM interpreter and canonical [`FrameRunner`]
///
/// Holds the immutable fee schedule and runs frames against an external
/// state manager. Call-class opcodes recurse through the same runner, so a
/// frame references its child by value for the child's lifetime.
#[derive(Debug, Clone)]
pub struct Evm {
    fees: FeeSchedule,
}

impl Evm {
    /// Create an interpreter with the given fee schedule
    pub fn new(fees: FeeSchedule) -> Self {
        Self { fees }
    }

    /// The schedule this interpreter charges against
    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Run one frame to completion
    ///
    /// Traps are reported in the outcome; `Err` is reserved for
    /// state-manager failures.
    pub fn run(
        &mut self,
        state: &mut dyn StateAccess,
        input: FrameInput,
    ) -> EvmResult<FrameOutcome> {
        let fees = self.fees;

        // A CREATE frame's address binds to the caller's pre-spawn nonce,
        // which the orchestrator has already advanced.
        let (address, created) = match input.to {
            Some(address) => (address, None),
            None => {
                let nonce = state.account(&input.caller)?.nonce;
                let address = create_address(&input.caller, nonce.saturating_sub(1));
                (address, Some(address))
            }
        };

        if !input.delegatecall && !input.value.is_zero() {
            transfer(state, &input.caller, &address, input.value)?;
        }

        let contract = state.account(&address)?;
        let mut frame = Frame::new(
            &fees,
            input.code,
            address,
            input.caller,
            input.origin,
            input.value,
            input.gas_price,
            input.data,
            input.gas_limit,
            contract,
            input.block,
            input.depth,
            input.selfdestructs,
        );

        tracing::trace!(
            target: "evm",
            address = %frame.address,
            gas = frame.gas.left(),
            depth = frame.depth,
            create = created.is_some(),
            "frame start"
        );

        match run_loop(&mut frame, state, self, &fees) {
            Ok(()) => {
                if let Some(created) = created {
                    state.set_code(&created, frame.return_value.clone())?;
                }
                Ok(FrameOutcome {
                    gas_used: input.gas_limit.saturating_sub(frame.gas.left()),
                    output: frame.return_value,
                    logs: frame.logs,
                    gas_refund: frame.gas.refund(),
                    created_address: created,
                    selfdestructs: frame.selfdestructs,
                    trap: None,
                })
            }
            Err(e) if e.is_trap() => Ok(FrameOutcome {
                // A trap consumes the frame's whole budget
                gas_used: input.gas_limit,
                output: Vec::new(),
                logs: Vec::new(),
                gas_refund: 0,
                created_address: None,
                selfdestructs: HashMap::new(),
                trap: Some(e),
            }),
            Err(e) => Err(e),
        }
    }
}

impl FrameRunner for Evm {
    fn run_frame(
        &mut self,
        state: &mut dyn StateAccess,
        input: FrameInput,
    ) -> EvmResult<FrameOutcome> {
        self.run(state, input)
    }
}

fn run_loop(
    frame: &mut Frame,
    state: &mut dyn StateAccess,
    runner: &mut dyn FrameRunner,
    fees: &FeeSchedule,
) -> EvmResult<()> {
    while !frame.stopped && frame.pc < frame.code.len() {
        let op = frame.code[frame.pc];
        frame.pc += 1;
        if let Err(e) = step(op, frame, state, runner, fees) {
            if e.is_trap() {
                tracing::debug!(
                    target: "evm",
                    error = %e,
                    location = %frame.trap_location(),
                    "frame trapped"
                );
            }
            return Err(e);
        }
    }
    Ok(())
}

fn step(
    op: u8,
    frame: &mut Frame,
    state: &mut dyn StateAccess,
    runner: &mut dyn FrameRunner,
    fees: &FeeSchedule,
) -> EvmResult<()> {
    frame.gas.charge(gas::base_cost(fees, op))?;

    match op {
        opcode::STOP => {
            frame.stopped = true;
        }

        // Arithmetic
        opcode::ADD => binary(frame, word::add)?,
        opcode::MUL => binary(frame, word::mul)?,
        opcode::SUB => binary(frame, word::sub)?,
        opcode::DIV => binary(frame, word::div)?,
        opcode::SDIV => binary(frame, word::sdiv)?,
        opcode::MOD => binary(frame, word::rem)?,
        opcode::SMOD => binary(frame, word::smod)?,
        opcode::ADDMOD => ternary(frame, word::addmod)?,
        opcode::MULMOD => ternary(frame, word::mulmod)?,
        opcode::EXP => {
            let base = frame.stack.pop()?;
            let exponent = frame.stack.pop()?;
            let byte_cost = fees
                .exp_byte_gas
                .saturating_mul(word::byte_len(exponent) as u64);
            frame.gas.charge(byte_cost)?;
            frame.stack.push(word::exp(base, exponent))?;
        }
        opcode::SIGNEXTEND => binary(frame, word::signextend)?,

        // Comparison and bitwise
        opcode::LT => binary(frame, word::lt)?,
        opcode::GT => binary(frame, word::gt)?,
        opcode::SLT => binary(frame, word::slt)?,
        opcode::SGT => binary(frame, word::sgt)?,
        opcode::EQ => binary(frame, word::eq)?,
        opcode::ISZERO => unary(frame, word::iszero)?,
        opcode::AND => binary(frame, |a, b| a & b)?,
        opcode::OR => binary(frame, |a, b| a | b)?,
        opcode::XOR => binary(frame, |a, b| a ^ b)?,
        opcode::NOT => unary(frame, word::not)?,
        opcode::BYTE => binary(frame, word::byte)?,

        opcode::SHA3 => {
            let offset = frame.stack.pop()?;
            let len = frame.stack.pop()?;
            let (offset, len) = frame.prepare_range(fees, offset, len)?;
            frame.gas.charge(gas::sha3_cost(fees, len as u64))?;
            let digest = keccak256(&frame.memory.read(offset, len));
            frame.stack.push(U256::from(digest))?;
        }

        // Environment
        opcode::ADDRESS => frame.stack.push(U256::from(frame.address))?,
        opcode::BALANCE => {
            let target = Address::from(frame.stack.pop()?);
            let balance = if target == frame.address {
                frame.contract.balance
            } else {
                state.balance(&target)?
            };
            frame.stack.push(balance)?;
        }
        opcode::ORIGIN => frame.stack.push(U256::from(frame.origin))?,
        opcode::CALLER => frame.stack.push(U256::from(frame.caller))?,
        opcode::CALLVALUE => frame.stack.push(frame.call_value)?,
        opcode::CALLDATALOAD => {
            let index = frame.stack.pop()?;
            let mut bytes = [0u8; 32];
            if let Some(start) = word::to_u64(index) {
                for (i, byte) in bytes.iter_mut().enumerate() {
                    let src = start.saturating_add(i as u64);
                    if src < frame.call_data.len() as u64 {
                        *byte = frame.call_data[src as usize];
                    }
                }
            }
            frame.stack.push(U256::from_big_endian(&bytes))?;
        }
        opcode::CALLDATASIZE => frame.stack.push(U256::from(frame.call_data.len()))?,
        opcode::CALLDATACOPY => {
            let data = std::mem::take(&mut frame.call_data);
            let result = copy_to_memory(frame, fees, &data);
            frame.call_data = data;
            result?;
        }
        opcode::CODESIZE => frame.stack.push(U256::from(frame.code.len()))?,
        opcode::CODECOPY => {
            let code = std::mem::take(&mut frame.code);
            let result = copy_to_memory(frame, fees, &code);
            frame.code = code;
            result?;
        }
        opcode::GASPRICE => frame.stack.push(frame.gas_price)?,
        opcode::EXTCODESIZE => {
            let target = Address::from(frame.stack.pop()?);
            let (code, _) = state.code(&target)?;
            frame.stack.push(U256::from(code.len()))?;
        }
        opcode::EXTCODECOPY => {
            let target = Address::from(frame.stack.pop()?);
            let (code, _) = state.code(&target)?;
            copy_to_memory(frame, fees, &code)?;
        }

        // Block
        opcode::BLOCKHASH => {
            let number = frame.stack.pop()?;
            let hash = match word::to_u64(number) {
                Some(n) if n < frame.block.number && frame.block.number - n <= 256 => {
                    state.block_hash(n)?
                }
                _ => H256::ZERO,
            };
            frame.stack.push(U256::from(hash))?;
        }
        opcode::COINBASE => frame.stack.push(U256::from(frame.block.coinbase))?,
        opcode::TIMESTAMP => frame.stack.push(U256::from(frame.block.timestamp))?,
        opcode::NUMBER => frame.stack.push(U256::from(frame.block.number))?,
        opcode::DIFFICULTY => frame.stack.push(frame.block.difficulty)?,
        opcode::GASLIMIT => frame.stack.push(U256::from(frame.block.gas_limit))?,

        // Stack, memory, storage, flow
        opcode::POP => {
            frame.stack.pop()?;
        }
        opcode::MLOAD => {
            let offset = frame.stack.pop()?;
            let (offset, _) = frame.prepare_range(fees, offset, U256::from(32u64))?;
            let value = frame.memory.load_word(offset);
            frame.stack.push(value)?;
        }
        opcode::MSTORE => {
            let offset = frame.stack.pop()?;
            let value = frame.stack.pop()?;
            let (offset, _) = frame.prepare_range(fees, offset, U256::from(32u64))?;
            frame.memory.store_word(offset, value);
        }
        opcode::MSTORE8 => {
            let offset = frame.stack.pop()?;
            let value = frame.stack.pop()?;
            let (offset, _) = frame.prepare_range(fees, offset, U256::one())?;
            frame.memory.store_byte(offset, value.byte(0));
        }
        opcode::SLOAD => {
            let key = H256::from(frame.stack.pop()?);
            let stored = state.storage(&frame.address, &key)?;
            let value = if stored.is_empty() {
                U256::zero()
            } else {
                U256::from_big_endian(&stored)
            };
            frame.stack.push(value)?;
        }
        opcode::SSTORE => {
            let key = H256::from(frame.stack.pop()?);
            let value = frame.stack.pop()?;
            let current = state.storage(&frame.address, &key)?;
            let was_set = !current.is_empty();
            let is_set = !value.is_zero();
            if !was_set && is_set {
                frame.gas.charge(fees.sstore_set_gas)?;
            } else {
                frame.gas.charge(fees.sstore_reset_gas)?;
            }
            if was_set && !is_set {
                frame.gas.add_refund(fees.sstore_refund_gas);
            }
            state.set_storage(&frame.address, key, trimmed_be_bytes(value))?;
            frame.contract = state.account(&frame.address)?;
        }
        opcode::JUMP => {
            let dest = frame.stack.pop()?;
            jump_to(frame, dest)?;
        }
        opcode::JUMPI => {
            let dest = frame.stack.pop()?;
            let condition = frame.stack.pop()?;
            if !condition.is_zero() {
                jump_to(frame, dest)?;
            }
        }
        opcode::PC => frame.stack.push(U256::from(frame.pc - 1))?,
        opcode::MSIZE => frame.stack.push(U256::from(frame.memory.word_count() * 32))?,
        opcode::GAS => frame.stack.push(U256::from(frame.gas.left()))?,
        opcode::JUMPDEST => {}

        // Push, dup, swap
        op if opcode::is_push(op) => {
            let n = opcode::push_bytes(op);
            let mut bytes = [0u8; 32];
            for i in 0..n {
                if frame.pc + i < frame.code.len() {
                    bytes[32 - n + i] = frame.code[frame.pc + i];
                }
            }
            frame.pc += n;
            frame.stack.push(U256::from_big_endian(&bytes))?;
        }
        op if (opcode::DUP1..=opcode::DUP16).contains(&op) => {
            frame.stack.dup((op - opcode::DUP1 + 1) as usize)?;
        }
        op if (opcode::SWAP1..=opcode::SWAP16).contains(&op) => {
            frame.stack.swap((op - opcode::SWAP1 + 1) as usize)?;
        }

        // Logging
        op if (opcode::LOG0..=opcode::LOG4).contains(&op) => {
            let topic_count = (op - opcode::LOG0) as usize;
            let offset = frame.stack.pop()?;
            let len = frame.stack.pop()?;
            let (offset, len) = frame.prepare_range(fees, offset, len)?;
            let mut topics = Vec::with_capacity(topic_count);
            for _ in 0..topic_count {
                topics.push(H256::from(frame.stack.pop()?));
            }
            frame
                .gas
                .charge(gas::log_cost(fees, topic_count as u64, len as u64))?;
            let data = frame.memory.read(offset, len);
            frame.logs.push(Log {
                address: frame.address,
                topics,
                data,
            });
        }

        // System
        opcode::CREATE => call::create(frame, state, runner, fees)?,
        opcode::CALL | opcode::CALLCODE | opcode::DELEGATECALL => {
            call::call_class(op, frame, state, runner, fees)?;
        }
        opcode::RETURN => {
            let offset = frame.stack.pop()?;
            let len = frame.stack.pop()?;
            let (offset, len) = frame.prepare_range(fees, offset, len)?;
            frame.return_value = frame.memory.read(offset, len);
            frame.stopped = true;
        }
        opcode::SELFDESTRUCT => call::selfdestruct(frame, state, fees)?,

        _ => return Err(EvmError::InvalidOpcode(op)),
    }

    Ok(())
}

fn unary(frame: &mut Frame, f: impl Fn(U256) -> U256) -> EvmResult<()> {
    let a = frame.stack.pop()?;
    frame.stack.push(f(a))
}

fn binary(frame: &mut Frame, f: impl Fn(U256, U256) -> U256) -> EvmResult<()> {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    frame.stack.push(f(a, b))
}

fn ternary(frame: &mut Frame, f: impl Fn(U256, U256, U256) -> U256) -> EvmResult<()> {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    let c = frame.stack.pop()?;
    frame.stack.push(f(a, b, c))
}

/// Shared body of CALLDATACOPY / CODECOPY / EXTCODECOPY: pop destination,
/// source offset and length, bill expansion plus per-word copy gas, then
/// write zero-padded
fn copy_to_memory(frame: &mut Frame, fees: &FeeSchedule, source: &[u8]) -> EvmResult<()> {
    let dest = frame.stack.pop()?;
    let src_offset = frame.stack.pop()?;
    let len = frame.stack.pop()?;
    let (dest, len) = frame.prepare_range(fees, dest, len)?;
    frame.gas.charge(gas::copy_cost(fees, len as u64))?;
    let src_offset = word::to_u64(src_offset)
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(usize::MAX);
    frame.memory.write_padded(dest, source, src_offset, len);
    Ok(())
}

fn jump_to(frame: &mut Frame, dest: U256) -> EvmResult<()> {
    let dest = word::to_u64(dest)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or(EvmError::InvalidJump(usize::MAX))?;
    if !frame.is_valid_jump(dest) {
        return Err(EvmError::InvalidJump(dest));
    }
    frame.pc = dest;
    Ok(())
}

/// Storage values are stored big-endian with leading zeros stripped; the
/// empty string encodes an unset slot
fn trimmed_be_bytes(value: U256) -> Vec<u8> {
    let len = word::byte_len(value);
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    bytes[32 - len..].to_vec()
}

/// Address of the account a CREATE at `sender` with `nonce` produces:
/// low 20 bytes of `keccak(rlp([sender, nonce]))`
fn create_address(sender: &Address, nonce: u64) -> Address {
    let nonce_bytes: Vec<u8> = if nonce == 0 {
        vec![0x80]
    } else {
        let be = nonce.to_be_bytes();
        let first = be.iter().position(|b| *b != 0).unwrap_or(7);
        let digits = &be[first..];
        if digits.len() == 1 && digits[0] < 0x80 {
            digits.to_vec()
        } else {
            let mut out = vec![0x80 + digits.len() as u8];
            out.extend_from_slice(digits);
            out
        }
    };

    // [20-byte string, nonce] always fits a short list
    let mut payload = Vec::with_capacity(23 + nonce_bytes.len());
    payload.push(0xc0 + 21 + nonce_bytes.len() as u8);
    payload.push(0x80 + 20);
    payload.extend_from_slice(sender.as_bytes());
    payload.extend(nonce_bytes);

    let hash = keccak256(&payload);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash.as_bytes()[12..32]);
    Address::new(bytes)
}

fn transfer(
    state: &mut dyn StateAccess,
    from: &Address,
    to: &Address,
    value: U256,
) -> EvmResult<()> {
    let from_balance = state.balance(from)?;
    if from_balance < value {
        return Err(EvmError::Internal(format!(
            "insufficient balance for value transfer from {from}"
        )));
    }
    state.set_balance(from, from_balance - value)?;
    let to_balance = state.balance(to)?;
    state.set_balance(to, to_balance.checked_add(value).unwrap_or(U256::MAX))?;
    Ok(())
}
