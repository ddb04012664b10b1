//! Call orchestration
//!
//! CREATE, CALL, CALLCODE and DELEGATECALL assemble a child-frame
//! configuration, apply the 63/64 forwarding rule and the value-transfer
//! stipend, and hand the configuration to a [`FrameRunner`]. The child's
//! logs, refund, return data and gas consumption fold back into the caller
//! here; a child trap becomes a `0` push, never a caller trap.

use crate::error::{EvmError, EvmResult};
use crate::fees::FeeSchedule;
use crate::frame::{BlockContext, Frame, Log};
use crate::opcode;
use crate::state::StateAccess;
use crate::word;
use std::collections::HashMap;
use stave_primitives::{Address, U256};

/// Call-stack depth limit; deeper spawns push 0 without running the child
pub const MAX_CALL_DEPTH: usize = 1024;

/// Configuration of a child frame, handed to the runner
#[derive(Debug, Clone)]
pub struct FrameInput {
    /// Code the child executes
    pub code: Vec<u8>,
    /// Precompile flag reported by the state manager for this code
    pub compiled: bool,
    /// Target address; `None` means a CREATE frame whose address the
    /// runner derives
    pub to: Option<Address>,
    /// Caller visible to the child
    pub caller: Address,
    /// Transaction origin
    pub origin: Address,
    /// Value carried by the call
    pub value: U256,
    /// Gas budget of the child
    pub gas_limit: u64,
    /// Input data
    pub data: Vec<u8>,
    /// Transaction gas price
    pub gas_price: U256,
    /// Enclosing block header fields
    pub block: BlockContext,
    /// Child call-stack depth
    pub depth: usize,
    /// Whether the child runs under DELEGATECALL semantics (inherited
    /// caller and value, no transfer)
    pub delegatecall: bool,
    /// Selfdestruct registrations visible so far in this transaction
    pub selfdestructs: HashMap<Address, Address>,
}

/// What a completed child frame reports back
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    /// Gas actually consumed by the child
    pub gas_used: u64,
    /// Bytes produced by RETURN (or deposited code output for CREATE)
    pub output: Vec<u8>,
    /// Logs the child appended
    pub logs: Vec<Log>,
    /// Refund the child accumulated
    pub gas_refund: u64,
    /// Address of the created account (CREATE success only)
    pub created_address: Option<Address>,
    /// Selfdestruct registrations after the child ran
    pub selfdestructs: HashMap<Address, Address>,
    /// The trap that aborted the child, if any
    pub trap: Option<EvmError>,
}

/// Executes child frames on behalf of the call orchestrator
pub trait FrameRunner {
    /// Run one frame to completion and report its outcome
    ///
    /// Child traps are reported inside the outcome; an `Err` is reserved
    /// for state-manager failures, which propagate unchanged.
    fn run_frame(
        &mut self,
        state: &mut dyn StateAccess,
        input: FrameInput,
    ) -> EvmResult<FrameOutcome>;
}

/// CALL / CALLCODE / DELEGATECALL
pub(crate) fn call_class(
    op: u8,
    frame: &mut Frame,
    state: &mut dyn StateAccess,
    runner: &mut dyn FrameRunner,
    fees: &FeeSchedule,
) -> EvmResult<()> {
    let requested_gas = frame.stack.pop()?;
    let target = Address::from(frame.stack.pop()?);
    let value = if op == opcode::DELEGATECALL {
        frame.call_value
    } else {
        frame.stack.pop()?
    };
    let in_offset = frame.stack.pop()?;
    let in_len = frame.stack.pop()?;
    let out_offset = frame.stack.pop()?;
    let out_len = frame.stack.pop()?;

    let (in_offset, in_len) = frame.prepare_range(fees, in_offset, in_len)?;
    let (out_offset, out_len) = frame.prepare_range(fees, out_offset, out_len)?;

    // Value-transfer surcharges; DELEGATECALL never transfers
    if op != opcode::DELEGATECALL && !value.is_zero() {
        frame.gas.charge(fees.call_value_transfer_gas)?;
        if op == opcode::CALL
            && (!state.exists(&target)? || state.account_is_empty(&target)?)
        {
            frame.gas.charge(fees.call_new_account_gas)?;
        }
    }

    // 63/64 rule: silently lower an over-ask
    let cap = frame.gas.left() - frame.gas.left() / 64;
    let mut gas_limit = match word::to_u64(requested_gas) {
        Some(g) if g <= cap => g,
        _ => cap,
    };

    // The stipend is a gift: it widens both the child's budget and the
    // caller's counter, so the later gas_used deduction nets it out
    if op != opcode::DELEGATECALL && !value.is_zero() {
        gas_limit += fees.call_stipend;
        frame.gas.credit(fees.call_stipend);
    }

    if frame.depth >= MAX_CALL_DEPTH
        || (op != opcode::DELEGATECALL && frame.contract.balance < value)
    {
        frame.stack.push(U256::zero())?;
        return Ok(());
    }

    let (code, compiled) = state.code(&target)?;
    let data = frame.memory.read(in_offset, in_len);

    // Make the child see this frame's account view
    state.cache_account(&frame.address, frame.contract)?;

    let (to, caller, delegatecall) = match op {
        opcode::CALL => (target, frame.address, false),
        opcode::CALLCODE => (frame.address, frame.address, false),
        opcode::DELEGATECALL => (frame.address, frame.caller, true),
        _ => return Err(EvmError::InvalidOpcode(op)),
    };

    let input = FrameInput {
        code,
        compiled,
        to: Some(to),
        caller,
        origin: frame.origin,
        value,
        gas_limit,
        data,
        gas_price: frame.gas_price,
        block: frame.block,
        depth: frame.depth + 1,
        delegatecall,
        selfdestructs: frame.selfdestructs.clone(),
    };

    let outcome = runner.run_frame(state, input)?;
    absorb_child(frame, state, outcome, out_offset, out_len, None)
}

/// CREATE
pub(crate) fn create(
    frame: &mut Frame,
    state: &mut dyn StateAccess,
    runner: &mut dyn FrameRunner,
    fees: &FeeSchedule,
) -> EvmResult<()> {
    let value = frame.stack.pop()?;
    let offset = frame.stack.pop()?;
    let len = frame.stack.pop()?;
    let (offset, len) = frame.prepare_range(fees, offset, len)?;

    // CREATE forwards everything the 63/64 rule allows
    let gas_limit = frame.gas.left() - frame.gas.left() / 64;

    if frame.depth >= MAX_CALL_DEPTH || frame.contract.balance < value {
        frame.stack.push(U256::zero())?;
        return Ok(());
    }

    let init_code = frame.memory.read(offset, len);

    // The new account's address binds to the pre-spawn nonce
    frame.contract.nonce += 1;
    state.cache_account(&frame.address, frame.contract)?;

    let input = FrameInput {
        code: init_code,
        compiled: false,
        to: None,
        caller: frame.address,
        origin: frame.origin,
        value,
        gas_limit,
        data: Vec::new(),
        gas_price: frame.gas_price,
        block: frame.block,
        depth: frame.depth + 1,
        delegatecall: false,
        selfdestructs: frame.selfdestructs.clone(),
    };

    let outcome = runner.run_frame(state, input)?;
    let created = outcome.created_address;
    absorb_child(frame, state, outcome, 0, 0, Some(created))
}

/// Fold a child's outcome into the caller
fn absorb_child(
    frame: &mut Frame,
    state: &mut dyn StateAccess,
    outcome: FrameOutcome,
    out_offset: usize,
    out_len: usize,
    created: Option<Option<Address>>,
) -> EvmResult<()> {
    frame.logs.extend(outcome.logs);
    frame.gas.add_refund(outcome.gas_refund);
    frame.gas.charge(outcome.gas_used)?;

    if let Some(trap) = outcome.trap {
        tracing::debug!(target: "evm", %trap, "child frame trapped");
        if created.is_some() {
            // Roll back the nonce we advanced for the unborn account
            frame.contract.nonce -= 1;
            state.cache_account(&frame.address, frame.contract)?;
        }
        frame.stack.push(U256::zero())?;
        return Ok(());
    }

    let copy_len = out_len.min(outcome.output.len());
    if copy_len > 0 {
        frame.memory.write(out_offset, &outcome.output[..copy_len]);
    }
    frame.contract = state.account(&frame.address)?;
    frame.selfdestructs = outcome.selfdestructs;

    match created {
        Some(Some(address)) => frame.stack.push(U256::from(address))?,
        Some(None) => frame.stack.push(U256::zero())?,
        None => frame.stack.push(U256::one())?,
    }
    Ok(())
}

/// SELFDESTRUCT: move the whole balance, register the address for
/// end-of-transaction deletion, stop the frame
pub(crate) fn selfdestruct(
    frame: &mut Frame,
    state: &mut dyn StateAccess,
    fees: &FeeSchedule,
) -> EvmResult<()> {
    let recipient = Address::from(frame.stack.pop()?);

    if !state.exists(&recipient)? || state.account_is_empty(&recipient)? {
        frame.gas.charge(fees.call_new_account_gas)?;
    }

    // Only the first selfdestruct of an address earns the refund
    if !frame.selfdestructs.contains_key(&frame.address) {
        frame.gas.add_refund(fees.suicide_refund_gas);
    }
    frame.selfdestructs.insert(frame.address, recipient);

    let balance = state.balance(&frame.address)?;
    let recipient_balance = state.balance(&recipient)?;
    state.set_balance(
        &recipient,
        recipient_balance.checked_add(balance).unwrap_or(U256::MAX),
    )?;
    state.set_balance(&frame.address, U256::zero())?;

    frame.stopped = true;
    Ok(())
}
