//! # stave-evm
//!
//! The opcode execution core of the stave EVM: a deterministic 256-bit
//! stack machine with per-instruction gas accounting, quadratic memory
//! expansion, JUMPDEST-checked control flow, and CREATE/CALL/CALLCODE/
//! DELEGATECALL child-frame orchestration under the 63/64 forwarding rule.
//!
//! The bytecode fetch loop lives here; the transaction executor, the
//! persistent state backend, precompiles and block sourcing are external
//! collaborators reached through [`StateAccess`] and [`FrameRunner`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

mod call;
mod error;
mod fees;
mod frame;
mod gas;
mod interpreter;
mod memory;
pub mod opcode;
mod stack;
mod state;
pub mod word;

pub use call::{FrameInput, FrameOutcome, FrameRunner, MAX_CALL_DEPTH};
pub use error::{EvmError, EvmResult};
pub use fees::FeeSchedule;
pub use frame::{BlockContext, Frame, Log};
pub use gas::GasMeter;
pub use interpreter::Evm;
pub use memory::Memory;
pub use stack::Stack;
pub use state::{Account, InMemoryState, StateAccess};
