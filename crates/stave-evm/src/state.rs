//! State manager contract and in-memory backend
//!
//! The core reads and mutates world state only through [`StateAccess`]. The
//! backend owns a write-through cache; [`StateAccess::cache_account`] is how
//! a frame persists its view of the executing account so child frames see
//! up-to-date balances and nonces. Snapshot/revert around traps is the
//! enclosing executor's job, not the core's.

use crate::error::EvmResult;
use std::collections::HashMap;
use stave_primitives::{Address, H256, U256};

/// View of an account as the frame caches it
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Account {
    /// Account balance in wei
    pub balance: U256,
    /// Account nonce
    pub nonce: u64,
    /// Whether the account exists in state
    pub exists: bool,
}

/// State manager consumed by the execution core
///
/// Storage values are big-endian byte strings with leading zeros stripped;
/// an empty value means the slot is unset.
pub trait StateAccess {
    /// Balance of an account (zero when absent)
    fn balance(&self, addr: &Address) -> EvmResult<U256>;

    /// Bytecode of an account plus its precompile flag
    fn code(&self, addr: &Address) -> EvmResult<(Vec<u8>, bool)>;

    /// Read a storage slot; empty means unset
    fn storage(&self, addr: &Address, key: &H256) -> EvmResult<Vec<u8>>;

    /// Write a storage slot; an empty value clears it
    fn set_storage(&mut self, addr: &Address, key: H256, value: Vec<u8>) -> EvmResult<()>;

    /// Account view: balance, nonce, existence
    fn account(&self, addr: &Address) -> EvmResult<Account>;

    /// Whether the account is empty (zero balance, zero nonce, no code)
    fn account_is_empty(&self, addr: &Address) -> EvmResult<bool>;

    /// Whether the account exists at all
    fn exists(&self, addr: &Address) -> EvmResult<bool>;

    /// Hash of a historical block (zero when unknown)
    fn block_hash(&self, number: u64) -> EvmResult<H256>;

    /// Overwrite an account balance
    fn set_balance(&mut self, addr: &Address, balance: U256) -> EvmResult<()>;

    /// Persist a frame's account view into the cache
    fn cache_account(&mut self, addr: &Address, account: Account) -> EvmResult<()>;

    /// Store bytecode for an account (CREATE deposit)
    fn set_code(&mut self, addr: &Address, code: Vec<u8>) -> EvmResult<()>;
}

#[derive(Clone, Debug, Default)]
struct StoredAccount {
    balance: U256,
    nonce: u64,
    code: Vec<u8>,
    storage: HashMap<H256, Vec<u8>>,
}

/// In-memory state backend
///
/// Suitable for tests and for embedders that materialize state up front;
/// reads and writes are synchronous, so the core's suspension points all
/// collapse to plain calls.
#[derive(Clone, Debug, Default)]
pub struct InMemoryState {
    accounts: HashMap<Address, StoredAccount>,
    block_hashes: HashMap<u64, H256>,
}

impl InMemoryState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account with the given balance
    pub fn create_account(&mut self, addr: Address, balance: U256) {
        let entry = self.accounts.entry(addr).or_default();
        entry.balance = balance;
    }

    /// Install bytecode at an address (creating the account if needed)
    pub fn install_code(&mut self, addr: Address, code: Vec<u8>) {
        self.accounts.entry(addr).or_default().code = code;
    }

    /// Set an account nonce
    pub fn set_nonce(&mut self, addr: Address, nonce: u64) {
        self.accounts.entry(addr).or_default().nonce = nonce;
    }

    /// Record a historical block hash
    pub fn insert_block_hash(&mut self, number: u64, hash: H256) {
        self.block_hashes.insert(number, hash);
    }

    /// Read a storage slot directly (test helper)
    pub fn storage_slot(&self, addr: &Address, key: &H256) -> Vec<u8> {
        self.accounts
            .get(addr)
            .and_then(|a| a.storage.get(key).cloned())
            .unwrap_or_default()
    }

    /// Delete an account outright (end-of-transaction selfdestruct sweep)
    pub fn remove_account(&mut self, addr: &Address) {
        self.accounts.remove(addr);
    }
}

impl StateAccess for InMemoryState {
    fn balance(&self, addr: &Address) -> EvmResult<U256> {
        Ok(self.accounts.get(addr).map(|a| a.balance).unwrap_or_default())
    }

    fn code(&self, addr: &Address) -> EvmResult<(Vec<u8>, bool)> {
        Ok((
            self.accounts.get(addr).map(|a| a.code.clone()).unwrap_or_default(),
            false,
        ))
    }

    fn storage(&self, addr: &Address, key: &H256) -> EvmResult<Vec<u8>> {
        Ok(self.storage_slot(addr, key))
    }

    fn set_storage(&mut self, addr: &Address, key: H256, value: Vec<u8>) -> EvmResult<()> {
        let account = self.accounts.entry(*addr).or_default();
        if value.is_empty() {
            account.storage.remove(&key);
        } else {
            account.storage.insert(key, value);
        }
        Ok(())
    }

    fn account(&self, addr: &Address) -> EvmResult<Account> {
        Ok(match self.accounts.get(addr) {
            Some(a) => Account {
                balance: a.balance,
                nonce: a.nonce,
                exists: true,
            },
            None => Account::default(),
        })
    }

    fn account_is_empty(&self, addr: &Address) -> EvmResult<bool> {
        Ok(match self.accounts.get(addr) {
            Some(a) => a.balance.is_zero() && a.nonce == 0 && a.code.is_empty(),
            None => true,
        })
    }

    fn exists(&self, addr: &Address) -> EvmResult<bool> {
        Ok(self.accounts.contains_key(addr))
    }

    fn block_hash(&self, number: u64) -> EvmResult<H256> {
        Ok(self.block_hashes.get(&number).copied().unwrap_or(H256::ZERO))
    }

    fn set_balance(&mut self, addr: &Address, balance: U256) -> EvmResult<()> {
        self.accounts.entry(*addr).or_default().balance = balance;
        Ok(())
    }

    fn cache_account(&mut self, addr: &Address, account: Account) -> EvmResult<()> {
        let entry = self.accounts.entry(*addr).or_default();
        entry.balance = account.balance;
        entry.nonce = account.nonce;
        Ok(())
    }

    fn set_code(&mut self, addr: &Address, code: Vec<u8>) -> EvmResult<()> {
        self.accounts.entry(*addr).or_default().code = code;
        Ok(())
    }
}
