//! Fee schedule configuration
//!
//! The schedule is an immutable value passed into the interpreter, never a
//! process global; a single binary can execute different forks by supplying
//! different schedules. `Default` yields the Tangerine Whistle (EIP-150)
//! constants, the fork whose 63/64 forwarding rule this core implements.

/// Named gas constants for every cost the core charges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    /// Base tier (ADDRESS, CALLER, PC, ...)
    pub base_gas: u64,
    /// Very-low tier (ADD, PUSH, DUP, MLOAD, ...)
    pub very_low_gas: u64,
    /// Low tier (MUL, DIV, SIGNEXTEND, ...)
    pub low_gas: u64,
    /// Mid tier (ADDMOD, MULMOD, JUMP)
    pub mid_gas: u64,
    /// High tier (JUMPI)
    pub high_gas: u64,
    /// JUMPDEST marker
    pub jumpdest_gas: u64,

    /// EXP base cost
    pub exp_gas: u64,
    /// EXP surcharge per significant exponent byte
    pub exp_byte_gas: u64,

    /// SHA3 base cost
    pub sha3_gas: u64,
    /// SHA3 surcharge per 32-byte word hashed
    pub sha3_word_gas: u64,

    /// Copy surcharge per 32-byte word (CALLDATACOPY, CODECOPY, EXTCODECOPY)
    pub copy_gas: u64,

    /// Linear memory expansion cost per word
    pub memory_gas: u64,
    /// Divisor of the quadratic memory cost term
    pub quad_coeff_div: u64,

    /// BALANCE cost
    pub balance_gas: u64,
    /// EXTCODESIZE / EXTCODECOPY base cost
    pub ext_code_gas: u64,
    /// BLOCKHASH cost
    pub blockhash_gas: u64,
    /// SLOAD cost
    pub sload_gas: u64,

    /// SSTORE cost when a zero slot becomes non-zero
    pub sstore_set_gas: u64,
    /// SSTORE cost for every other transition
    pub sstore_reset_gas: u64,
    /// Refund for clearing a non-zero slot
    pub sstore_refund_gas: u64,

    /// Base cost of CALL/CALLCODE/DELEGATECALL
    pub call_gas: u64,
    /// Surcharge when a call transfers value
    pub call_value_transfer_gas: u64,
    /// Surcharge when a value-bearing CALL targets a dead account
    pub call_new_account_gas: u64,
    /// Free gas granted to the child when value is transferred
    pub call_stipend: u64,

    /// CREATE base cost
    pub create_gas: u64,

    /// SELFDESTRUCT base cost
    pub selfdestruct_gas: u64,
    /// Refund for the first selfdestruct of an address in a transaction
    pub suicide_refund_gas: u64,

    /// LOGn base cost
    pub log_gas: u64,
    /// Surcharge per log topic
    pub log_topic_gas: u64,
    /// Surcharge per byte of log data
    pub log_data_gas: u64,

    /// Operand stack depth limit
    pub stack_limit: usize,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            base_gas: 2,
            very_low_gas: 3,
            low_gas: 5,
            mid_gas: 8,
            high_gas: 10,
            jumpdest_gas: 1,

            exp_gas: 10,
            exp_byte_gas: 10,

            sha3_gas: 30,
            sha3_word_gas: 6,

            copy_gas: 3,

            memory_gas: 3,
            quad_coeff_div: 512,

            balance_gas: 400,
            ext_code_gas: 700,
            blockhash_gas: 20,
            sload_gas: 200,

            sstore_set_gas: 20_000,
            sstore_reset_gas: 5_000,
            sstore_refund_gas: 15_000,

            call_gas: 700,
            call_value_transfer_gas: 9_000,
            call_new_account_gas: 25_000,
            call_stipend: 2_300,

            create_gas: 32_000,

            selfdestruct_gas: 5_000,
            suicide_refund_gas: 24_000,

            log_gas: 375,
            log_topic_gas: 375,
            log_data_gas: 8,

            stack_limit: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tangerine_constants() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.call_gas, 700);
        assert_eq!(fees.sload_gas, 200);
        assert_eq!(fees.balance_gas, 400);
        assert_eq!(fees.selfdestruct_gas, 5_000);
        assert_eq!(fees.suicide_refund_gas, 24_000);
        assert_eq!(fees.call_stipend, 2_300);
        assert_eq!(fees.stack_limit, 1024);
    }

    #[test]
    fn test_schedule_is_a_value() {
        // Two schedules with different constants can coexist in one process.
        let mut cheap = FeeSchedule::default();
        cheap.sload_gas = 50;
        let standard = FeeSchedule::default();
        assert_ne!(cheap, standard);
        assert_eq!(standard.sload_gas, 200);
    }
}
