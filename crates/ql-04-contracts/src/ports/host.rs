//! # Capability Ports
//!
//! [`ContractHost`] is the complete set of operations a contract may use.
//! Contracts never see the ledger store, the clock or the network: whatever
//! they need must arrive as an argument or through an oracle callback.
//!
//! [`ContractModule`] is implemented by interpreted user modules and by
//! native system modules alike.

use crate::domain::ExecutionMode;
use crate::errors::ContractResult;
use shared_types::{Address, Args, Value};

/// Capabilities exposed to the executing frame.
pub trait ContractHost {
    /// Address that invoked the current frame.
    fn caller(&self) -> &Address;

    /// Name of the calling contract when the caller is a contract frame.
    fn caller_contract(&self) -> Option<&str>;

    /// The executing contract's own name.
    fn name(&self) -> &str;

    /// The executing contract's ledger address.
    fn address(&self) -> &Address;

    fn deployer(&self) -> &Address;

    /// 0 for the top-level frame.
    fn depth(&self) -> u32;

    fn mode(&self) -> ExecutionMode;

    /// Spend `steps` of the entry's step budget.
    fn charge(&mut self, steps: u64) -> ContractResult<()>;

    /// Synchronous nested invocation in a new frame. A failure is returned
    /// to the caller and the callee's writes are discarded.
    fn call(&mut self, contract: &str, method: &str, args: Args) -> ContractResult<Value>;

    /// Move `amount` between ledger accounts. Committed execution only.
    fn transfer_from(&mut self, from: &Address, to: &Address, amount: u64) -> ContractResult<()>;

    /// Diagnostic emission; no ledger effect.
    fn info(&mut self, message: &str);

    /// Read any contract's storage.
    fn get(&self, contract: &str, key_path: &[String]) -> ContractResult<Value>;

    /// Write own storage. Committed execution only.
    fn set(&mut self, key_path: &[String], value: Value) -> ContractResult<()>;

    /// Delete from own storage. Committed execution only.
    fn delete(&mut self, key_path: &[String]) -> ContractResult<()>;

    /// Own top-level storage entries whose key starts with `prefix`.
    fn entries(&self, prefix: &str) -> ContractResult<Vec<(String, Value)>>;

    fn balance(&self, address: &Address) -> ContractResult<u64>;
}

/// Executable contract code.
pub trait ContractModule: Send + Sync {
    /// Runs once when the contract is deployed.
    fn init(&self, _host: &mut dyn ContractHost) -> ContractResult<()> {
        Ok(())
    }

    fn call(&self, host: &mut dyn ContractHost, method: &str, args: &Args) -> ContractResult<Value>;
}
