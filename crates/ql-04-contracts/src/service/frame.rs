//! Execution frame: the [`ContractHost`] handed to contract code.

use crate::domain::{ExecutionMode, StepMeter};
use crate::errors::{ContractError, ContractResult};
use crate::ports::ContractHost;
use crate::service::{CallOrigin, ContractIdentity, ContractRuntime};
use crate::storage;
use shared_types::{Address, Args, LogEntry, StateOverlay, Value};
use tracing::info;

pub(crate) struct Frame<'r, 's> {
    pub(crate) runtime: &'r ContractRuntime,
    pub(crate) state: &'s mut StateOverlay,
    pub(crate) logs: &'s mut Vec<LogEntry>,
    pub(crate) meter: &'s mut StepMeter,
    pub(crate) identity: ContractIdentity,
    pub(crate) origin: CallOrigin,
    pub(crate) depth: u32,
    pub(crate) mode: ExecutionMode,
}

impl Frame<'_, '_> {
    fn require_committed(&self, capability: &'static str) -> ContractResult<()> {
        match self.mode {
            ExecutionMode::Committed => Ok(()),
            ExecutionMode::Query => Err(ContractError::NotInCommittedContext(capability)),
        }
    }
}

impl ContractHost for Frame<'_, '_> {
    fn caller(&self) -> &Address {
        &self.origin.address
    }

    fn caller_contract(&self) -> Option<&str> {
        self.origin.contract.as_deref()
    }

    fn name(&self) -> &str {
        &self.identity.name
    }

    fn address(&self) -> &Address {
        &self.identity.address
    }

    fn deployer(&self) -> &Address {
        &self.identity.deployer
    }

    fn depth(&self) -> u32 {
        self.depth
    }

    fn mode(&self) -> ExecutionMode {
        self.mode
    }

    fn charge(&mut self, steps: u64) -> ContractResult<()> {
        self.meter.charge(steps)
    }

    fn call(&mut self, contract: &str, method: &str, args: Args) -> ContractResult<Value> {
        let origin = CallOrigin {
            address: self.identity.address.clone(),
            contract: Some(self.identity.name.clone()),
        };
        self.runtime.enter(
            &mut *self.state,
            &mut *self.logs,
            &mut *self.meter,
            contract,
            method,
            &args,
            origin,
            self.depth + 1,
            self.mode,
        )
    }

    /// Spends from the contract's own account, its deployer, or the account
    /// that invoked it directly. A calling contract never lends its balance
    /// to the callee.
    fn transfer_from(&mut self, from: &Address, to: &Address, amount: u64) -> ContractResult<()> {
        self.require_committed("transferFrom")?;
        let direct_caller = self.origin.contract.is_none() && *from == self.origin.address;
        let authorized =
            *from == self.identity.address || *from == self.identity.deployer || direct_caller;
        if !authorized {
            return Err(ContractError::TransferNotAuthorized {
                contract: self.identity.name.clone(),
                from: from.clone(),
            });
        }
        self.runtime.ledger().transfer(&mut *self.state, from, to, amount)?;
        Ok(())
    }

    fn info(&mut self, message: &str) {
        info!(
            target: "contract",
            contract = %self.identity.name,
            depth = self.depth,
            caller = %self.origin.address,
            "{message}"
        );
        self.logs.push(LogEntry {
            contract: self.identity.name.clone(),
            depth: self.depth,
            message: message.to_string(),
        });
    }

    fn get(&self, contract: &str, key_path: &[String]) -> ContractResult<Value> {
        self.runtime.get(&*self.state, contract, key_path)
    }

    fn set(&mut self, key_path: &[String], value: Value) -> ContractResult<()> {
        self.require_committed("storage write")?;
        storage::write_path(&mut *self.state, &self.identity.name, key_path, value)
    }

    fn delete(&mut self, key_path: &[String]) -> ContractResult<()> {
        self.require_committed("storage delete")?;
        storage::delete_path(&mut *self.state, &self.identity.name, key_path)
    }

    fn entries(&self, prefix: &str) -> ContractResult<Vec<(String, Value)>> {
        storage::entries(&*self.state, &self.identity.name, prefix)
    }

    fn balance(&self, address: &Address) -> ContractResult<u64> {
        Ok(self.runtime.ledger().balance(&*self.state, address)?)
    }
}
