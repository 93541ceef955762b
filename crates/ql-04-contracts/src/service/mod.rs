//! # Contract Runtime Service
//!
//! Resolves contracts by name, opens one frame per call and keeps each
//! frame's writes in its own overlay layer: a failed call discards its layer
//! and everything nested under it, a successful one folds into the caller.

mod frame;

#[cfg(test)]
mod tests;

use crate::domain::{
    static_check, validate_contract_name, ContractRecord, Execution, ExecutionMode, ModuleSource,
    RuntimeConfig, StepMeter,
};
use crate::errors::{ContractError, ContractResult};
use crate::interpreter::InterpretedModule;
use crate::ports::ContractModule;
use crate::storage;
use frame::Frame;
use ql_03_accounts::AccountLedger;
use shared_types::{
    Address, Args, LogEntry, RecordAccess, StateAccess, StateOverlay, StorageError, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Who is executing: name, ledger address and deployer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ContractIdentity {
    pub(crate) name: String,
    pub(crate) address: Address,
    pub(crate) deployer: Address,
}

impl ContractIdentity {
    fn system(name: &str) -> Self {
        Self {
            name: name.to_string(),
            address: Address::for_contract(name, &Address::default()),
            deployer: Address::default(),
        }
    }
}

/// Who invoked a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CallOrigin {
    pub(crate) address: Address,
    pub(crate) contract: Option<String>,
}

impl CallOrigin {
    fn account(address: &Address) -> Self {
        Self {
            address: address.clone(),
            contract: None,
        }
    }
}

/// Sandboxed contract runtime.
pub struct ContractRuntime {
    config: RuntimeConfig,
    ledger: AccountLedger,
    system: BTreeMap<String, Arc<dyn ContractModule>>,
}

impl ContractRuntime {
    pub fn new(config: RuntimeConfig, ledger: AccountLedger) -> Self {
        Self {
            config,
            ledger,
            system: BTreeMap::new(),
        }
    }

    /// Register a native module under a reserved name.
    pub fn register_system_module(&mut self, name: &str, module: Arc<dyn ContractModule>) {
        self.system.insert(name.to_string(), module);
    }

    pub fn with_system_module(mut self, name: &str, module: Arc<dyn ContractModule>) -> Self {
        self.register_system_module(name, module);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn ledger(&self) -> &AccountLedger {
        &self.ledger
    }

    pub fn is_system(&self, name: &str) -> bool {
        self.system.contains_key(name)
    }

    /// Name syntax, uniqueness against `state` and the static check.
    pub fn check_deploy<S: StateAccess + ?Sized>(
        &self,
        state: &S,
        name: &str,
        code: &str,
    ) -> ContractResult<ModuleSource> {
        validate_contract_name(name)?;
        if self.is_system(name) || storage::load_contract(state, name)?.is_some() {
            return Err(ContractError::ContractExists {
                name: name.to_string(),
            });
        }
        static_check(code, self.config.max_instructions)
    }

    /// Deploy `code` as `name` and run its `init` block.
    ///
    /// Success returns the contract's ledger address.
    pub fn deploy(
        &self,
        state: &mut StateOverlay,
        deployer: &Address,
        name: &str,
        code: &str,
    ) -> Execution {
        let mut logs = Vec::new();
        let mut meter = StepMeter::new(self.config.max_steps);
        let result = in_layer(state, |state| {
            let source = self.check_deploy(&*state, name, code)?;
            let identity = ContractIdentity {
                name: name.to_string(),
                address: Address::for_contract(name, deployer),
                deployer: deployer.clone(),
            };
            self.ledger.open_contract_account(&mut *state, &identity.address)?;
            let record = ContractRecord {
                name: identity.name.clone(),
                address: identity.address.clone(),
                deployer: identity.deployer.clone(),
                code: code.to_string(),
            };
            state.put_record(&storage::contract_key(name), &record)?;

            let address = identity.address.clone();
            let mut frame = Frame {
                runtime: self,
                state,
                logs: &mut logs,
                meter: &mut meter,
                identity,
                origin: CallOrigin::account(deployer),
                depth: 0,
                mode: ExecutionMode::Committed,
            };
            InterpretedModule::new(source).init(&mut frame)?;
            Ok(Value::Str(address.to_string()))
        });
        match &result {
            Ok(_) => info!(contract = name, %deployer, "contract deployed"),
            Err(err) => debug!(contract = name, %deployer, error = %err, "deployment failed"),
        }
        Execution { result, logs }
    }

    /// Committed invocation of `contract.method(args)` by `caller`.
    ///
    /// A positive `value` moves from the caller to the contract account
    /// first, atomically with the method's own effects.
    pub fn invoke(
        &self,
        state: &mut StateOverlay,
        caller: &Address,
        contract: &str,
        method: &str,
        args: &Args,
        value: u64,
    ) -> Execution {
        let mut logs = Vec::new();
        let mut meter = StepMeter::new(self.config.max_steps);
        let result = in_layer(state, |state| {
            meter.charge(1)?;
            let (identity, module) = self.resolve(&*state, contract)?;
            if value > 0 {
                self.ledger
                    .transfer(&mut *state, caller, &identity.address, value)?;
            }
            self.run_frame(
                state,
                &mut logs,
                &mut meter,
                identity,
                module,
                method,
                args,
                CallOrigin::account(caller),
                0,
                ExecutionMode::Committed,
            )
        });
        if let Err(err) = &result {
            debug!(contract, method, %caller, steps = meter.used(), error = %err, "invocation failed");
        }
        Execution { result, logs }
    }

    /// Read-only invocation for client queries. Writes and transfers fail
    /// and nothing the method does is kept.
    pub fn query(
        &self,
        state: &mut StateOverlay,
        contract: &str,
        method: &str,
        args: &Args,
    ) -> Execution {
        let mut logs = Vec::new();
        let mut meter = StepMeter::new(self.config.max_steps);
        state.begin_layer();
        let result = self.enter(
            state,
            &mut logs,
            &mut meter,
            contract,
            method,
            args,
            CallOrigin::account(&Address::default()),
            0,
            ExecutionMode::Query,
        );
        state.discard_layer();
        Execution { result, logs }
    }

    /// `get(contractName, keyPath)` against any state view.
    pub fn get<S: StateAccess + ?Sized>(
        &self,
        state: &S,
        contract: &str,
        key_path: &[String],
    ) -> ContractResult<Value> {
        if !self.is_system(contract) && storage::load_contract(state, contract)?.is_none() {
            return Err(ContractError::ContractNotFound {
                name: contract.to_string(),
            });
        }
        storage::read_path(state, contract, key_path)
    }

    pub fn contract<S: StateAccess + ?Sized>(
        &self,
        state: &S,
        name: &str,
    ) -> ContractResult<Option<ContractRecord>> {
        storage::load_contract(state, name)
    }

    pub fn contracts<S: StateAccess + ?Sized>(&self, state: &S) -> ContractResult<Vec<ContractRecord>> {
        storage::all_contracts(state)
    }

    fn resolve<S: StateAccess + ?Sized>(
        &self,
        state: &S,
        name: &str,
    ) -> ContractResult<(ContractIdentity, Arc<dyn ContractModule>)> {
        if let Some(module) = self.system.get(name) {
            return Ok((ContractIdentity::system(name), Arc::clone(module)));
        }
        let record = storage::load_contract(state, name)?.ok_or_else(|| {
            ContractError::ContractNotFound {
                name: name.to_string(),
            }
        })?;
        // Code was checked at deployment; a record that no longer parses
        // means the store is corrupt.
        let source = static_check(&record.code, usize::MAX).map_err(|err| {
            ContractError::Storage(StorageError::Corruption {
                key: format!("contract {name}"),
                reason: err.to_string(),
            })
        })?;
        let identity = ContractIdentity {
            name: record.name,
            address: record.address,
            deployer: record.deployer,
        };
        Ok((identity, Arc::new(InterpretedModule::new(source))))
    }

    /// Resolve and run `contract.method` in a new frame at `depth`. The
    /// frame costs one step of `meter`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn enter(
        &self,
        state: &mut StateOverlay,
        logs: &mut Vec<LogEntry>,
        meter: &mut StepMeter,
        contract: &str,
        method: &str,
        args: &Args,
        origin: CallOrigin,
        depth: u32,
        mode: ExecutionMode,
    ) -> ContractResult<Value> {
        if depth > self.config.max_call_depth {
            return Err(ContractError::CallDepthExceeded {
                depth,
                max: self.config.max_call_depth,
            });
        }
        meter.charge(1)?;
        let (identity, module) = self.resolve(&*state, contract)?;
        in_layer(state, |state| {
            self.run_frame(state, logs, meter, identity, module, method, args, origin, depth, mode)
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn run_frame(
        &self,
        state: &mut StateOverlay,
        logs: &mut Vec<LogEntry>,
        meter: &mut StepMeter,
        identity: ContractIdentity,
        module: Arc<dyn ContractModule>,
        method: &str,
        args: &Args,
        origin: CallOrigin,
        depth: u32,
        mode: ExecutionMode,
    ) -> ContractResult<Value> {
        let mut frame = Frame {
            runtime: self,
            state,
            logs,
            meter,
            identity,
            origin,
            depth,
            mode,
        };
        let result = module.call(&mut frame, method, args);
        debug!(
            contract = %frame.identity.name,
            method,
            depth,
            ok = result.is_ok(),
            "frame finished"
        );
        result
    }
}

/// Run `f` in a fresh overlay layer, kept on success and dropped on error.
fn in_layer<T>(
    state: &mut StateOverlay,
    f: impl FnOnce(&mut StateOverlay) -> ContractResult<T>,
) -> ContractResult<T> {
    state.begin_layer();
    let result = f(state);
    match &result {
        Ok(_) => state.commit_layer(),
        Err(_) => state.discard_layer(),
    }
    result
}
