//! # ql-04-contracts
//!
//! Sandboxed contract runtime for Quorum Ledger.
//!
//! ## Capability set
//!
//! | Capability | Committed | Query |
//! |------------|-----------|-------|
//! | `caller()`, `name()` | yes | yes |
//! | `call(contract, method, args)` | yes | yes |
//! | `transferFrom(from, to, amount)` | yes | `NotInCommittedContext` |
//! | `info(message)` | yes | yes |
//! | `get(contract, keyPath)` | yes | yes |
//! | storage `set` / `delete` | yes | `NotInCommittedContext` |
//!
//! Contracts are deployed in a restricted JSON module format (see
//! [`domain::module`]) and run by [`interpreter::InterpretedModule`]; native
//! system modules implement the same [`ports::ContractModule`] trait.
//!
//! ## Determinism
//!
//! Module code has no access to time, randomness or I/O. Values are integer
//! and string only and maps iterate in key order, so replaying the same
//! committed requests yields identical storage on every replica.

pub mod domain;
pub mod errors;
pub mod interpreter;
pub mod ports;
pub mod service;
pub mod storage;

pub use domain::{
    check_args, static_check, validate_contract_name, ContractRecord, Execution, ExecutionMode,
    MethodDef, ModuleSource, Param, ParamType, RuntimeConfig, StepMeter, MODULE_IDENTIFIER,
};
pub use errors::{ContractError, ContractResult};
pub use interpreter::InterpretedModule;
pub use ports::{ContractHost, ContractModule};
pub use service::ContractRuntime;
