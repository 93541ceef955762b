//! Contract domain: module format, static checks, deployed records.

pub mod check;
pub mod entities;
pub mod module;

pub use check::{check_args, static_check, validate_contract_name, MAX_NAME_LEN};
pub use entities::{ContractRecord, Execution, ExecutionMode, RuntimeConfig, StepMeter};
pub use module::{Expr, Instr, MethodDef, ModuleSource, Param, ParamType, MODULE_IDENTIFIER};
