//! # Oracle Event Bridge (ql-06)
//!
//! Imports off-chain facts into the ledger through committed `Event`
//! requests.
//!
//! ```text
//! contract ──call──→ oracle.query_data ──→ pending callback (event key)
//!                                                │
//! reporter ──Event(event key, report)──→ [OracleBridge]
//!                                          ├─ append report (o:report/…)
//!                                          ├─ update reporter (o:acct/…)
//!                                          └─ contract.method({data, key, …})
//! ```
//!
//! Contracts never fetch data themselves: the report reaches them as a
//! callback argument, identical on every replica.

pub mod domain;
pub mod log;
pub mod module;
pub mod service;

pub use domain::{
    CallbackRegistration, ContractEvent, OracleAccount, OracleError, OracleReport, OracleResult,
    ORACLE_CONTRACT,
};
pub use log::OracleLog;
pub use module::{derive_event_key, scoped_event_key, OracleModule};
pub use service::{EventExecution, OracleBridge};
