//! # ql-07-execution
//!
//! Transaction Dispatcher and pre-consensus validation for Quorum Ledger.
//!
//! ```text
//! finalized Block ──► TransactionDispatcher ──┬─ Register ──► AccountLedger
//!                     (one overlay/request)   ├─ Transfer ──► AccountLedger
//!                                             ├─ Publish ───► ContractRuntime::deploy
//!                                             ├─ Invoke ────► ContractRuntime::invoke
//!                                             ├─ CrossChain ► CrossChainVerifier
//!                                             └─ Event ─────► OracleBridge
//!                              │
//!                              ▼
//!                  Receipt per request (r:tx/…, r:blk/…)
//! ```
//!
//! Execution failures never fail the block: the request gets a `Failed`
//! receipt and its writes are dropped. Storage failures halt the node.

pub mod domain;
pub mod ports;
pub mod service;
pub mod validator;

pub use domain::{ExecutionError, ExecutionResult, SubmitError};
pub use ports::{ExecutionApi, RequestAdmission};
pub use service::{ExecutionDependencies, TransactionDispatcher};
pub use validator::RequestValidator;
