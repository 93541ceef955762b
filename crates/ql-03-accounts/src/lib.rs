//! # ql-03-accounts
//!
//! Account Ledger for Quorum Ledger.
//!
//! - `address = hex(sha256(public_key))`, created once by Register with a
//!   fixed initial balance
//! - Balances never go negative; transfers are all-or-nothing
//! - Mutated only by the dispatcher and by contract `transferFrom`, always
//!   inside a committed request's overlay

pub mod domain;
pub mod ledger;

pub use domain::{account_key, AccountError, LedgerConfig, ACCOUNT_PREFIX};
pub use ledger::AccountLedger;
