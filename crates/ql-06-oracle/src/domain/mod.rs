//! Oracle domain: records, key layout, errors.

pub mod entities;
pub mod errors;

pub use entities::{
    account_key, callback_entry, event_entry, report_key, CallbackRegistration, ContractEvent,
    OracleAccount, OracleReport, ACCOUNT_PREFIX, CALLBACK_ENTRY_PREFIX, EVENT_ENTRY_PREFIX,
    ORACLE_CONTRACT, REPORT_COUNT_KEY, REPORT_PREFIX,
};
pub use errors::{OracleError, OracleResult};
